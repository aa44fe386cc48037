use super::{LabelKey, MetricsError};

/// One concrete measurement handed from a collector to the formatter.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub value: f64,
    /// Milliseconds since the Unix epoch; zero leaves the timestamp out of the export.
    pub timestamp_ms: u64,
    pub labels: LabelKey,
}

impl Sample {
    /// Placeholder used to initialise stage buffers.
    pub const EMPTY: Sample = Sample {
        value: 0.0,
        timestamp_ms: 0,
        labels: LabelKey::empty(),
    };

    /// An unlabeled, untimestamped sample.
    pub const fn new(value: f64) -> Self {
        Self {
            value,
            timestamp_ms: 0,
            labels: LabelKey::empty(),
        }
    }

    pub fn labeled(values: &[&str], value: f64) -> Result<Self, MetricsError> {
        Ok(Self {
            value,
            timestamp_ms: 0,
            labels: LabelKey::join(values)?,
        })
    }

    pub fn at(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }
}
