use crate::clock::WallClock;

use super::{
    Collector, MAX_CARDINALITY, MetricDescriptor, MetricKind, MetricsError, Sample, SampleStore,
};

/// Monotonically increasing series.
///
/// Increments must be non-negative; a negative (or NaN) delta is rejected
/// rather than clamped so programming errors surface immediately.
pub struct Counter<const N: usize = MAX_CARDINALITY> {
    descriptor: MetricDescriptor,
    store: SampleStore<N>,
    clock: Option<&'static dyn WallClock>,
}

impl<const N: usize> Counter<N> {
    /// An unlabeled counter, exported as `0` until first incremented.
    pub fn new(descriptor: MetricDescriptor) -> Self {
        Self {
            descriptor,
            store: SampleStore::unlabeled(),
            clock: None,
        }
    }

    /// A counter labeled with `label_names`.
    pub fn new_vec(
        descriptor: MetricDescriptor,
        label_names: &[&'static str],
    ) -> Result<Self, MetricsError> {
        Ok(Self {
            descriptor,
            store: SampleStore::new(label_names)?,
            clock: None,
        })
    }

    /// Stamp every update with the wall-clock time from `clock`.
    pub fn with_clock(mut self, clock: &'static dyn WallClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn inc(&self, label_values: &[&str]) -> Result<(), MetricsError> {
        self.inc_by(label_values, 1.0)
    }

    pub fn inc_by(&self, label_values: &[&str], delta: f64) -> Result<(), MetricsError> {
        // `!(delta >= 0.0)` also catches NaN
        if !(delta >= 0.0) {
            return Err(MetricsError::NegativeIncrement);
        }
        self.store.add(label_values, delta, self.timestamp())
    }

    pub fn get(&self, label_values: &[&str]) -> Option<f64> {
        self.store.get(label_values)
    }

    pub fn reset(&self) {
        self.store.reset();
    }

    fn timestamp(&self) -> u64 {
        self.clock
            .and_then(|clock| clock.unix_millis())
            .unwrap_or(0)
    }
}

impl<const N: usize> Collector for Counter<N> {
    fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    fn label_names(&self) -> &[&'static str] {
        self.store.label_names()
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Counter
    }

    fn sample_count(&self) -> usize {
        self.store.len()
    }

    fn fill(&self, buffer: &mut [Sample]) -> usize {
        self.store.fill(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn errors() -> Counter {
        Counter::new_vec(
            MetricDescriptor::new("errors", "Errors per sensor").with_subsystem("sensors"),
            &["sensor", "code"],
        )
        .unwrap()
    }

    #[test]
    fn test_unlabeled_counter_starts_at_zero() {
        let counter: Counter = Counter::new(MetricDescriptor::new("ticks", ""));
        assert_eq!(counter.sample_count(), 1);
        assert_eq!(counter.get(&[]), Some(0.0));

        counter.inc(&[]).unwrap();
        counter.inc_by(&[], 2.0).unwrap();
        assert_eq!(counter.get(&[]), Some(3.0));
    }

    #[test]
    fn test_negative_increment_is_rejected() {
        let counter = errors();
        assert_eq!(
            counter.inc_by(&["BME280", "0x1"], -1.0),
            Err(MetricsError::NegativeIncrement)
        );
        assert_eq!(
            counter.inc_by(&["BME280", "0x1"], f64::NAN),
            Err(MetricsError::NegativeIncrement)
        );
        // Nothing was bound by the rejected calls
        assert_eq!(counter.sample_count(), 0);
    }

    #[test]
    fn test_labeled_increments_accumulate_per_tuple() {
        let counter = errors();
        counter.inc(&["BME280", "0x103"]).unwrap();
        counter.inc(&["BME280", "0x103"]).unwrap();
        counter.inc(&["SGP30", "0x1"]).unwrap();

        assert_eq!(counter.get(&["BME280", "0x103"]), Some(2.0));
        assert_eq!(counter.get(&["SGP30", "0x1"]), Some(1.0));
        assert_eq!(counter.sample_count(), 2);
    }

    #[test]
    fn test_clock_stamps_updates() {
        static CLOCK: ManualClock = ManualClock::new(1_700_000_000_000);

        let counter: Counter = Counter::new(MetricDescriptor::new("ticks", "")).with_clock(&CLOCK);
        counter.inc(&[]).unwrap();

        let mut out = [Sample::EMPTY; 1];
        assert_eq!(counter.fill(&mut out), 1);
        assert_eq!(out[0].timestamp_ms, 1_700_000_000_000);
    }
}
