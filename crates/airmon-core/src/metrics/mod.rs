//! Metrics registry and Prometheus text exposition
//!
//! Producers own [`Counter`]s and [`Gauge`]s and update them directly; the
//! HTTP task walks the [`Registry`] and streams every collector through the
//! [`exposition`] encoder. Everything here works on fixed-size tables, so the
//! memory used by the metrics subsystem is known at compile time:
//!
//! | Table | Capacity |
//! |---|---|
//! | collectors per registry | [`MAX_COLLECTORS`] |
//! | global labels | [`MAX_GLOBAL_LABELS`] |
//! | labels per series | [`MAX_LABELS`] |
//! | distinct label sets per series | [`MAX_CARDINALITY`] |
//! | joined label values per sample | [`MAX_LABEL_KEY_LEN`] bytes |
//!
//! Exceeding any of these is reported as a [`MetricsError`] instead of
//! silently dropping or evicting a series.

mod collector;
mod counter;
mod descriptor;
mod error;
pub mod exposition;
mod gauge;
mod labels;
mod registry;
mod sample;
mod store;
pub mod system;

pub use collector::{Collector, Dynamic, SampleSource, SampleWriter};
pub use counter::Counter;
pub use descriptor::{FullName, MetricDescriptor};
pub use error::MetricsError;
pub use gauge::Gauge;
pub use labels::{EscapedHelp, EscapedLabelValue, LabelKey};
pub use registry::{GlobalLabel, Registry};
pub use sample::Sample;
pub use store::SampleStore;

pub const MAX_COLLECTORS: usize = 128;
pub const MAX_GLOBAL_LABELS: usize = 8;
pub const MAX_LABELS: usize = 8;
pub const MAX_CARDINALITY: usize = 8;
pub const MAX_LABEL_KEY_LEN: usize = 64;

/// Label names of one series, fixed when the series is created.
pub type LabelNames = heapless::Vec<&'static str, MAX_LABELS>;

/// Type tag emitted on the `# TYPE` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
        }
    }
}
