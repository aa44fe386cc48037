use thiserror_no_std::Error;

use super::MetricDescriptor;

/// Failures raised by the registry and the series it holds.
///
/// Every variant except [`MetricsError::NegativeIncrement`] is a capacity or
/// shape violation: the caller asked for more than the fixed-size tables can
/// hold. Composition roots treat those as fatal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsError {
    #[error("registry is full ({capacity} collectors)")]
    RegistryFull { capacity: usize },
    #[error("global label set is full ({capacity} labels)")]
    GlobalLabelsFull { capacity: usize },
    #[error("metric `{}` is already registered", .descriptor.full_name())]
    DuplicateMetric { descriptor: MetricDescriptor },
    #[error("series declares {declared} labels, at most {max} are supported")]
    TooManyLabels { declared: usize, max: usize },
    #[error("expected {expected} label values, got {actual}")]
    LabelArity { expected: usize, actual: usize },
    #[error("label cardinality exceeded ({capacity} distinct label sets)")]
    CardinalityExceeded { capacity: usize },
    #[error("joined label values exceed {max} bytes")]
    LabelValuesTooLong { max: usize },
    #[error("label value contains a NUL byte")]
    InvalidLabelValue,
    #[error("counters only go up")]
    NegativeIncrement,
}
