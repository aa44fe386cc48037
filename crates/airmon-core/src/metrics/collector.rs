//! The collector capability and pull-based collectors

use log::error;

use super::{LabelNames, MAX_LABELS, MetricDescriptor, MetricKind, MetricsError, Sample};

/// Anything the registry can export.
///
/// Counters and gauges implement this over their sample store; [`Dynamic`]
/// collectors compute their samples when asked.
pub trait Collector: Sync {
    fn descriptor(&self) -> &MetricDescriptor;

    /// Label names shared by every sample, in declaration order.
    fn label_names(&self) -> &[&'static str];

    fn kind(&self) -> MetricKind;

    /// How many samples [`Collector::fill`] would produce right now.
    fn sample_count(&self) -> usize;

    /// Write up to `buffer.len()` samples into `buffer`, returning how many
    /// were written. Zero-label collectors leave the label key empty.
    fn fill(&self, buffer: &mut [Sample]) -> usize;
}

/// Destination for samples produced by a [`SampleSource`].
///
/// In counting mode no samples are stored; only the number of pushes is
/// tracked. Pushes beyond the end of the buffer are dropped.
pub struct SampleWriter<'a> {
    out: Option<&'a mut [Sample]>,
    arity: usize,
    written: usize,
}

impl<'a> SampleWriter<'a> {
    fn counting(arity: usize) -> Self {
        Self {
            out: None,
            arity,
            written: 0,
        }
    }

    fn into_buffer(out: &'a mut [Sample], arity: usize) -> Self {
        Self {
            out: Some(out),
            arity,
            written: 0,
        }
    }

    /// Emit one sample labeled with `label_values`.
    pub fn push(&mut self, label_values: &[&str], value: f64) -> Result<(), MetricsError> {
        if label_values.len() != self.arity {
            return Err(MetricsError::LabelArity {
                expected: self.arity,
                actual: label_values.len(),
            });
        }

        // Both passes must reject the same label values or the counts drift
        let sample = Sample::labeled(label_values, value)?;
        match self.out.as_deref_mut() {
            None => self.written += 1,
            Some(out) => {
                if let Some(slot) = out.get_mut(self.written) {
                    *slot = sample;
                    self.written += 1;
                }
            }
        }
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

/// Computes samples on demand for a [`Dynamic`] collector.
pub trait SampleSource: Sync {
    fn produce(&self, out: &mut SampleWriter<'_>) -> Result<(), MetricsError>;
}

impl<F> SampleSource for F
where
    F: Fn(&mut SampleWriter<'_>) -> Result<(), MetricsError> + Sync,
{
    fn produce(&self, out: &mut SampleWriter<'_>) -> Result<(), MetricsError> {
        self(out)
    }
}

/// Collector without storage of its own; values are pulled from `S` on
/// every scrape.
pub struct Dynamic<S> {
    descriptor: MetricDescriptor,
    label_names: LabelNames,
    kind: MetricKind,
    source: S,
}

impl<S: SampleSource> Dynamic<S> {
    /// A gauge-typed dynamic collector.
    pub fn new(
        descriptor: MetricDescriptor,
        label_names: &[&'static str],
        source: S,
    ) -> Result<Self, MetricsError> {
        let label_names =
            LabelNames::from_slice(label_names).map_err(|_| MetricsError::TooManyLabels {
                declared: label_names.len(),
                max: MAX_LABELS,
            })?;

        Ok(Self {
            descriptor,
            label_names,
            kind: MetricKind::Gauge,
            source,
        })
    }

    pub fn with_kind(mut self, kind: MetricKind) -> Self {
        self.kind = kind;
        self
    }

    fn run(&self, writer: &mut SampleWriter<'_>) {
        if let Err(e) = self.source.produce(writer) {
            error!(
                "Collector {} failed to produce samples: {}",
                self.descriptor.full_name(),
                e
            );
        }
    }
}

impl<F> Dynamic<F>
where
    F: Fn(&mut SampleWriter<'_>) -> Result<(), MetricsError> + Sync,
{
    /// A gauge-typed dynamic collector backed by a closure.
    pub fn from_fn(
        descriptor: MetricDescriptor,
        label_names: &[&'static str],
        produce: F,
    ) -> Result<Self, MetricsError> {
        Self::new(descriptor, label_names, produce)
    }
}

impl<S: SampleSource> Collector for Dynamic<S> {
    fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    fn label_names(&self) -> &[&'static str] {
        &self.label_names
    }

    fn kind(&self) -> MetricKind {
        self.kind
    }

    fn sample_count(&self) -> usize {
        let mut writer = SampleWriter::counting(self.label_names.len());
        self.run(&mut writer);
        writer.written()
    }

    fn fill(&self, buffer: &mut [Sample]) -> usize {
        let mut writer = SampleWriter::into_buffer(buffer, self.label_names.len());
        self.run(&mut writer);
        writer.written()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_counts_and_fills() {
        let heap = Dynamic::from_fn(
            MetricDescriptor::new("heap_bytes", "").with_subsystem("esp32"),
            &["type"],
            |out| {
                out.push(&["free"], 1024.0)?;
                out.push(&["alloc"], 512.0)
            },
        )
        .unwrap();

        assert_eq!(heap.sample_count(), 2);

        let mut buffer = [Sample::EMPTY; 4];
        assert_eq!(heap.fill(&mut buffer), 2);
        assert!(buffer[0].labels.matches(&["free"]));
        assert_eq!(buffer[0].value, 1024.0);
        assert!(buffer[1].labels.matches(&["alloc"]));
        assert_eq!(buffer[1].value, 512.0);
    }

    #[test]
    fn test_dynamic_fill_stops_at_buffer_end() {
        let many = Dynamic::from_fn(
            MetricDescriptor::new("many", ""),
            &["i"],
            |out| {
                for i in ["0", "1", "2"] {
                    out.push(&[i], 1.0)?;
                }
                Ok(())
            },
        )
        .unwrap();

        let mut buffer = [Sample::EMPTY; 2];
        assert_eq!(many.fill(&mut buffer), 2);
    }

    #[test]
    fn test_dynamic_rejects_wrong_arity() {
        let mut buffer = [Sample::EMPTY; 1];
        let mut writer = SampleWriter::into_buffer(&mut buffer, 1);
        assert_eq!(
            writer.push(&[], 1.0),
            Err(MetricsError::LabelArity {
                expected: 1,
                actual: 0
            })
        );
        assert_eq!(writer.written(), 0);
    }

    #[test]
    fn test_invalid_label_values_are_skipped_in_both_passes() {
        let mixed = Dynamic::from_fn(
            MetricDescriptor::new("mixed", ""),
            &["name"],
            |out| {
                out.push(&["ok"], 1.0)?;
                if out.push(&["bad\0value"], 2.0).is_ok() {
                    unreachable!("NUL in a label value must be rejected");
                }
                out.push(&["also_ok"], 3.0)
            },
        )
        .unwrap();

        assert_eq!(mixed.sample_count(), 2);
        let mut buffer = [Sample::EMPTY; 4];
        assert_eq!(mixed.fill(&mut buffer), 2);
        assert!(buffer[1].labels.matches(&["also_ok"]));
    }

    #[test]
    fn test_dynamic_kind_override() {
        let boots = Dynamic::from_fn(
            MetricDescriptor::new("boots", ""),
            &[],
            |out| out.push(&[], 3.0),
        )
        .unwrap()
        .with_kind(MetricKind::Counter);

        assert_eq!(boots.kind(), MetricKind::Counter);
    }
}
