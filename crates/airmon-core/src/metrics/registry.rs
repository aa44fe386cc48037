use log::debug;

use super::{Collector, MAX_COLLECTORS, MAX_GLOBAL_LABELS, MetricsError};

/// A label attached to every exported series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalLabel<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

/// Ordered, bounded set of collectors plus the global labels applied to all
/// of them.
///
/// Build it during startup through `&mut self`, then share it by reference:
/// after registration the registry itself is read-only, and each collector
/// guards its own samples.
pub struct Registry<'a> {
    collectors: heapless::Vec<&'a dyn Collector, MAX_COLLECTORS>,
    global_labels: heapless::Vec<GlobalLabel<'a>, MAX_GLOBAL_LABELS>,
}

impl<'a> Registry<'a> {
    pub const fn new() -> Self {
        Self {
            collectors: heapless::Vec::new(),
            global_labels: heapless::Vec::new(),
        }
    }

    /// Append `collector`. Export order is registration order.
    ///
    /// Fails if the registry is full or another collector already exports
    /// under the same full name.
    pub fn register(&mut self, collector: &'a dyn Collector) -> Result<(), MetricsError> {
        let descriptor = collector.descriptor();
        if self
            .collectors
            .iter()
            .any(|existing| existing.descriptor().same_full_name(descriptor))
        {
            return Err(MetricsError::DuplicateMetric {
                descriptor: *descriptor,
            });
        }

        self.collectors
            .push(collector)
            .map_err(|_| MetricsError::RegistryFull {
                capacity: MAX_COLLECTORS,
            })?;

        debug!("Registered metric {}", descriptor.full_name());
        Ok(())
    }

    /// Register several collectors, stopping at the first failure.
    pub fn register_all(
        &mut self,
        collectors: &[&'a dyn Collector],
    ) -> Result<(), MetricsError> {
        collectors.iter().try_for_each(|c| self.register(*c))
    }

    pub fn add_global_label(&mut self, name: &'a str, value: &'a str) -> Result<(), MetricsError> {
        self.global_labels
            .push(GlobalLabel { name, value })
            .map_err(|_| MetricsError::GlobalLabelsFull {
                capacity: MAX_GLOBAL_LABELS,
            })
    }

    pub fn collectors(&self) -> impl Iterator<Item = &'a dyn Collector> + '_ {
        self.collectors.iter().copied()
    }

    pub fn global_labels(&self) -> &[GlobalLabel<'a>] {
        &self.global_labels
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Forget every collector and global label. Intended for tests.
    pub fn clear(&mut self) {
        self.collectors.clear();
        self.global_labels.clear();
    }
}

impl Default for Registry<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Counter, Gauge, MetricDescriptor};

    #[test]
    fn test_registration_keeps_order() {
        let a: Gauge = Gauge::new(MetricDescriptor::new("a", ""));
        let b: Counter = Counter::new(MetricDescriptor::new("b", ""));

        let mut registry = Registry::new();
        registry.register_all(&[&a, &b]).unwrap();

        let names: Vec<&str> = registry.collectors().map(|c| c.descriptor().name).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_duplicate_full_names_are_rejected() {
        let first: Gauge =
            Gauge::new(MetricDescriptor::new("co2_ppm", "").with_subsystem("sensors"));
        let second: Counter = Counter::new(MetricDescriptor::new("sensors_co2_ppm", ""));

        let mut registry = Registry::new();
        registry.register(&first).unwrap();
        let err = registry.register(&second).unwrap_err();
        assert_eq!(
            err,
            MetricsError::DuplicateMetric {
                descriptor: MetricDescriptor::new("sensors_co2_ppm", "")
            }
        );
        assert_eq!(err.to_string(), "metric `sensors_co2_ppm` is already registered");
        assert_eq!(registry.len(), 1);

        // Reported under the full name, not the bare one
        let third: Gauge =
            Gauge::new(MetricDescriptor::new("co2_ppm", "").with_subsystem("sensors"));
        let mut registry = Registry::new();
        registry.register(&second).unwrap();
        assert_eq!(
            registry.register(&third).unwrap_err().to_string(),
            "metric `sensors_co2_ppm` is already registered"
        );
    }

    #[test]
    fn test_registry_capacity() {
        let gauges: Vec<Gauge> = (0..=MAX_COLLECTORS)
            .map(|i| {
                let name: &'static str = Box::leak(format!("metric_{i}").into_boxed_str());
                Gauge::new(MetricDescriptor::new(name, ""))
            })
            .collect();

        let mut registry = Registry::new();
        for gauge in &gauges[..MAX_COLLECTORS] {
            registry.register(gauge).unwrap();
        }
        assert_eq!(
            registry.register(&gauges[MAX_COLLECTORS]),
            Err(MetricsError::RegistryFull {
                capacity: MAX_COLLECTORS
            })
        );
    }

    #[test]
    fn test_global_label_capacity() {
        let mut registry = Registry::new();
        for _ in 0..MAX_GLOBAL_LABELS {
            registry.add_global_label("env", "prod").unwrap();
        }
        assert_eq!(
            registry.add_global_label("one", "more"),
            Err(MetricsError::GlobalLabelsFull {
                capacity: MAX_GLOBAL_LABELS
            })
        );
    }

    #[test]
    fn test_clear_resets_registry() {
        let gauge: Gauge = Gauge::new(MetricDescriptor::new("a", ""));
        let mut registry = Registry::new();
        registry.register(&gauge).unwrap();
        registry.add_global_label("env", "test").unwrap();

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.global_labels().is_empty());
        registry.register(&gauge).unwrap();
    }
}
