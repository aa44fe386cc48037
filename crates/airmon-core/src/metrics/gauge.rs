use crate::clock::WallClock;

use super::{
    Collector, MAX_CARDINALITY, MetricDescriptor, MetricKind, MetricsError, Sample, SampleStore,
};

/// Series whose value can go up and down.
pub struct Gauge<const N: usize = MAX_CARDINALITY> {
    descriptor: MetricDescriptor,
    store: SampleStore<N>,
    clock: Option<&'static dyn WallClock>,
}

impl<const N: usize> Gauge<N> {
    pub fn new(descriptor: MetricDescriptor) -> Self {
        Self {
            descriptor,
            store: SampleStore::unlabeled(),
            clock: None,
        }
    }

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

    pub fn set(&self, label_values: &[&str], value: f64) -> Result<(), MetricsError> {
        self.store.set(label_values, value, self.timestamp())
    }

    pub fn add(&self, label_values: &[&str], delta: f64) -> Result<(), MetricsError> {
        self.store.add(label_values, delta, self.timestamp())
    }

    pub fn sub(&self, label_values: &[&str], delta: f64) -> Result<(), MetricsError> {
        self.add(label_values, -delta)
    }

    pub fn inc(&self, label_values: &[&str]) -> Result<(), MetricsError> {
        self.add(label_values, 1.0)
    }

    pub fn dec(&self, label_values: &[&str]) -> Result<(), MetricsError> {
        self.add(label_values, -1.0)
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

impl<const N: usize> Collector for Gauge<N> {
    fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    fn label_names(&self) -> &[&'static str] {
        self.store.label_names()
    }

    fn kind(&self) -> MetricKind {
        MetricKind::Gauge
    }

    fn sample_count(&self) -> usize {
        self.store.len()
    }

    fn fill(&self, buffer: &mut [Sample]) -> usize {
        self.store.fill(buffer)
    }
}
