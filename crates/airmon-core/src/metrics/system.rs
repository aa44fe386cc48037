//! Collectors pulled from the running system on every scrape

use super::{Dynamic, MetricDescriptor, MetricsError, SampleSource, SampleWriter};

/// Platform hook for memory and scheduler statistics.
pub trait SystemStats: Sync {
    fn heap_free_bytes(&self) -> usize;
    fn heap_used_bytes(&self) -> usize;
    /// Number of tasks currently alive.
    fn task_count(&self) -> usize;
}

/// `esp32_heap_bytes{type="free"|"alloc"}`
pub struct HeapUsage<'a>(pub &'a dyn SystemStats);

impl SampleSource for HeapUsage<'_> {
    fn produce(&self, out: &mut SampleWriter<'_>) -> Result<(), MetricsError> {
        out.push(&["free"], self.0.heap_free_bytes() as f64)?;
        out.push(&["alloc"], self.0.heap_used_bytes() as f64)
    }
}

/// `esp32_task_num`
pub struct TaskCount<'a>(pub &'a dyn SystemStats);

impl SampleSource for TaskCount<'_> {
    fn produce(&self, out: &mut SampleWriter<'_>) -> Result<(), MetricsError> {
        out.push(&[], self.0.task_count() as f64)
    }
}

/// `firmware_version{version="..."} 1`
pub struct FirmwareVersion(pub &'static str);

impl SampleSource for FirmwareVersion {
    fn produce(&self, out: &mut SampleWriter<'_>) -> Result<(), MetricsError> {
        out.push(&[self.0], 1.0)
    }
}

pub fn heap_bytes(stats: &dyn SystemStats) -> Result<Dynamic<HeapUsage<'_>>, MetricsError> {
    Dynamic::new(
        MetricDescriptor::new("heap_bytes", "Heap memory by state").with_subsystem("esp32"),
        &["type"],
        HeapUsage(stats),
    )
}

pub fn task_num(stats: &dyn SystemStats) -> Result<Dynamic<TaskCount<'_>>, MetricsError> {
    Dynamic::new(
        MetricDescriptor::new("task_num", "Number of running tasks").with_subsystem("esp32"),
        &[],
        TaskCount(stats),
    )
}

pub fn firmware_version(version: &'static str) -> Result<Dynamic<FirmwareVersion>, MetricsError> {
    Dynamic::new(
        MetricDescriptor::new("firmware_version", "Firmware version"),
        &["version"],
        FirmwareVersion(version),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Registry, exposition};

    struct FixedStats;

    impl SystemStats for FixedStats {
        fn heap_free_bytes(&self) -> usize {
            48_000
        }

        fn heap_used_bytes(&self) -> usize {
            24_000
        }

        fn task_count(&self) -> usize {
            5
        }
    }

    #[test]
    fn test_system_collectors_render() {
        let stats = FixedStats;
        let heap = heap_bytes(&stats).unwrap();
        let tasks = task_num(&stats).unwrap();
        let version = firmware_version("0.3.1").unwrap();

        let mut registry = Registry::new();
        registry.register_all(&[&heap, &tasks, &version]).unwrap();

        let mut out = String::new();
        exposition::encode(&registry, &mut out).unwrap();

        assert!(out.contains("# TYPE esp32_heap_bytes gauge\n"));
        assert!(out.contains("esp32_heap_bytes{type=\"free\"} 48000.000000\n"));
        assert!(out.contains("esp32_heap_bytes{type=\"alloc\"} 24000.000000\n"));
        assert!(out.contains("esp32_task_num 5.000000\n"));
        assert!(out.contains("firmware_version{version=\"0.3.1\"} 1.000000\n"));
    }
}
