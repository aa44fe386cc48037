//! ESP32 implementations of the core's platform hooks

use core::sync::atomic::{AtomicUsize, Ordering};

use airmon_core::metrics::system::SystemStats;
use airmon_core::watchdog::Restart;
use log::info;

static SPAWNED_TASKS: AtomicUsize = AtomicUsize::new(0);

/// Count a task handed to the executor. Tasks in this firmware never exit.
pub fn task_spawned() {
    SPAWNED_TASKS.fetch_add(1, Ordering::Relaxed);
}

pub struct EspSystemStats;

impl SystemStats for EspSystemStats {
    fn heap_free_bytes(&self) -> usize {
        esp_alloc::HEAP.free()
    }

    fn heap_used_bytes(&self) -> usize {
        esp_alloc::HEAP.used()
    }

    fn task_count(&self) -> usize {
        // the main task is not spawned through the executor
        SPAWNED_TASKS.load(Ordering::Relaxed) + 1
    }
}

pub struct SoftwareReset;

impl Restart for SoftwareReset {
    fn restart(&self) -> ! {
        info!("Resetting");
        esp_hal::system::software_reset()
    }
}
