//! Wall-clock abstraction used for sample timestamps and the liveness watchdog

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

/// Source of the current time in milliseconds.
///
/// `now_millis` must always return something usable for measuring intervals,
/// even before the clock has been synchronised. It is allowed to jump when the
/// clock is set; the watchdog guards against that.
pub trait WallClock: Sync {
    fn now_millis(&self) -> u64;

    /// Milliseconds since the Unix epoch, or `None` while the clock is unset.
    fn unix_millis(&self) -> Option<u64>;
}

/// Boot-relative clock that becomes a wall clock once synchronised.
///
/// Before [`EmbassyClock::synchronize`] is called, `now_millis` counts from
/// boot. Afterwards it reports Unix time, which makes it jump forward by
/// decades exactly once.
pub struct EmbassyClock {
    unix_offset_ms: Mutex<CriticalSectionRawMutex, Cell<Option<u64>>>,
}

impl EmbassyClock {
    pub const fn new() -> Self {
        Self {
            unix_offset_ms: Mutex::new(Cell::new(None)),
        }
    }

    /// Record that the current instant corresponds to `unix_ms`.
    pub fn synchronize(&self, unix_ms: u64) {
        let since_boot = embassy_time::Instant::now().as_millis();
        self.unix_offset_ms
            .lock(|offset| offset.set(Some(unix_ms.saturating_sub(since_boot))));
        log::info!("Wall clock synchronised to {} ms", unix_ms);
    }

    pub fn is_synchronized(&self) -> bool {
        self.unix_offset_ms.lock(|offset| offset.get().is_some())
    }
}

impl Default for EmbassyClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for EmbassyClock {
    fn now_millis(&self) -> u64 {
        let since_boot = embassy_time::Instant::now().as_millis();
        since_boot + self.unix_offset_ms.lock(|offset| offset.get()).unwrap_or(0)
    }

    fn unix_millis(&self) -> Option<u64> {
        let since_boot = embassy_time::Instant::now().as_millis();
        self.unix_offset_ms
            .lock(|offset| offset.get())
            .map(|offset| offset + since_boot)
    }
}

/// Clock that only moves when told to. Zero counts as "unset".
pub struct ManualClock {
    now_ms: Mutex<CriticalSectionRawMutex, Cell<u64>>,
}

impl ManualClock {
    pub const fn new(now_ms: u64) -> Self {
        Self {
            now_ms: Mutex::new(Cell::new(now_ms)),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.lock(|now| now.set(now_ms));
    }
}

impl WallClock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now_ms.lock(|now| now.get())
    }

    fn unix_millis(&self) -> Option<u64> {
        Some(self.now_millis()).filter(|&now| now != 0)
    }
}
