//! Scrape liveness watchdog and the persisted reboot counter
//!
//! The device has no supervisor process. If nobody has scraped the exporter
//! for `max_silence`, the firmware assumes it is wedged (Wi-Fi stuck, socket
//! leak, dead task) and restarts itself. Every boot bumps a counter in
//! persistent storage so those restarts stay visible on the dashboard.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Ticker};
use log::{error, info, warn};

use crate::clock::WallClock;
use crate::metrics::{Dynamic, MetricDescriptor, MetricsError, SampleSource, SampleWriter};
use crate::storage::{KeyValueStore, StorageError};

/// Namespace holding the reboot counter.
pub const REBOOT_NAMESPACE: &str = "prometheus_util";
pub const REBOOT_KEY: &str = "reboot_count";

/// Silences longer than this are clock discontinuities, not outages.
pub const CLOCK_JUMP_THRESHOLD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

pub const DEFAULT_MAX_SILENCE: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of one [`LivenessWatchdog::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Healthy,
    /// The clock moved backwards or jumped forward by more than
    /// [`CLOCK_JUMP_THRESHOLD`]; the silence window starts over.
    ClockJump,
    /// Nobody scraped for longer than the allowed silence.
    Expired { silence_ms: u64 },
}

pub struct LivenessWatchdog {
    last_scrape_ms: Mutex<CriticalSectionRawMutex, Cell<u64>>,
    max_silence: Duration,
}

impl LivenessWatchdog {
    /// Start the silence window at `now_ms`.
    pub const fn new(max_silence: Duration, now_ms: u64) -> Self {
        Self {
            last_scrape_ms: Mutex::new(Cell::new(now_ms)),
            max_silence,
        }
    }

    pub fn max_silence(&self) -> Duration {
        self.max_silence
    }

    pub fn last_scrape_ms(&self) -> u64 {
        self.last_scrape_ms.lock(Cell::get)
    }

    pub fn on_scrape(&self, now_ms: u64) {
        self.last_scrape_ms.lock(|last| last.set(now_ms));
    }

    pub fn check(&self, now_ms: u64) -> Verdict {
        self.last_scrape_ms.lock(|last| {
            let Some(delta) = now_ms.checked_sub(last.get()) else {
                last.set(now_ms);
                return Verdict::ClockJump;
            };

            if delta > CLOCK_JUMP_THRESHOLD.as_millis() {
                last.set(now_ms);
                Verdict::ClockJump
            } else if delta > self.max_silence.as_millis() {
                Verdict::Expired { silence_ms: delta }
            } else {
                Verdict::Healthy
            }
        })
    }
}

/// Platform hook that reboots the device.
pub trait Restart {
    fn restart(&self) -> !;
}

/// Check the watchdog every `interval` and restart once it expires.
pub async fn supervise<R: Restart + ?Sized>(
    watchdog: &LivenessWatchdog,
    clock: &dyn WallClock,
    interval: Duration,
    restart: &R,
) -> ! {
    info!(
        "Liveness watchdog armed: restart after {} s without a scrape",
        watchdog.max_silence().as_secs()
    );

    let mut ticker = Ticker::every(interval);
    loop {
        ticker.next().await;

        match watchdog.check(clock.now_millis()) {
            Verdict::Healthy => {}
            Verdict::ClockJump => warn!("Clock discontinuity detected, restarting silence window"),
            Verdict::Expired { silence_ms } => {
                error!("No scrape for {} ms, restarting", silence_ms);
                restart.restart();
            }
        }
    }
}

/// Increment the persisted reboot counter and return the new value.
///
/// A missing key counts as zero. Any other storage failure is returned so the
/// caller can refuse to boot.
pub fn record_boot<S: KeyValueStore + ?Sized>(store: &mut S) -> Result<u64, StorageError> {
    let previous = store.get_u64(REBOOT_KEY)?.unwrap_or(0);
    let count = previous.saturating_add(1);
    store.set_u64(REBOOT_KEY, count)?;

    info!("Boot #{}", count);
    Ok(count)
}

/// Reboot count fixed at boot.
pub struct RebootCount(pub u64);

impl SampleSource for RebootCount {
    fn produce(&self, out: &mut SampleWriter<'_>) -> Result<(), MetricsError> {
        out.push(&[], self.0 as f64)
    }
}

pub fn reboot_count(count: u64) -> Result<Dynamic<RebootCount>, MetricsError> {
    Dynamic::new(
        MetricDescriptor::new(REBOOT_KEY, "Number of device boots"),
        &[],
        RebootCount(count),
    )
}
