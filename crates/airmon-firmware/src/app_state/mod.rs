//! Process-wide state shared by the firmware tasks
//!
//! Everything here is created once in `main`, leaked into `'static` through
//! [`StaticCell`]s and then only read. The registry is filled while it is
//! still exclusively borrowed and frozen before any task starts.

use airmon_core::clock::{EmbassyClock, WallClock};
use airmon_core::config::Config;
use airmon_core::http::Exporter;
use airmon_core::metrics::system::{self, FirmwareVersion, HeapUsage, TaskCount};
use airmon_core::metrics::{Dynamic, Gauge, MetricDescriptor, MetricsError, Registry};
use airmon_core::sensors::SensorMetrics;
use airmon_core::watchdog::{self, LivenessWatchdog, RebootCount};
use log::info;
use static_cell::StaticCell;

use crate::system::EspSystemStats;

pub static CLOCK: EmbassyClock = EmbassyClock::new();
static STATS: EspSystemStats = EspSystemStats;

pub struct AppState {
    pub sensors: &'static SensorMetrics,
    pub wifi_rssi: &'static Gauge,
    pub watchdog: &'static LivenessWatchdog,
    pub exporter: &'static Exporter<'static>,
}

/// Build the metric set, register it and wire up the exporter.
///
/// Any error is a capacity problem in this function and should abort boot.
pub fn init(config: &Config<'static>, reboot_count: u64) -> Result<&'static AppState, MetricsError> {
    static SENSORS: StaticCell<SensorMetrics> = StaticCell::new();
    static WIFI_RSSI: StaticCell<Gauge> = StaticCell::new();
    static HEAP: StaticCell<Dynamic<HeapUsage<'static>>> = StaticCell::new();
    static TASKS: StaticCell<Dynamic<TaskCount<'static>>> = StaticCell::new();
    static VERSION: StaticCell<Dynamic<FirmwareVersion>> = StaticCell::new();
    static REBOOTS: StaticCell<Dynamic<RebootCount>> = StaticCell::new();
    static REGISTRY: StaticCell<Registry<'static>> = StaticCell::new();
    static WATCHDOG: StaticCell<LivenessWatchdog> = StaticCell::new();
    static EXPORTER: StaticCell<Exporter<'static>> = StaticCell::new();
    static APP: StaticCell<AppState> = StaticCell::new();

    let sensors: &'static SensorMetrics = SENSORS.init(SensorMetrics::new()?.with_clock(&CLOCK));
    let wifi_rssi: &'static Gauge = WIFI_RSSI.init(
        Gauge::new(
            MetricDescriptor::new("rssi_dbm", "Signal strength of the associated access point")
                .with_subsystem("wifi"),
        )
        .with_clock(&CLOCK),
    );

    let registry: &'static mut Registry<'static> = REGISTRY.init(Registry::new());
    if !config.exporter.hostname.is_empty() {
        registry.add_global_label("hostname", config.exporter.hostname)?;
    }

    sensors.register(registry)?;
    registry.register(wifi_rssi)?;
    registry.register(HEAP.init(system::heap_bytes(&STATS)?))?;
    registry.register(TASKS.init(system::task_num(&STATS)?))?;
    registry.register(VERSION.init(system::firmware_version(env!("CARGO_PKG_VERSION"))?))?;
    registry.register(REBOOTS.init(watchdog::reboot_count(reboot_count)?))?;

    info!("{} collectors registered", registry.len());
    let registry: &'static Registry<'static> = registry;

    let watchdog: &'static LivenessWatchdog = WATCHDOG.init(LivenessWatchdog::new(
        config.exporter.max_silence(),
        CLOCK.now_millis(),
    ));
    let exporter = EXPORTER.init(Exporter::new(
        registry,
        watchdog,
        &CLOCK,
        config.exporter.path,
    ));

    Ok(APP.init(AppState {
        sensors,
        wifi_rssi,
        watchdog,
        exporter,
    }))
}
