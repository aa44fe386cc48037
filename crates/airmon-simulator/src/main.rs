//! Desktop simulator for the airmon sensor exporter.
//!
//! Runs the airmon-core registry, exposition and watchdog on a desktop host.
//! Synthetic sensors feed the same `sensors_*` series the firmware exports,
//! `std::net` stands in for the Wi-Fi stack, a file stands in for the SD card
//! and exiting the process stands in for a device reset.
//!
//! # Environment
//!
//! | Variable | Default |
//! |----------|---------|
//! | `AIRMON_PORT` | `9100` |
//! | `AIRMON_METRICS_PATH` | `/metrics` |
//! | `AIRMON_MAX_SILENCE_SECS` | `600` |
//! | `AIRMON_CHECK_INTERVAL_SECS` | `1` |
//! | `AIRMON_HOSTNAME` | `airmon-simulator` |
//! | `AIRMON_STATE_DIR` | `./airmon-state` |
//!
//! Logging is controlled with `RUST_LOG` (defaults to `info`).

use std::fs;
use std::io::{self, Read};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use airmon_core::clock::WallClock;
use airmon_core::config::ExporterConfig;
use airmon_core::http::{Exporter, Outcome, head_complete};
use airmon_core::metrics::system::{self, SystemStats};
use airmon_core::metrics::{Gauge, MetricDescriptor, Registry};
use airmon_core::sensors::{
    ClimateReadings, Co2Readings, PressureReadings, Sensor, SensorError, SensorMetrics,
};
use airmon_core::storage::{KeyValueStore, KvRecord, RECORD_BUF_LEN, StorageError};
use airmon_core::watchdog::{self, LivenessWatchdog, REBOOT_NAMESPACE, Restart};
use embassy_executor::Executor;
use embassy_futures::block_on;
use embedded_io_async::{ErrorKind, ErrorType, Write};
use log::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Interval between synthetic sensor samples.
const MOCK_SAMPLE_INTERVAL: Duration = Duration::from_secs(2);

/// Every n-th climate read fails, so `sensors_errors` has something to show.
const CLIMATE_FAILURE_PERIOD: u64 = 7;

const DEFAULT_PORT: u16 = 9100;
const DEFAULT_HOSTNAME: &str = "airmon-simulator";
const DEFAULT_STATE_DIR: &str = "./airmon-state";

const HEAD_BUF_LEN: usize = 512;

// ---------------------------------------------------------------------------
// Platform hooks
// ---------------------------------------------------------------------------

/// Wall clock straight from the host.
struct SystemClock;

impl WallClock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    fn unix_millis(&self) -> Option<u64> {
        Some(self.now_millis())
    }
}

static CLOCK: SystemClock = SystemClock;

/// Pretends to be the firmware's heap and counts the simulator's threads.
struct SimStats {
    threads: AtomicUsize,
}

/// Same heap size the firmware reserves.
const SIMULATED_HEAP_BYTES: usize = 73_744;

impl SystemStats for SimStats {
    fn heap_free_bytes(&self) -> usize {
        SIMULATED_HEAP_BYTES - self.heap_used_bytes()
    }

    fn heap_used_bytes(&self) -> usize {
        size_of::<SensorMetrics>() + size_of::<Registry<'static>>()
    }

    fn task_count(&self) -> usize {
        self.threads.load(Ordering::Relaxed)
    }
}

static STATS: SimStats = SimStats {
    threads: AtomicUsize::new(1),
};

/// A "device reset" ends the process; a supervisor (or the user) restarts it.
struct ProcessExit;

impl Restart for ProcessExit {
    fn restart(&self) -> ! {
        error!("Simulated reset: exiting");
        std::process::exit(1)
    }
}

/// Key/value namespace stored as a postcard record in `<dir>/<namespace>.kv`.
struct FileStore {
    path: PathBuf,
    namespace: &'static str,
}

impl FileStore {
    fn open(dir: &Path, namespace: &'static str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(format!("{namespace}.kv")),
            namespace,
        })
    }

    fn load(&self) -> Result<KvRecord, StorageError> {
        match fs::read(&self.path) {
            Ok(bytes) => KvRecord::decode(&bytes, self.namespace),
            Err(e) if e.kind() == io::ErrorKind::NotFound => KvRecord::new(self.namespace),
            Err(e) => {
                error!("Reading {} failed: {}", self.path.display(), e);
                Err(StorageError::Device { operation: "read" })
            }
        }
    }
}

impl KeyValueStore for FileStore {
    fn get_u64(&mut self, key: &str) -> Result<Option<u64>, StorageError> {
        Ok(self.load()?.get(key))
    }

    fn set_u64(&mut self, key: &str, value: u64) -> Result<(), StorageError> {
        let mut record = self.load()?;
        record.set(key, value)?;

        let mut buf = [0u8; RECORD_BUF_LEN];
        let encoded = record.encode(&mut buf)?;
        fs::write(&self.path, encoded).map_err(|e| {
            error!("Writing {} failed: {}", self.path.display(), e);
            StorageError::Device { operation: "write" }
        })
    }
}

// ---------------------------------------------------------------------------
// Mock sensors
// ---------------------------------------------------------------------------

/// SHT40 stand-in: temperature and humidity on slow sine waves.
struct MockClimate {
    reads: u64,
    elapsed_secs: f64,
}

impl Sensor for MockClimate {
    const NAME: &'static str = "SHT40";
    type Readings = ClimateReadings;

    async fn read(&mut self) -> Result<ClimateReadings, SensorError> {
        self.reads += 1;
        self.elapsed_secs += MOCK_SAMPLE_INTERVAL.as_secs_f64();
        let t = self.elapsed_secs;

        if self.reads % CLIMATE_FAILURE_PERIOD == 0 {
            return Err(SensorError::Timeout {
                sensor: Self::NAME,
                operation: "measure temperature/humidity",
            });
        }

        // Temperature: 20–26 °C sinusoidal with slow drift
        let temperature = 23.0 + 3.0 * (t / 120.0).sin() + 0.5 * (t / 37.0).cos();
        // Humidity: 40–60 % with different period
        let humidity = 50.0 + 10.0 * (t / 180.0).sin() + 2.0 * (t / 23.0).cos();

        Ok(ClimateReadings {
            temperature_c: temperature as f32,
            relative_humidity_pct: humidity as f32,
        })
    }
}

struct MockCo2 {
    elapsed_secs: f64,
}

impl Sensor for MockCo2 {
    const NAME: &'static str = "SCD41";
    type Readings = Co2Readings;

    async fn read(&mut self) -> Result<Co2Readings, SensorError> {
        self.elapsed_secs += MOCK_SAMPLE_INTERVAL.as_secs_f64();
        let t = self.elapsed_secs;

        // CO₂: 400–800 ppm with a longer cycle
        let co2 = 600.0 + 200.0 * (t / 300.0).sin() + 30.0 * (t / 41.0).cos();
        Ok(Co2Readings {
            co2_ppm: co2 as f32,
        })
    }
}

struct MockPressure {
    elapsed_secs: f64,
}

impl Sensor for MockPressure {
    const NAME: &'static str = "BMP388";
    type Readings = PressureReadings;

    async fn read(&mut self) -> Result<PressureReadings, SensorError> {
        self.elapsed_secs += MOCK_SAMPLE_INTERVAL.as_secs_f64();
        let t = self.elapsed_secs;

        let pressure = 1013.0 + 4.0 * (t / 600.0).sin();
        Ok(PressureReadings {
            pressure_hpa: pressure as f32,
        })
    }
}

fn sensor_loop(metrics: &'static SensorMetrics) {
    let mut climate = MockClimate {
        reads: 0,
        elapsed_secs: 0.0,
    };
    let mut co2 = MockCo2 { elapsed_secs: 0.0 };
    let mut pressure = MockPressure { elapsed_secs: 0.0 };

    loop {
        let polled = block_on(async {
            metrics.poll(&mut climate).await?;
            metrics.poll(&mut co2).await?;
            metrics.poll(&mut pressure).await
        });
        if let Err(e) = polled {
            error!("Dropping sensor sample: {}", e);
        }
        thread::sleep(MOCK_SAMPLE_INTERVAL);
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Blocking stream behind the exporter's async sink trait.
struct StreamWriter<'a>(&'a mut TcpStream);

impl ErrorType for StreamWriter<'_> {
    type Error = ErrorKind;
}

impl Write for StreamWriter<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        io::Write::write(self.0, buf).map_err(|e| io_kind(&e))
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        io::Write::flush(self.0).map_err(|e| io_kind(&e))
    }
}

fn io_kind(e: &io::Error) -> ErrorKind {
    match e.kind() {
        io::ErrorKind::BrokenPipe => ErrorKind::BrokenPipe,
        io::ErrorKind::ConnectionReset => ErrorKind::ConnectionReset,
        io::ErrorKind::TimedOut => ErrorKind::TimedOut,
        _ => ErrorKind::Other,
    }
}

fn read_head(stream: &mut TcpStream) -> io::Result<([u8; HEAD_BUF_LEN], usize)> {
    let mut head = [0u8; HEAD_BUF_LEN];
    let mut len = 0;
    while len < head.len() {
        let read = stream.read(&mut head[len..])?;
        if read == 0 {
            break;
        }
        len += read;
        if head_complete(&head[..len]) {
            break;
        }
    }
    Ok((head, len))
}

fn handle_connection(exporter: &Exporter<'_>, mut stream: TcpStream) -> io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    let (head, len) = read_head(&mut stream)?;

    match block_on(exporter.handle(&head[..len], &mut StreamWriter(&mut stream))) {
        Ok(Outcome::Scraped(stats)) => debug!(
            "Scrape served: {} collectors, {} bytes",
            stats.collectors, stats.bytes
        ),
        Ok(outcome) => debug!("Request handled: {:?}", outcome),
        Err(e) => warn!("Response aborted: {}", e),
    }
    Ok(())
}

fn serve(listener: TcpListener, exporter: &Exporter<'_>) {
    for stream in listener.incoming() {
        match stream.and_then(|stream| handle_connection(exporter, stream)) {
            Ok(()) => {}
            Err(e) => warn!("Connection failed: {}", e),
        }
    }
}

// ---------------------------------------------------------------------------
// Watchdog
// ---------------------------------------------------------------------------

#[embassy_executor::task]
async fn liveness_task(liveness: &'static LivenessWatchdog, interval: embassy_time::Duration) {
    watchdog::supervise(liveness, &CLOCK, interval, &ProcessExit).await
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value.parse().unwrap_or_else(|_| {
            warn!("{} is not valid: {:?}, using default", key, value);
            default
        }),
        _ => default,
    }
}

fn env_str(key: &str, default: &str) -> &'static str {
    let value = std::env::var(key)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_owned());
    value.leak()
}

fn exporter_config() -> ExporterConfig<'static> {
    let defaults = ExporterConfig::default();
    ExporterConfig {
        port: env_or("AIRMON_PORT", DEFAULT_PORT),
        path: env_str("AIRMON_METRICS_PATH", defaults.path),
        max_silence_secs: env_or("AIRMON_MAX_SILENCE_SECS", defaults.max_silence_secs),
        check_interval_secs: env_or("AIRMON_CHECK_INTERVAL_SECS", defaults.check_interval_secs),
        hostname: env_str("AIRMON_HOSTNAME", DEFAULT_HOSTNAME),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn spawn(name: &str, f: impl FnOnce() + Send + 'static) {
    STATS.threads.fetch_add(1, Ordering::Relaxed);
    if let Err(e) = thread::Builder::new().name(name.to_owned()).spawn(f) {
        error!("Failed to spawn {}: {}", name, e);
        std::process::exit(1);
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = exporter_config();
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(2);
    }

    let state_dir = PathBuf::from(env_str("AIRMON_STATE_DIR", DEFAULT_STATE_DIR));
    let reboot_count = FileStore::open(&state_dir, REBOOT_NAMESPACE)
        .map_err(|e| e.to_string())
        .and_then(|mut store| watchdog::record_boot(&mut store).map_err(|e| e.to_string()));
    let reboot_count = match reboot_count {
        Ok(count) => count,
        Err(e) => {
            error!("Reboot counter unavailable: {}", e);
            std::process::exit(1);
        }
    };

    // Registration failures are capacity bugs in this function; treat them as fatal.
    let sensors: &'static SensorMetrics = Box::leak(Box::new(
        SensorMetrics::new()
            .expect("sensor series")
            .with_clock(&CLOCK),
    ));
    let wifi_rssi: &'static Gauge = Box::leak(Box::new(Gauge::new(
        MetricDescriptor::new("rssi_dbm", "Signal strength of the associated access point")
            .with_subsystem("wifi"),
    )));
    // There is no radio; report a steady, healthy signal.
    wifi_rssi.set(&[], -55.0).expect("unlabeled gauge");

    let registry: &'static mut Registry<'static> = Box::leak(Box::new(Registry::new()));
    registry
        .add_global_label("hostname", config.hostname)
        .expect("global label");
    sensors.register(registry).expect("sensor registration");
    registry.register(wifi_rssi).expect("rssi registration");
    registry
        .register(Box::leak(Box::new(
            system::heap_bytes(&STATS).expect("heap collector"),
        )))
        .expect("heap registration");
    registry
        .register(Box::leak(Box::new(
            system::task_num(&STATS).expect("task collector"),
        )))
        .expect("task registration");
    registry
        .register(Box::leak(Box::new(
            system::firmware_version(env!("CARGO_PKG_VERSION")).expect("version collector"),
        )))
        .expect("version registration");
    registry
        .register(Box::leak(Box::new(
            watchdog::reboot_count(reboot_count).expect("reboot collector"),
        )))
        .expect("reboot registration");
    let registry: &'static Registry<'static> = registry;

    let liveness: &'static LivenessWatchdog = Box::leak(Box::new(LivenessWatchdog::new(
        config.max_silence(),
        CLOCK.now_millis(),
    )));
    let exporter = Exporter::new(registry, liveness, &CLOCK, config.path);

    info!(
        "airmon simulator {} (boot #{}), {} collectors",
        env!("CARGO_PKG_VERSION"),
        reboot_count,
        registry.len()
    );

    spawn("sensors", move || sensor_loop(sensors));

    let check_interval = config.check_interval();
    spawn("watchdog", move || {
        let executor: &'static mut Executor = Box::leak(Box::new(Executor::new()));
        executor.run(|spawner| {
            spawner.spawn(liveness_task(liveness, check_interval)).expect("watchdog task");
        })
    });

    let listener = match TcpListener::bind(("0.0.0.0", config.port)) {
        Ok(listener) => listener,
        Err(e) => {
            error!("Cannot listen on port {}: {}", config.port, e);
            std::process::exit(1);
        }
    };
    info!(
        "Serving metrics on http://127.0.0.1:{}{}",
        config.port, config.path
    );
    serve(listener, &exporter);
}
