#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use airmon_core::sensors::SensorMetrics;
use airmon_core::watchdog;
use embassy_executor::Spawner;
use embassy_net::StackResources;
use embassy_time::{Duration, Ticker};
use esp_hal::clock::CpuClock;
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use log::{error, info};
use static_cell::StaticCell;

use airmon_firmware::app_state::{self, AppState, CLOCK};
use airmon_firmware::hardware::{self, SdCardPins};
use airmon_firmware::system::{SoftwareReset, task_spawned};
use airmon_firmware::{config, net};

const SENSOR_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    esp_hal::system::software_reset()
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("airmon {} starting", env!("CARGO_PKG_VERSION"));

    let config = config::load().expect("Invalid build-time configuration");

    // Storage failures other than a missing counter abort boot
    let mut reboot_store = hardware::init_reboot_store(SdCardPins {
        spi: peripherals.SPI2,
        sck: peripherals.GPIO36,
        mosi: peripherals.GPIO37,
        miso: peripherals.GPIO35,
        cs: peripherals.GPIO4,
    })
    .expect("Failed to set up SD card");
    let reboot_count =
        watchdog::record_boot(&mut reboot_store).expect("Failed to update reboot counter");
    drop(reboot_store);

    let app = app_state::init(&config, reboot_count).expect("Metric registration failed");

    let radio_init = esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller");
    static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    let radio_init = RADIO.init(radio_init);
    let (wifi_controller, interfaces) =
        esp_radio::wifi::new(radio_init, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi controller");

    let rng = Rng::new();
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());
    // DHCP, DNS, the SNTP socket and the HTTP listener
    static RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        RESOURCES.init(StackResources::new()),
        seed,
    );

    // Each task has a pool of one; a second spawn is a bug in this function
    spawner.spawn(
        net::connection(wifi_controller, config.internet, app.wifi_rssi)
            .expect("Wi-Fi task already running"),
    );
    task_spawned();
    spawner.spawn(net::net_runner(runner).expect("network runner already running"));
    task_spawned();
    spawner.spawn(net::time_sync(stack, &CLOCK).expect("time sync already running"));
    task_spawned();
    spawner.spawn(
        net::http_server(stack, app.exporter, config.exporter.port)
            .expect("HTTP server already running"),
    );
    task_spawned();
    spawner.spawn(
        liveness(app, config.exporter.check_interval()).expect("watchdog already running"),
    );
    task_spawned();

    let i2c = hardware::create_i2c_bus(peripherals.I2C0, peripherals.GPIO12, peripherals.GPIO11)
        .expect("Failed to configure I2C bus");
    poll_sensors(i2c, app.sensors).await
}

#[embassy_executor::task]
async fn liveness(app: &'static AppState, interval: Duration) {
    watchdog::supervise(app.watchdog, &CLOCK, interval, &SoftwareReset).await
}

#[cfg(feature = "sensor-sht40")]
async fn poll_sensors(i2c: hardware::SensorI2c, metrics: &'static SensorMetrics) -> ! {
    let mut sht40 = airmon_core::sensors::Sht40Sensor::new(i2c);
    let mut ticker = Ticker::every(SENSOR_POLL_INTERVAL);
    info!("Polling sensors every {} s", SENSOR_POLL_INTERVAL.as_secs());

    loop {
        if let Err(e) = metrics.poll(&mut sht40).await {
            error!("Dropping sensor sample: {}", e);
        }
        ticker.next().await;
    }
}

#[cfg(not(feature = "sensor-sht40"))]
async fn poll_sensors(_i2c: hardware::SensorI2c, _metrics: &'static SensorMetrics) -> ! {
    info!("No sensors enabled");
    loop {
        embassy_time::Timer::after(SENSOR_POLL_INTERVAL).await;
    }
}
