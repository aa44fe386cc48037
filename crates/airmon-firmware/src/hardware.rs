//! Peripheral setup for the sensor bus and the SD card

use embedded_hal_bus::spi::ExclusiveDevice;
use embedded_sdmmc::{SdCard, TimeSource, Timestamp};
use esp_hal::Blocking;
use esp_hal::delay::Delay;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::i2c::master::Config as I2cConfig;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;

use airmon_core::storage::SdCardStore;
use airmon_core::watchdog::REBOOT_NAMESPACE;

/// 8.3 file holding the reboot counter namespace.
pub const REBOOT_FILE: &str = "PROMUTIL.KV";

pub type SensorI2c = esp_hal::i2c::master::I2c<'static, esp_hal::Async>;

pub type SdSpi = ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, Delay>;

pub type RebootStore = SdCardStore<SdSpi, Delay, BootTimeSource>;

/// Initialize the I2C bus the sensors hang off (400 kHz).
pub fn create_i2c_bus(
    i2c0: esp_hal::peripherals::I2C0<'static>,
    sda: esp_hal::peripherals::GPIO12<'static>,
    scl: esp_hal::peripherals::GPIO11<'static>,
) -> Result<SensorI2c, esp_hal::i2c::master::ConfigError> {
    Ok(esp_hal::i2c::master::I2c::new(
        i2c0,
        I2cConfig::default().with_frequency(Rate::from_khz(400)),
    )?
    .with_sda(sda)
    .with_scl(scl)
    .into_async())
}

/// SD card pins on the SPI2 bus.
pub struct SdCardPins {
    pub spi: esp_hal::peripherals::SPI2<'static>,
    pub sck: esp_hal::peripherals::GPIO36<'static>,
    pub mosi: esp_hal::peripherals::GPIO37<'static>,
    pub miso: esp_hal::peripherals::GPIO35<'static>,
    pub cs: esp_hal::peripherals::GPIO4<'static>,
}

/// Bring up the SD card and open the reboot counter namespace on it.
///
/// The card is clocked at 400 kHz during setup, which every card accepts.
pub fn init_reboot_store(pins: SdCardPins) -> Result<RebootStore, &'static str> {
    let spi_bus = Spi::new(
        pins.spi,
        SpiConfig::default().with_frequency(Rate::from_khz(400)),
    )
    .map_err(|_| "invalid SPI configuration")?
    .with_sck(pins.sck)
    .with_mosi(pins.mosi)
    .with_miso(pins.miso);

    let cs = Output::new(pins.cs, Level::High, OutputConfig::default());
    let spi_device =
        ExclusiveDevice::new(spi_bus, cs, Delay::new()).map_err(|_| "SD card CS pin error")?;

    let sd_card = SdCard::new(spi_device, Delay::new());
    Ok(SdCardStore::new(
        sd_card,
        BootTimeSource,
        REBOOT_NAMESPACE,
        REBOOT_FILE,
    ))
}

/// FAT timestamps for files written before the wall clock is known.
pub struct BootTimeSource;

impl TimeSource for BootTimeSource {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 55,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}
