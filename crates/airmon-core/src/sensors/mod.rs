//! Sensor abstraction and the series that sensor readings feed

#[cfg(feature = "sensor-sht40")]
mod sht40;

#[cfg(feature = "sensor-sht40")]
pub use sht40::Sht40Sensor;

use log::{debug, error};
use thiserror_no_std::Error;

use crate::clock::WallClock;
use crate::metrics::{Counter, Gauge, MetricDescriptor, MetricsError, Registry};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: {operation} failed: {details}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },

    #[error("{sensor}: initialization failed: {details}")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },

    #[error("{sensor}: timed out waiting to {operation}")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },

    #[error("{sensor}: I2C error: {details}")]
    I2cError {
        sensor: &'static str,
        details: &'static str,
    },
}

impl SensorError {
    pub const fn sensor(&self) -> &'static str {
        match self {
            Self::ReadFailed { sensor, .. }
            | Self::InitializationFailed { sensor, .. }
            | Self::Timeout { sensor, .. }
            | Self::I2cError { sensor, .. } => *sensor,
        }
    }

    /// Value of the `code` label on `sensors_errors`.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ReadFailed { .. } => "read_failed",
            Self::InitializationFailed { .. } => "init_failed",
            Self::Timeout { .. } => "timeout",
            Self::I2cError { .. } => "i2c",
        }
    }
}

/// Typed readings that know which series they belong to.
pub trait SensorReadings {
    fn record(&self, sensor: &str, metrics: &SensorMetrics) -> Result<(), MetricsError>;
}

/// Trait for sensors that produce typed readings.
pub trait Sensor {
    /// Value of the `sensor` label for everything this sensor reports.
    const NAME: &'static str;

    type Readings: SensorReadings;

    fn read(&mut self) -> impl Future<Output = Result<Self::Readings, SensorError>>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReadings {
    pub temperature_c: f32,
    pub relative_humidity_pct: f32,
}

impl SensorReadings for ClimateReadings {
    fn record(&self, sensor: &str, metrics: &SensorMetrics) -> Result<(), MetricsError> {
        metrics
            .temperature
            .set(&[sensor], f64::from(self.temperature_c))?;
        metrics
            .humidity
            .set(&[sensor], f64::from(self.relative_humidity_pct))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Co2Readings {
    pub co2_ppm: f32,
}

impl SensorReadings for Co2Readings {
    fn record(&self, sensor: &str, metrics: &SensorMetrics) -> Result<(), MetricsError> {
        metrics.co2.set(&[sensor], f64::from(self.co2_ppm))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureReadings {
    pub pressure_hpa: f32,
}

impl SensorReadings for PressureReadings {
    fn record(&self, sensor: &str, metrics: &SensorMetrics) -> Result<(), MetricsError> {
        metrics.pressure.set(&[sensor], f64::from(self.pressure_hpa))
    }
}

/// The `sensors_*` series.
pub struct SensorMetrics {
    pub errors: Counter,
    pub temperature: Gauge,
    pub humidity: Gauge,
    pub co2: Gauge,
    pub pressure: Gauge,
}

impl SensorMetrics {
    pub const SUBSYSTEM: &'static str = "sensors";

    pub fn new() -> Result<Self, MetricsError> {
        let gauge = |name: &'static str, help: &'static str| -> Result<Gauge, MetricsError> {
            Gauge::new_vec(
                MetricDescriptor::new(name, help).with_subsystem(Self::SUBSYSTEM),
                &["sensor"],
            )
        };

        Ok(Self {
            errors: Counter::new_vec(
                MetricDescriptor::new("errors", "Failed sensor operations")
                    .with_subsystem(Self::SUBSYSTEM),
                &["sensor", "code"],
            )?,
            temperature: gauge("temperature_c", "Temperature in degrees Celsius")?,
            humidity: gauge("relative_humidity_pct", "Relative humidity in percent")?,
            co2: gauge("co2_ppm", "CO2 concentration in ppm")?,
            pressure: gauge("pressure_hpa", "Barometric pressure in hPa")?,
        })
    }

    /// Stamp every sensor sample with wall-clock time.
    pub fn with_clock(self, clock: &'static dyn WallClock) -> Self {
        Self {
            errors: self.errors.with_clock(clock),
            temperature: self.temperature.with_clock(clock),
            humidity: self.humidity.with_clock(clock),
            co2: self.co2.with_clock(clock),
            pressure: self.pressure.with_clock(clock),
        }
    }

    pub fn register<'a>(&'a self, registry: &mut Registry<'a>) -> Result<(), MetricsError> {
        registry.register_all(&[
            &self.errors,
            &self.temperature,
            &self.humidity,
            &self.co2,
            &self.pressure,
        ])
    }

    pub fn record_error(&self, error: &SensorError) -> Result<(), MetricsError> {
        self.errors.inc(&[error.sensor(), error.code()])
    }

    /// Read `sensor` once and record the outcome.
    ///
    /// Sensor failures are logged and counted; only metric capacity errors are
    /// returned.
    pub async fn poll<S: Sensor>(&self, sensor: &mut S) -> Result<(), MetricsError> {
        match sensor.read().await {
            Ok(readings) => {
                debug!("{} read ok", S::NAME);
                readings.record(S::NAME, self)
            }
            Err(e) => {
                error!("{}", e);
                self.record_error(&e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;

    use super::*;
    use crate::metrics::exposition;

    struct ScriptedSensor {
        results: Vec<Result<ClimateReadings, SensorError>>,
    }

    impl Sensor for ScriptedSensor {
        const NAME: &'static str = "SHT40";
        type Readings = ClimateReadings;

        async fn read(&mut self) -> Result<ClimateReadings, SensorError> {
            self.results.remove(0)
        }
    }

    #[test]
    fn test_poll_records_readings_and_errors() {
        let metrics = SensorMetrics::new().unwrap();
        let timeout = SensorError::Timeout {
            sensor: "SHT40",
            operation: "measure",
        };
        let mut sensor = ScriptedSensor {
            results: vec![
                Ok(ClimateReadings {
                    temperature_c: 21.5,
                    relative_humidity_pct: 40.25,
                }),
                Err(timeout),
                Err(timeout),
            ],
        };

        for _ in 0..3 {
            block_on(metrics.poll(&mut sensor)).unwrap();
        }

        assert_eq!(metrics.temperature.get(&["SHT40"]), Some(21.5));
        assert_eq!(metrics.humidity.get(&["SHT40"]), Some(40.25));
        assert_eq!(metrics.errors.get(&["SHT40", "timeout"]), Some(2.0));
    }

    #[test]
    fn test_sensor_series_render() {
        let metrics = SensorMetrics::new().unwrap();
        let mut registry = Registry::new();
        metrics.register(&mut registry).unwrap();
        registry.add_global_label("hostname", "airmon").unwrap();

        Co2Readings { co2_ppm: 612.0 }
            .record("SCD41", &metrics)
            .unwrap();
        PressureReadings {
            pressure_hpa: 1013.25,
        }
        .record("BMP388", &metrics)
        .unwrap();

        let mut out = String::new();
        exposition::encode(&registry, &mut out).unwrap();

        assert!(out.contains("# TYPE sensors_errors counter\n"));
        assert!(out.contains("sensors_co2_ppm{hostname=\"airmon\", sensor=\"SCD41\"} 612.000000\n"));
        assert!(out.contains(
            "sensors_pressure_hpa{hostname=\"airmon\", sensor=\"BMP388\"} 1013.250000\n"
        ));
    }

    #[test]
    fn test_error_codes() {
        let e = SensorError::I2cError {
            sensor: "SHT40",
            details: "NACK",
        };
        assert_eq!(e.sensor(), "SHT40");
        assert_eq!(e.code(), "i2c");
    }
}
