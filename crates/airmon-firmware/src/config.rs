//! Build-time configuration
//!
//! `build.rs` copies the `AIRMON_*` keys from `.env` into the compile
//! environment. Empty values fall back to the exporter defaults.

use airmon_core::config::{Config, ConfigError, ExporterConfig, InternetConfig};
use log::warn;

const WIFI_SSID: &str = env!("AIRMON_WIFI_SSID");
const WIFI_PASSWORD: &str = env!("AIRMON_WIFI_PASSWORD");
const HOSTNAME: &str = env!("AIRMON_HOSTNAME");
const PORT: &str = env!("AIRMON_PORT");
const METRICS_PATH: &str = env!("AIRMON_METRICS_PATH");
const MAX_SILENCE_SECS: &str = env!("AIRMON_MAX_SILENCE_SECS");
const CHECK_INTERVAL_SECS: &str = env!("AIRMON_CHECK_INTERVAL_SECS");

pub fn load() -> Result<Config<'static>, ConfigError> {
    let defaults = ExporterConfig::default();

    let exporter = ExporterConfig {
        port: parse_or("AIRMON_PORT", PORT, defaults.port),
        path: non_empty_or(METRICS_PATH, defaults.path),
        max_silence_secs: parse_or(
            "AIRMON_MAX_SILENCE_SECS",
            MAX_SILENCE_SECS,
            defaults.max_silence_secs,
        ),
        check_interval_secs: parse_or(
            "AIRMON_CHECK_INTERVAL_SECS",
            CHECK_INTERVAL_SECS,
            defaults.check_interval_secs,
        ),
        hostname: HOSTNAME,
    };
    exporter.validate()?;

    Ok(Config {
        internet: InternetConfig {
            ssid: WIFI_SSID,
            password: WIFI_PASSWORD,
        },
        exporter,
    })
}

fn non_empty_or(value: &'static str, default: &'static str) -> &'static str {
    if value.is_empty() { default } else { value }
}

fn parse_or<T: core::str::FromStr>(key: &str, value: &str, default: T) -> T {
    if value.is_empty() {
        return default;
    }
    value.parse().unwrap_or_else(|_| {
        warn!("{} is not a valid number: {:?}, using default", key, value);
        default
    })
}
