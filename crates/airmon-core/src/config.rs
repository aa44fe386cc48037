use embassy_time::Duration;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct Config<'a> {
    pub internet: InternetConfig<'a>,
    pub exporter: ExporterConfig<'a>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct InternetConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

/// Settings for the `/metrics` endpoint and its liveness watchdog.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct ExporterConfig<'a> {
    pub port: u16,
    pub path: &'a str,
    /// Restart when nobody scraped for this long.
    pub max_silence_secs: u32,
    pub check_interval_secs: u32,
    /// Exported as a `hostname` global label unless empty.
    pub hostname: &'a str,
}

impl Default for ExporterConfig<'_> {
    fn default() -> Self {
        Self {
            port: 80,
            path: "/metrics",
            max_silence_secs: 600,
            check_interval_secs: 1,
            hostname: "",
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("scrape path must start with '/'")]
    InvalidPath,
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("max silence must be longer than the check interval")]
    SilenceShorterThanInterval,
}

impl ExporterConfig<'_> {
    pub fn max_silence(&self) -> Duration {
        Duration::from_secs(u64::from(self.max_silence_secs))
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.check_interval_secs))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.path.starts_with('/') {
            return Err(ConfigError::InvalidPath);
        }
        if self.port == 0 {
            return Err(ConfigError::Zero { field: "port" });
        }
        if self.check_interval_secs == 0 {
            return Err(ConfigError::Zero {
                field: "check_interval_secs",
            });
        }
        if self.max_silence_secs <= self.check_interval_secs {
            return Err(ConfigError::SilenceShorterThanInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExporterConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.max_silence(), Duration::from_secs(600));
        assert_eq!(config.check_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_validation() {
        let config = ExporterConfig {
            path: "metrics",
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidPath));

        let config = ExporterConfig {
            max_silence_secs: 1,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::SilenceShorterThanInterval)
        );

        let config = ExporterConfig {
            check_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero {
                field: "check_interval_secs"
            })
        );
    }
}
