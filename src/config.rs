//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `node.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - PollingConfig: cycle cadence and the delay after a DHT22 fault.
//!     - SensorsConfig: DHT22 pin/retry policy and SPI clock for the ADC.
//!     - ReporterConfig: collection endpoint and request timeout.
//!     - LoggingConfig: log level and per-cycle data output.
//!
//!     calibration constants are not configurable; they live in convert.rs.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    pub polling: PollingConfig,
    pub sensors: SensorsConfig,
    pub reporter: ReporterConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_seconds: u64,
    /// wait after a DHT22 fault before the next cycle
    pub sensor_retry_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SensorsConfig {
    pub dht22: Dht22Config,
    pub adc: AdcConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Dht22Config {
    pub gpio_pin: u8,
    pub attempts: u32,
    pub retry_delay_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AdcConfig {
    pub clock_hz: u32,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReporterConfig {
    pub endpoint: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 5,
            sensor_retry_seconds: 5,
        }
    }
}

impl Default for Dht22Config {
    fn default() -> Self {
        // adafruit read_retry defaults
        Self {
            gpio_pin: 4,
            attempts: 15,
            retry_delay_seconds: 2,
        }
    }
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self { clock_hz: 1_350_000 }
    }
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://room-stat-tracker.onrender.com/api/sensors".to_string(),
            timeout_seconds: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_sensor_data: true,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn sensor_retry(&self) -> Duration {
        Duration::from_secs(self.sensor_retry_seconds)
    }
}

impl NodeConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// Load with default fallback
    ///
    /// Runs before the log subscriber exists, so notes are returned for the
    /// caller to log once logging is up.
    pub fn load_or_default() -> (Self, Vec<String>) {
        let paths = [
            std::path::PathBuf::from("config").join("node.toml"),
            std::path::PathBuf::from("..").join("config").join("node.toml"),
        ];
        let mut notes = Vec::new();

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        notes.push(format!("Loaded from {}", path.display()));
                        return (config, notes);
                    }
                    Err(e) => {
                        notes.push(format!("Warning: Failed to load {}: {}", path.display(), e));
                    }
                }
            }
        }

        notes.push("Warning: No config file found - using defaults".to_string());
        (Self::default(), notes)
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        tracing::info!("Endpoint: {}", self.reporter.endpoint);
        tracing::info!(
            "Poll Interval: {}s (sensor retry {}s)",
            self.polling.interval_seconds,
            self.polling.sensor_retry_seconds
        );
        tracing::info!(
            "DHT22: GPIO{} ({} attempts, {}s apart)",
            self.sensors.dht22.gpio_pin,
            self.sensors.dht22.attempts,
            self.sensors.dht22.retry_delay_seconds
        );
        tracing::info!("ADC: SPI0/CE0 @ {} Hz", self.sensors.adc.clock_hz);
        tracing::info!("Log Level: {}", self.logging.level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = NodeConfig::parse("").unwrap();
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.polling.interval(), Duration::from_secs(5));
        assert_eq!(config.reporter.timeout_seconds, 5);
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let config = NodeConfig::parse(
            r#"
[reporter]
endpoint = "http://hub.local:3000/api/sensors"

[polling]
sensor_retry_seconds = 1

[sensors.dht22]
gpio_pin = 17
"#,
        )
        .unwrap();

        assert_eq!(config.reporter.endpoint, "http://hub.local:3000/api/sensors");
        assert_eq!(config.reporter.timeout_seconds, 5);
        assert_eq!(config.polling.interval_seconds, 5);
        assert_eq!(config.polling.sensor_retry(), Duration::from_secs(1));
        assert_eq!(config.sensors.dht22.gpio_pin, 17);
        assert_eq!(config.sensors.dht22.attempts, 15);
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(NodeConfig::parse("[polling]\ninterval_seconds = \"soon\"").is_err());
    }
}
