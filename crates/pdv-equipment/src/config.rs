//! # Scale Configuration
//!
//! The `equipment` config domain, `scale` section:
//!
//! ```json
//! {
//!   "scale": {
//!     "enabled": true,
//!     "default_brand": "toledo",
//!     "connection": { "port": "COM1", "baudrate": 9600, "timeout": 2 },
//!     "supported_brands": {
//!       "filizola": { "commands": { "read_weight": "W" } }
//!     },
//!     "timing": { "settle_delay_ms": 500, "tare_tolerance": "0.010", "poll_interval_ms": 100 }
//!   }
//! }
//! ```
//!
//! Per-brand `connection` and `commands` entries override the shared ones
//! key by key. [`DriverConfig`] is the resolved, typed result handed to a
//! driver at construction.

use pdv_config::ConfigResolver;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::scale::ScaleBrand;

const DEFAULT_PORT: &str = "COM1";
const DEFAULT_BAUDRATE: u32 = 9600;
const DEFAULT_TIMEOUT_SECS: f64 = 2.0;

/// Wait after tare/zero before trusting the device again.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Interval between reads while waiting for a stable weight.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Largest |weight| in kg accepted as "zero" after a tare.
pub fn default_tare_tolerance() -> Decimal {
    Decimal::new(10, 3)
}

// =============================================================================
// Resolved driver parameters
// =============================================================================

/// Serial line parameters. Framing is fixed at 8N1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub port: String,
    pub baudrate: u32,
    pub timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        SerialSettings {
            port: DEFAULT_PORT.to_string(),
            baudrate: DEFAULT_BAUDRATE,
            timeout: Duration::from_secs(2),
        }
    }
}

/// Raw command strings written to the scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleCommands {
    pub read_weight: String,
    pub tare: String,
    pub zero: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    pub serial: SerialSettings,
    pub commands: ScaleCommands,
    pub settle_delay: Duration,
    pub tare_tolerance: Decimal,
    pub poll_interval: Duration,
}

impl DriverConfig {
    /// Brand defaults on the default port.
    pub fn for_brand(brand: ScaleBrand) -> Self {
        DriverConfig {
            serial: SerialSettings::default(),
            commands: brand.default_commands(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            tare_tolerance: default_tare_tolerance(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.serial.port = port.into();
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

// =============================================================================
// Config file shape
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub port: Option<String>,
    pub baudrate: Option<u32>,
    /// Seconds; fractions allowed.
    pub timeout: Option<f64>,
}

impl ConnectionSettings {
    fn overlay(&self, over: &ConnectionSettings) -> ConnectionSettings {
        ConnectionSettings {
            port: over.port.clone().or_else(|| self.port.clone()),
            baudrate: over.baudrate.or(self.baudrate),
            timeout: over.timeout.or(self.timeout),
        }
    }

    fn resolve(&self) -> SerialSettings {
        let secs = self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS);
        SerialSettings {
            port: self
                .port
                .clone()
                .unwrap_or_else(|| DEFAULT_PORT.to_string()),
            baudrate: self.baudrate.unwrap_or(DEFAULT_BAUDRATE),
            timeout: Duration::try_from_secs_f64(secs)
                .unwrap_or_else(|_| Duration::from_secs(2)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandOverrides {
    pub read_weight: Option<String>,
    pub tare: Option<String>,
    pub zero: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrandSettings {
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub commands: CommandOverrides,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSettings {
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_tare_tolerance")]
    pub tare_tolerance: Decimal,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_settle_delay_ms() -> u64 {
    DEFAULT_SETTLE_DELAY.as_millis() as u64
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

impl Default for TimingSettings {
    fn default() -> Self {
        TimingSettings {
            settle_delay_ms: default_settle_delay_ms(),
            tare_tolerance: default_tare_tolerance(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// The `equipment.scale` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_brand")]
    pub default_brand: String,

    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub supported_brands: BTreeMap<String, BrandSettings>,

    #[serde(default)]
    pub timing: TimingSettings,
}

fn default_brand() -> String {
    ScaleBrand::Toledo.as_str().to_string()
}

impl Default for ScaleSettings {
    fn default() -> Self {
        ScaleSettings {
            enabled: false,
            default_brand: default_brand(),
            connection: ConnectionSettings::default(),
            supported_brands: BTreeMap::new(),
            timing: TimingSettings::default(),
        }
    }
}

impl ScaleSettings {
    /// Reads `equipment.scale`, falling back to defaults (scale disabled).
    pub fn from_resolver(config: &ConfigResolver) -> Self {
        config.section("equipment", "scale")
    }

    /// Resolves the parameters for `brand`.
    pub fn driver_config(&self, brand: ScaleBrand) -> DriverConfig {
        let brand_settings = self
            .supported_brands
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(brand.as_str()))
            .map(|(_, settings)| settings.clone())
            .unwrap_or_default();

        let defaults = brand.default_commands();
        let over = brand_settings.commands;
        DriverConfig {
            serial: self.connection.overlay(&brand_settings.connection).resolve(),
            commands: ScaleCommands {
                read_weight: over.read_weight.unwrap_or(defaults.read_weight),
                tare: over.tare.unwrap_or(defaults.tare),
                zero: over.zero.unwrap_or(defaults.zero),
            },
            settle_delay: Duration::from_millis(self.timing.settle_delay_ms),
            tare_tolerance: self.timing.tare_tolerance.abs(),
            poll_interval: Duration::from_millis(self.timing.poll_interval_ms.max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_defaults() {
        let settings = ScaleSettings::default();
        assert!(!settings.enabled);

        let config = settings.driver_config(ScaleBrand::Toledo);
        assert_eq!(config.serial.port, "COM1");
        assert_eq!(config.serial.baudrate, 9600);
        assert_eq!(config.serial.timeout, Duration::from_secs(2));
        assert_eq!(config.commands.read_weight, "\u{5}");
        assert_eq!(config.settle_delay, Duration::from_millis(500));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.tare_tolerance, Decimal::from_str("0.010").unwrap());
    }

    #[test]
    fn test_brand_overrides_shared_connection() {
        let settings: ScaleSettings = serde_json::from_value(json!({
            "enabled": true,
            "default_brand": "filizola",
            "connection": { "port": "/dev/ttyS0", "baudrate": 4800, "timeout": 1.5 },
            "supported_brands": {
                "Filizola": {
                    "connection": { "port": "/dev/ttyUSB1" },
                    "commands": { "tare": "X" }
                }
            },
            "timing": { "tare_tolerance": "0.005", "settle_delay_ms": 50 }
        }))
        .unwrap();

        let config = settings.driver_config(ScaleBrand::Filizola);
        assert_eq!(config.serial.port, "/dev/ttyUSB1");
        assert_eq!(config.serial.baudrate, 4800);
        assert_eq!(config.serial.timeout, Duration::from_millis(1500));
        assert_eq!(config.commands.tare, "X");
        assert_eq!(config.commands.read_weight, "W");
        assert_eq!(config.tare_tolerance, Decimal::from_str("0.005").unwrap());
        assert_eq!(config.settle_delay, Duration::from_millis(50));
        assert_eq!(config.poll_interval, Duration::from_millis(100));

        // the other brand only sees the shared block
        let toledo = settings.driver_config(ScaleBrand::Toledo);
        assert_eq!(toledo.serial.port, "/dev/ttyS0");
    }

    #[test]
    fn test_negative_timeout_falls_back() {
        let settings: ScaleSettings =
            serde_json::from_value(json!({ "connection": { "timeout": -3 } })).unwrap();
        let config = settings.driver_config(ScaleBrand::Toledo);
        assert_eq!(config.serial.timeout, Duration::from_secs(2));
    }
}
