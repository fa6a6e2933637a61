//! # Equipment Manager
//!
//! Vendor-agnostic facade over the configured scale.
//!
//! ```text
//!   ScaleSettings ──► EquipmentManager::new ──► Some(ScaleDriver)   enabled
//!                                          └─► None                disabled
//! ```
//!
//! A disabled manager never touches a port: every call returns the absent
//! value (`false`, `None`, a `disabled` report). An unknown brand on an
//! enabled scale fails construction.

use pdv_config::ConfigResolver;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

use crate::config::ScaleSettings;
use crate::error::EquipmentResult;
use crate::scale::{Scale, ScaleBrand, ScaleDriver, ScaleReading};
use crate::transport::Transport;

/// Status shown by the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleStatusReport {
    pub enabled: bool,
    pub connected: bool,
    /// An [`EquipmentStatus`](crate::EquipmentStatus) name, or `disabled`.
    pub status: String,
    pub last_weight: Option<Decimal>,
    pub weight_stable: bool,
    pub last_error: Option<String>,
    pub brand: Option<String>,
}

impl ScaleStatusReport {
    pub fn disabled() -> Self {
        ScaleStatusReport {
            enabled: false,
            connected: false,
            status: "disabled".to_string(),
            last_weight: None,
            weight_stable: false,
            last_error: None,
            brand: None,
        }
    }
}

/// Formats a weight for display: `"12.345 kg"`, or `"--- kg"` when absent.
pub fn format_weight(weight: Option<Decimal>) -> String {
    match weight {
        Some(w) => format!("{:.3} kg", w),
        None => "--- kg".to_string(),
    }
}

pub struct EquipmentManager {
    scale: Option<ScaleDriver>,
}

impl EquipmentManager {
    /// Builds the configured driver on a real serial port.
    pub fn new(settings: &ScaleSettings) -> EquipmentResult<Self> {
        Self::build(settings, ScaleDriver::serial)
    }

    /// Same selection rules with a caller-supplied transport.
    pub fn with_transport(
        settings: &ScaleSettings,
        transport: Box<dyn Transport>,
    ) -> EquipmentResult<Self> {
        Self::build(settings, move |brand, config| {
            ScaleDriver::new(brand, config, transport)
        })
    }

    pub fn from_config(config: &ConfigResolver) -> EquipmentResult<Self> {
        Self::new(&ScaleSettings::from_resolver(config))
    }

    pub fn disabled() -> Self {
        EquipmentManager { scale: None }
    }

    fn build<F>(settings: &ScaleSettings, make: F) -> EquipmentResult<Self>
    where
        F: FnOnce(ScaleBrand, crate::config::DriverConfig) -> ScaleDriver,
    {
        if !settings.enabled {
            info!("Scale disabled in configuration");
            return Ok(Self::disabled());
        }

        let brand: ScaleBrand = settings.default_brand.parse()?;
        let config = settings.driver_config(brand);
        info!(
            brand = %brand,
            port = %config.serial.port,
            baudrate = config.serial.baudrate,
            "Scale configured"
        );
        Ok(EquipmentManager {
            scale: Some(make(brand, config)),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.scale.is_some()
    }

    pub fn brand(&self) -> Option<ScaleBrand> {
        self.scale.as_ref().map(|s| s.brand())
    }

    pub fn connect(&mut self) -> bool {
        self.scale.as_mut().is_some_and(|s| s.connect())
    }

    /// `false` when there is no scale to disconnect.
    pub fn disconnect(&mut self) -> bool {
        self.scale.as_mut().is_some_and(|s| s.disconnect())
    }

    pub fn is_connected(&self) -> bool {
        self.scale.as_ref().is_some_and(|s| s.is_connected())
    }

    pub fn read_weight(&mut self) -> Option<ScaleReading> {
        self.scale.as_mut().and_then(|s| s.read_weight())
    }

    pub fn wait_for_stable_weight(&mut self, timeout: Duration) -> Option<ScaleReading> {
        self.scale
            .as_mut()
            .and_then(|s| s.wait_for_stable_weight(timeout))
    }

    pub fn tare(&mut self) -> bool {
        self.scale.as_mut().is_some_and(|s| s.tare())
    }

    pub fn zero(&mut self) -> bool {
        self.scale.as_mut().is_some_and(|s| s.zero())
    }

    pub fn last_reading(&self) -> Option<&ScaleReading> {
        self.scale.as_ref().and_then(|s| s.last_reading())
    }

    pub fn is_weight_stable(&self) -> bool {
        self.last_reading().is_some_and(|r| r.stable)
    }

    pub fn status(&self) -> ScaleStatusReport {
        let Some(scale) = self.scale.as_ref() else {
            return ScaleStatusReport::disabled();
        };
        let last = scale.last_reading();
        ScaleStatusReport {
            enabled: true,
            connected: scale.is_connected(),
            status: scale.status().to_string(),
            last_weight: last.map(ScaleReading::signed_weight),
            weight_stable: last.is_some_and(|r| r.stable),
            last_error: scale.last_error().map(str::to_string),
            brand: Some(scale.brand().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EquipmentError;
    use crate::transport::mock::{MockTransport, Reply};
    use serde_json::json;
    use std::str::FromStr;

    fn settings(value: serde_json::Value) -> ScaleSettings {
        serde_json::from_value(value).unwrap()
    }

    fn enabled(brand: &str) -> ScaleSettings {
        settings(json!({
            "enabled": true,
            "default_brand": brand,
            "connection": { "port": "/dev/ttyTEST" },
            "timing": { "settle_delay_ms": 0, "poll_interval_ms": 10 }
        }))
    }

    #[test]
    fn test_disabled_manager_is_inert() {
        let mock = MockTransport::new();
        let mut manager =
            EquipmentManager::with_transport(&ScaleSettings::default(), Box::new(mock.clone()))
                .unwrap();

        assert!(!manager.is_enabled());
        assert!(!manager.connect());
        assert!(!manager.disconnect());
        assert!(manager.read_weight().is_none());
        assert!(manager.wait_for_stable_weight(Duration::from_millis(50)).is_none());
        assert!(!manager.tare());
        assert!(!manager.zero());
        assert_eq!(manager.status(), ScaleStatusReport::disabled());

        // never opened anything
        assert!(mock.state().opened_with.is_none());
    }

    #[test]
    fn test_disabled_ignores_unknown_brand() {
        let manager = EquipmentManager::new(&settings(json!({
            "enabled": false,
            "default_brand": "urano"
        })))
        .unwrap();
        assert!(!manager.is_enabled());
    }

    #[test]
    fn test_unknown_brand_fails_fast() {
        let result =
            EquipmentManager::with_transport(&enabled("urano"), Box::new(MockTransport::new()));
        assert!(matches!(result, Err(EquipmentError::UnsupportedBrand(b)) if b == "urano"));
    }

    #[test]
    fn test_delegates_to_driver() {
        let mock = MockTransport::replying([
            Reply::Line("ST,GS,+00000.000kg"),
            Reply::Line("ST,GS,+00002.150kg"),
        ]);
        let mut manager =
            EquipmentManager::with_transport(&enabled("TOLEDO"), Box::new(mock.clone())).unwrap();
        assert_eq!(manager.brand(), Some(ScaleBrand::Toledo));

        assert!(manager.connect());
        let reading = manager.read_weight().unwrap();
        assert_eq!(reading.weight, Decimal::from_str("2.150").unwrap());

        let report = manager.status();
        assert!(report.enabled);
        assert!(report.connected);
        assert_eq!(report.status, "connected");
        assert_eq!(report.last_weight, Some(Decimal::from_str("2.150").unwrap()));
        assert!(report.weight_stable);
        assert_eq!(report.brand.as_deref(), Some("Toledo"));
        assert!(manager.is_weight_stable());

        assert!(manager.disconnect());
        assert!(!manager.is_connected());
        assert_eq!(manager.status().status, "disconnected");
    }

    #[test]
    fn test_failed_connect_reported() {
        let mock = MockTransport::new();
        mock.state().fail_open = true;
        let mut manager =
            EquipmentManager::with_transport(&enabled("filizola"), Box::new(mock)).unwrap();

        assert!(!manager.connect());
        let report = manager.status();
        assert_eq!(report.status, "error");
        assert!(report.last_error.is_some());
        assert_eq!(report.last_weight, None);
    }

    #[test]
    fn test_format_weight() {
        assert_eq!(format_weight(Some(Decimal::from_str("12.345").unwrap())), "12.345 kg");
        assert_eq!(format_weight(Some(Decimal::from_str("0.5").unwrap())), "0.500 kg");
        assert_eq!(format_weight(None), "--- kg");
    }
}
