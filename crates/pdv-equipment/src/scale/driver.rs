use chrono::Utc;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    FilizolaProtocol, ParsedWeight, Scale, ScaleBrand, ScaleProtocol, ScaleReading,
    ToledoProtocol,
};
use crate::config::DriverConfig;
use crate::error::{EquipmentError, EquipmentResult};
use crate::status::EquipmentStatus;
use crate::transport::{SerialPortTransport, Transport};

// =============================================================================
// SerialScale
// =============================================================================

/// Serial scale state machine, generic over the vendor grammar.
///
/// Owns its transport. `status` only changes inside these methods and
/// `Busy` never outlives a call.
pub struct SerialScale<P: ScaleProtocol> {
    config: DriverConfig,
    transport: Box<dyn Transport>,
    status: EquipmentStatus,
    last_error: Option<String>,
    last_reading: Option<ScaleReading>,
    _protocol: PhantomData<fn() -> P>,
}

impl<P: ScaleProtocol> SerialScale<P> {
    pub fn new(config: DriverConfig, transport: Box<dyn Transport>) -> Self {
        SerialScale {
            config,
            transport,
            status: EquipmentStatus::Disconnected,
            last_error: None,
            last_reading: None,
            _protocol: PhantomData,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// One request/answer exchange: flush, send, read, parse.
    fn exchange(&mut self, command: &str) -> EquipmentResult<ParsedWeight> {
        self.transport.clear_input()?;
        self.transport.send(command.as_bytes())?;
        let raw = self.transport.read_line()?;
        let line = String::from_utf8_lossy(&raw);
        debug!(brand = %P::BRAND, response = %line.trim(), "Scale response");
        Ok(P::parse(&line)?)
    }

    /// Records a failed operation. A broken link drops the port; a late or
    /// garbled answer leaves it usable.
    fn record_failure(&mut self, operation: &str, error: &EquipmentError) {
        if error.is_link_failure() {
            self.transport.close();
            self.status = EquipmentStatus::Error;
        } else {
            self.status = EquipmentStatus::Connected;
        }
        warn!(
            brand = %P::BRAND,
            operation,
            error = %error,
            status = %self.status,
            "Scale operation failed"
        );
        self.last_error = Some(error.to_string());
    }

    /// Writes a bare command (tare, zero) without expecting an answer.
    fn send_command(&mut self, operation: &str, command: &str) -> bool {
        if !self.is_connected() {
            self.last_error = Some("Scale not connected".to_string());
            return false;
        }

        self.status = EquipmentStatus::Busy;
        match self.transport.send(command.as_bytes()) {
            Ok(()) => {
                self.status = EquipmentStatus::Connected;
                std::thread::sleep(self.config.settle_delay);
                true
            }
            Err(e) => {
                self.record_failure(operation, &EquipmentError::from(e));
                false
            }
        }
    }
}

impl<P: ScaleProtocol> Scale for SerialScale<P> {
    fn brand(&self) -> ScaleBrand {
        P::BRAND
    }

    fn connect(&mut self) -> bool {
        self.status = EquipmentStatus::Connecting;

        if let Err(e) = self.transport.open(&self.config.serial) {
            warn!(
                brand = %P::BRAND,
                port = %self.config.serial.port,
                error = %e,
                "Scale connection failed"
            );
            self.status = EquipmentStatus::Error;
            self.last_error = Some(e.to_string());
            return false;
        }

        let probe = self.config.commands.read_weight.clone();
        match self.exchange(&probe) {
            Ok(parsed) => {
                self.last_reading = Some(parsed.into_reading(Utc::now()));
                self.status = EquipmentStatus::Connected;
                self.last_error = None;
                info!(brand = %P::BRAND, port = %self.config.serial.port, "Scale connected");
                true
            }
            Err(e) => {
                self.transport.close();
                self.status = EquipmentStatus::Error;
                warn!(
                    brand = %P::BRAND,
                    port = %self.config.serial.port,
                    error = %e,
                    "Scale did not answer probe"
                );
                self.last_error = Some(format!("Communication test failed: {e}"));
                false
            }
        }
    }

    fn disconnect(&mut self) -> bool {
        self.transport.close();
        if self.status != EquipmentStatus::Disconnected {
            info!(brand = %P::BRAND, "Scale disconnected");
        }
        self.status = EquipmentStatus::Disconnected;
        true
    }

    fn is_connected(&self) -> bool {
        self.transport.is_open() && self.status == EquipmentStatus::Connected
    }

    fn read_weight(&mut self) -> Option<ScaleReading> {
        if !self.is_connected() {
            self.last_error = Some("Scale not connected".to_string());
            return None;
        }

        self.status = EquipmentStatus::Busy;
        let command = self.config.commands.read_weight.clone();
        match self.exchange(&command) {
            Ok(parsed) => {
                let reading = parsed.into_reading(Utc::now());
                self.status = EquipmentStatus::Connected;
                self.last_error = None;
                self.last_reading = Some(reading.clone());
                Some(reading)
            }
            Err(e) => {
                self.record_failure("read_weight", &e);
                None
            }
        }
    }

    fn tare(&mut self) -> bool {
        let command = self.config.commands.tare.clone();
        if !self.send_command("tare", &command) {
            return false;
        }

        let Some(reading) = self.read_weight() else {
            return false;
        };
        if reading.weight <= self.config.tare_tolerance {
            info!(brand = %P::BRAND, "Tare applied");
            true
        } else {
            let message = format!(
                "Tare not confirmed: scale reads {} kg",
                reading.signed_weight()
            );
            warn!(brand = %P::BRAND, weight = %reading.signed_weight(), "Tare not confirmed");
            self.last_error = Some(message);
            false
        }
    }

    fn zero(&mut self) -> bool {
        let command = self.config.commands.zero.clone();
        let done = self.send_command("zero", &command);
        if done {
            info!(brand = %P::BRAND, "Scale zeroed");
        }
        done
    }

    fn status(&self) -> EquipmentStatus {
        self.status
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn last_reading(&self) -> Option<&ScaleReading> {
        self.last_reading.as_ref()
    }

    fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }
}

// =============================================================================
// ScaleDriver
// =============================================================================

/// Brand-tagged driver built from configuration.
pub enum ScaleDriver {
    Toledo(SerialScale<ToledoProtocol>),
    Filizola(SerialScale<FilizolaProtocol>),
}

macro_rules! dispatch {
    ($self:expr, $scale:ident => $body:expr) => {
        match $self {
            ScaleDriver::Toledo($scale) => $body,
            ScaleDriver::Filizola($scale) => $body,
        }
    };
}

impl ScaleDriver {
    pub fn new(brand: ScaleBrand, config: DriverConfig, transport: Box<dyn Transport>) -> Self {
        match brand {
            ScaleBrand::Toledo => ScaleDriver::Toledo(SerialScale::new(config, transport)),
            ScaleBrand::Filizola => ScaleDriver::Filizola(SerialScale::new(config, transport)),
        }
    }

    /// Driver on a real serial port.
    pub fn serial(brand: ScaleBrand, config: DriverConfig) -> Self {
        Self::new(brand, config, Box::new(SerialPortTransport::new()))
    }

    pub fn config(&self) -> &DriverConfig {
        dispatch!(self, scale => scale.config())
    }
}

impl Scale for ScaleDriver {
    fn brand(&self) -> ScaleBrand {
        dispatch!(self, scale => scale.brand())
    }

    fn connect(&mut self) -> bool {
        dispatch!(self, scale => scale.connect())
    }

    fn disconnect(&mut self) -> bool {
        dispatch!(self, scale => scale.disconnect())
    }

    fn is_connected(&self) -> bool {
        dispatch!(self, scale => scale.is_connected())
    }

    fn read_weight(&mut self) -> Option<ScaleReading> {
        dispatch!(self, scale => scale.read_weight())
    }

    fn tare(&mut self) -> bool {
        dispatch!(self, scale => scale.tare())
    }

    fn zero(&mut self) -> bool {
        dispatch!(self, scale => scale.zero())
    }

    fn status(&self) -> EquipmentStatus {
        dispatch!(self, scale => scale.status())
    }

    fn last_error(&self) -> Option<&str> {
        dispatch!(self, scale => scale.last_error())
    }

    fn last_reading(&self) -> Option<&ScaleReading> {
        dispatch!(self, scale => scale.last_reading())
    }

    fn poll_interval(&self) -> Duration {
        dispatch!(self, scale => scale.poll_interval())
    }

    fn wait_for_stable_weight(&mut self, timeout: Duration) -> Option<ScaleReading> {
        dispatch!(self, scale => scale.wait_for_stable_weight(timeout))
    }
}
