//! # Scales
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                       trait Scale                                    │
//! │   connect · disconnect · read_weight · tare · zero · wait_for_stable │
//! └───────────────────────────────┬──────────────────────────────────────┘
//!                                 │ implemented by
//!              ┌──────────────────┴──────────────────┐
//!              ▼                                     ▼
//!     SerialScale<P: ScaleProtocol>            ScaleDriver (enum)
//!     one generic state machine,               tagged dispatch over
//!     P supplies the grammar                   the supported brands
//!              │
//!      ┌───────┴────────┐
//!      ▼                ▼
//!  ToledoProtocol   FilizolaProtocol
//! ```
//!
//! Failures never escape a driver: they land in [`Scale::status`] and
//! [`Scale::last_error`], and the call returns `false` / `None`.

mod driver;
mod filizola;
mod toledo;

pub use driver::{ScaleDriver, SerialScale};
pub use filizola::FilizolaProtocol;
pub use toledo::ToledoProtocol;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::config::ScaleCommands;
use crate::error::{EquipmentError, ParseError};
use crate::status::EquipmentStatus;

pub type ToledoScale = SerialScale<ToledoProtocol>;
pub type FilizolaScale = SerialScale<FilizolaProtocol>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleBrand {
    Toledo,
    Filizola,
}

impl ScaleBrand {
    pub const ALL: [ScaleBrand; 2] = [ScaleBrand::Toledo, ScaleBrand::Filizola];

    pub const fn as_str(&self) -> &'static str {
        match self {
            ScaleBrand::Toledo => "toledo",
            ScaleBrand::Filizola => "filizola",
        }
    }

    pub const fn display_name(&self) -> &'static str {
        match self {
            ScaleBrand::Toledo => "Toledo",
            ScaleBrand::Filizola => "Filizola",
        }
    }

    /// Commands used when the config names none.
    pub fn default_commands(&self) -> ScaleCommands {
        let read_weight = match self {
            ScaleBrand::Toledo => "\u{5}",
            ScaleBrand::Filizola => "W",
        };
        ScaleCommands {
            read_weight: read_weight.to_string(),
            tare: "T".to_string(),
            zero: "Z".to_string(),
        }
    }
}

impl FromStr for ScaleBrand {
    type Err = EquipmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        ScaleBrand::ALL
            .into_iter()
            .find(|brand| brand.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| EquipmentError::UnsupportedBrand(name.to_string()))
    }
}

impl fmt::Display for ScaleBrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One weight taken from the scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleReading {
    /// Magnitude in kg, never negative.
    pub weight: Decimal,
    /// The scale reported a value below zero (e.g. after removing a tared container).
    pub negative: bool,
    pub stable: bool,
    pub timestamp: DateTime<Utc>,
}

impl ScaleReading {
    pub fn signed_weight(&self) -> Decimal {
        if self.negative {
            -self.weight
        } else {
            self.weight
        }
    }
}

/// What a protocol grammar extracts from one answer line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedWeight {
    pub weight: Decimal,
    pub negative: bool,
    pub stable: bool,
}

impl ParsedWeight {
    pub(crate) fn into_reading(self, timestamp: DateTime<Utc>) -> ScaleReading {
        ScaleReading {
            weight: self.weight,
            negative: self.negative,
            stable: self.stable,
            timestamp,
        }
    }
}

/// A vendor's answer grammar.
pub trait ScaleProtocol: Send + 'static {
    const BRAND: ScaleBrand;

    fn parse(line: &str) -> Result<ParsedWeight, ParseError>;
}

/// Drops control characters and surrounding whitespace.
pub(crate) fn printable(line: &str) -> String {
    line.chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Builds the magnitude from the digits and dots of `field`.
///
/// An empty numeric part is an error, never zero: a false zero would
/// price a weighed item at nothing.
pub(crate) fn parse_magnitude(field: &str, whole: &str) -> Result<Decimal, ParseError> {
    let numeric: String = field
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if numeric.is_empty() {
        return Err(ParseError::EmptyNumeric(whole.to_string()));
    }
    Decimal::from_str(&numeric).map_err(|_| ParseError::InvalidNumber(numeric))
}

pub trait Scale: Send {
    fn brand(&self) -> ScaleBrand;

    /// Opens the port and probes with one read. `false` on any failure.
    fn connect(&mut self) -> bool;

    /// Always succeeds; safe to call repeatedly.
    fn disconnect(&mut self) -> bool;

    fn is_connected(&self) -> bool;

    fn read_weight(&mut self) -> Option<ScaleReading>;

    /// Sends tare and confirms the scale settled near zero.
    fn tare(&mut self) -> bool;

    /// Sends zero; the device's acknowledgement is trusted.
    fn zero(&mut self) -> bool;

    fn status(&self) -> EquipmentStatus;

    fn last_error(&self) -> Option<&str>;

    fn last_reading(&self) -> Option<&ScaleReading>;

    fn poll_interval(&self) -> Duration;

    /// Polls until a stable reading arrives or `timeout` runs out.
    ///
    /// Blocks the calling thread. Only the timeout ends the wait early, so
    /// interactive callers should run this on a worker
    /// (see [`SharedEquipment`](crate::SharedEquipment)).
    fn wait_for_stable_weight(&mut self, timeout: Duration) -> Option<ScaleReading> {
        let deadline = Instant::now() + timeout;
        let interval = self.poll_interval();

        loop {
            if let Some(reading) = self.read_weight() {
                if reading.stable {
                    return Some(reading);
                }
            } else if !self.is_connected() {
                return None;
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            std::thread::sleep(interval.min(deadline - now));
        }
    }
}
