//! # Equipment Error Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Where each error ends up                             │
//! │                                                                         │
//! │  TransportError ──┐                                                     │
//! │                   ├──► driver: status + last_error (never returned)    │
//! │  ParseError ──────┘                                                     │
//! │                                                                         │
//! │  UnsupportedBrand ───► EquipmentManager::new  (fatal at startup)       │
//! │  Worker ─────────────► SharedEquipment  (blocking task panicked)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

pub type EquipmentResult<T> = Result<T, EquipmentError>;

/// Serial link failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Cannot open serial port {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("Serial port is not open")]
    NotOpen,

    #[error("Timed out waiting for the scale")]
    Timeout,

    #[error("Serial I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Link-level failures that leave the port unusable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Timeout)
    }
}

/// A scale answered with something that is not a weight.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty response")]
    Empty,

    #[error("No weight unit in response: '{0}'")]
    MissingUnit(String),

    #[error("No numeric weight in response: '{0}'")]
    EmptyNumeric(String),

    #[error("Invalid weight value: '{0}'")]
    InvalidNumber(String),
}

#[derive(Debug, Error)]
pub enum EquipmentError {
    #[error("Unsupported scale brand: '{0}'")]
    UnsupportedBrand(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Invalid scale response: {0}")]
    Parse(#[from] ParseError),

    #[error("Equipment worker failed: {0}")]
    Worker(String),
}

impl EquipmentError {
    /// True when the link itself is broken, as opposed to a bad or late answer.
    pub fn is_link_failure(&self) -> bool {
        match self {
            EquipmentError::Transport(e) => e.is_fatal(),
            _ => false,
        }
    }
}
