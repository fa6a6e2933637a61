//! # pdv-equipment
//!
//! Serial scale integration for the PDV client.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  UI / sale flow                                                      │
//! │        │ read_weight, tare, status                                   │
//! │        ▼                                                             │
//! │  SharedEquipment ── Arc<Mutex<..>> + spawn_blocking                  │
//! │        │                                                             │
//! │        ▼                                                             │
//! │  EquipmentManager ── enabled? brand? ──► ScaleDriver                 │
//! │                                            │ Toledo | Filizola       │
//! │                                            ▼                         │
//! │                                     SerialScale<P> ──► Transport     │
//! │                                                          │           │
//! │                                                  serial port (8N1)   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`]: `equipment.scale` settings and resolved driver parameters
//! - [`transport`]: serial byte pipe
//! - [`scale`]: the `Scale` trait, vendor grammars, drivers
//! - [`manager`]: configured facade and status report
//! - [`shared`]: async, serialized access

pub mod config;
pub mod error;
pub mod manager;
pub mod scale;
pub mod shared;
pub mod status;
pub mod transport;

pub use config::{DriverConfig, ScaleCommands, ScaleSettings, SerialSettings};
pub use error::{EquipmentError, EquipmentResult, ParseError, TransportError};
pub use manager::{format_weight, EquipmentManager, ScaleStatusReport};
pub use scale::{Scale, ScaleBrand, ScaleDriver, ScaleReading};
pub use shared::SharedEquipment;
pub use status::EquipmentStatus;
pub use transport::{SerialPortTransport, Transport};
