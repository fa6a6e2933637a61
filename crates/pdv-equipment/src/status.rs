//! Driver lifecycle state.
//!
//! ```text
//!                  connect()
//!  Disconnected ─────────────► Connecting ──probe ok──► Connected ◄─┐
//!       ▲                          │                       │        │
//!       │ disconnect()             │ probe / open failed   │ read   │ done
//!       │                          ▼                       ▼        │
//!       └──────────────────────  Error  ◄── link lost ──  Busy ─────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
    /// A command is in flight. Never observable once the call returns.
    Busy,
}

impl EquipmentStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EquipmentStatus::Disconnected => "disconnected",
            EquipmentStatus::Connecting => "connecting",
            EquipmentStatus::Connected => "connected",
            EquipmentStatus::Error => "error",
            EquipmentStatus::Busy => "busy",
        }
    }
}

impl fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
