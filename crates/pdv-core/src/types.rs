//! # Domain Types
//!
//! Cached records and the enums shared by the store, the sync pass and the
//! agent.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Cache Records                                     │
//! │                                                                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐                   │
//! │  │   Product    │  │   Customer   │  │ CashierSession│ (session.rs)     │
//! │  │  sku?        │  │  document?   │  │ totals/status │                  │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘                   │
//! │         │                 │                 │                           │
//! │         │          ┌──────┴─────────────────┴──┐                        │
//! │         └─────────►│ Sale ──owns──► SaleItem*  │ (sale.rs)              │
//! │                    └───────────────────────────┘                        │
//! │                                                                         │
//! │  Every record embeds a SyncState:                                      │
//! │    remote_id | synced | sync_error | sync_version | synced_at          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Records are keyed by a local integer id assigned by the store. The id the
//! remote API knows them by lives in `SyncState::remote_id` and stays `None`
//! until the first successful push (or arrives with a pull).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::money::Money;

/// Local row identity assigned by the store.
pub type LocalId = i64;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate in basis points (1800 bps = 18%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How a sale was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    CreditCard,
    DebitCard,
    Pix,
    Check,
    StoreCredit,
}

impl PaymentMethod {
    /// The cashier-session bucket this method is totalled under.
    pub const fn category(&self) -> PaymentCategory {
        match self {
            PaymentMethod::Cash => PaymentCategory::Cash,
            PaymentMethod::CreditCard | PaymentMethod::DebitCard => PaymentCategory::Card,
            PaymentMethod::Pix => PaymentCategory::Pix,
            PaymentMethod::Check | PaymentMethod::StoreCredit => PaymentCategory::Other,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::Pix => "pix",
            PaymentMethod::Check => "check",
            PaymentMethod::StoreCredit => "store_credit",
        }
    }
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::Cash
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "debit_card" => Ok(PaymentMethod::DebitCard),
            "pix" => Ok(PaymentMethod::Pix),
            "check" => Ok(PaymentMethod::Check),
            "store_credit" => Ok(PaymentMethod::StoreCredit),
            other => Err(CoreError::UnknownPaymentMethod(other.to_string())),
        }
    }
}

/// Session total buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentCategory {
    Cash,
    Card,
    Pix,
    Other,
}

impl fmt::Display for PaymentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentCategory::Cash => "cash",
            PaymentCategory::Card => "card",
            PaymentCategory::Pix => "pix",
            PaymentCategory::Other => "other",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Statuses
// =============================================================================

/// Sale lifecycle.
///
/// ```text
/// Pending ──complete──► Completed ──cancel──► Cancelled
///    │                      │
///    └──────cancel──────────┴──refund──► Refunded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Pending,
    Completed,
    Cancelled,
    Refunded,
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Pending
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SaleStatus::Pending => "pending",
            SaleStatus::Completed => "completed",
            SaleStatus::Cancelled => "cancelled",
            SaleStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

/// Cashier session lifecycle. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Suspended,
    Closed,
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Open
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Open => "open",
            SessionStatus::Suspended => "suspended",
            SessionStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Sync State
// =============================================================================

/// Replication bookkeeping carried by every cache record.
///
/// A record is dirty iff `synced` is false. `sync_version` increases on every
/// local write; a push is only acknowledged when the version it carried is
/// still current.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub remote_id: Option<i64>,
    pub synced: bool,
    pub sync_error: Option<String>,
    pub sync_version: i64,
    pub synced_at: Option<DateTime<Utc>>,
}

impl SyncState {
    #[inline]
    pub fn is_dirty(&self) -> bool {
        !self.synced
    }
}

// =============================================================================
// Product
// =============================================================================

/// Writable product fields, used for local edits and remote upserts alike.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductData {
    pub name: String,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub price: Money,
    pub cost: Option<Money>,
    pub stock_quantity: i64,
    pub category_name: Option<String>,
    pub brand: Option<String>,
    /// Priced per kilogram from a scale reading.
    pub requires_weighing: bool,
    pub is_active: bool,
    pub tax_rate: TaxRate,
}

impl ProductData {
    /// Blank optional text becomes `None` so unique keys stay nullable.
    pub fn normalized(mut self) -> Self {
        self.sku = blank_to_none(self.sku);
        self.barcode = blank_to_none(self.barcode);
        self.description = blank_to_none(self.description);
        self.category_name = blank_to_none(self.category_name);
        self.brand = blank_to_none(self.brand);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: LocalId,
    #[serde(flatten)]
    pub data: ProductData,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sync: SyncState,
}

// =============================================================================
// Customer
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerData {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// CPF/CNPJ. Unique when present.
    pub document: Option<String>,
    pub document_type: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub is_active: bool,
    pub notes: Option<String>,
}

impl CustomerData {
    pub fn normalized(mut self) -> Self {
        self.document = blank_to_none(self.document);
        self.email = blank_to_none(self.email);
        self.phone = blank_to_none(self.phone);
        self.document_type = blank_to_none(self.document_type);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: LocalId,
    #[serde(flatten)]
    pub data: CustomerData,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sync: SyncState,
}

// =============================================================================
// Document Numbers
// =============================================================================

/// Human-facing sale number: `YYYYMMDD-<terminal>-<8 hex>`.
pub fn generate_sale_number(terminal_id: &str, now: DateTime<Utc>) -> String {
    document_number(terminal_id, now)
}

/// Human-facing cashier session number, same shape as sale numbers.
pub fn generate_session_number(terminal_id: &str, now: DateTime<Utc>) -> String {
    format!("CX-{}", document_number(terminal_id, now))
}

fn document_number(terminal_id: &str, now: DateTime<Utc>) -> String {
    let short = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        now.format("%Y%m%d"),
        terminal_id,
        &short[..8].to_ascii_uppercase()
    )
}

pub(crate) fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
