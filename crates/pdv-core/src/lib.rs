//! # pdv-core: Domain Logic for the PDV Client
//!
//! Pure types and rules shared by every other crate in the workspace.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PDV Client Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/pdv-agent (CLI)                         │   │
//! │  └───────┬───────────────────┬────────────────────┬────────────────┘   │
//! │          │                   │                    │                     │
//! │  ┌───────▼───────┐   ┌───────▼───────┐   ┌────────▼────────┐           │
//! │  │ pdv-equipment │   │    pdv-db     │◄──│    pdv-sync     │           │
//! │  │ serial scales │   │ SQLite cache  │   │ remote push/pull│           │
//! │  └───────┬───────┘   └───────┬───────┘   └────────┬────────┘           │
//! │          │                   │                    │                     │
//! │  ┌───────▼───────────────────▼────────────────────▼────────────────┐   │
//! │  │               ★ pdv-core (THIS CRATE) ★                         │   │
//! │  │   Money • records • Sale totals • CashierSession lifecycle      │   │
//! │  │   NO I/O                                                        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  pdv-config feeds settings to equipment, db, sync and the agent         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use pdv_core::{Money, TaxRate};
//!
//! let price = Money::from_cents(1099);
//! let tax = price.calculate_tax(TaxRate::from_bps(1000));
//! assert_eq!(tax.cents(), 110);
//! ```

pub mod error;
pub mod money;
pub mod sale;
pub mod session;
pub mod types;

pub use error::{CoreError, CoreResult};
pub use money::Money;
pub use sale::{LinePrice, NewSale, NewSaleItem, Sale, SaleItem, MAX_DISCOUNT_BPS};
pub use session::{CashierSession, NewCashierSession, SessionTotals};
pub use types::*;

/// Re-exported so callers share one decimal type for weights and amounts.
pub use rust_decimal::Decimal;
