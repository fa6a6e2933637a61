//! # pdv-db: Local Store for the PDV Terminal
//!
//! SQLite cache of products, customers, cashier sessions and sales. The
//! terminal reads and writes here first; the sync pass replicates dirty rows
//! to the remote API later.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PDV Data Flow                                    │
//! │                                                                         │
//! │  sales screen / agent CLI            sync pass (pdv-sync)              │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     pdv-db (THIS CRATE)                         │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │   │   │
//! │  │   │               │    │ Product       │    │              │   │   │
//! │  │   │ SqlitePool    │◄───│ Customer      │    │ 001_initial  │   │   │
//! │  │   │ transactions  │    │ Session, Sale │    │              │   │   │
//! │  │   │ backup/vacuum │    │ Settings,Sync │    │              │   │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  data/pos_local.db  (WAL)                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`query`] - Ad-hoc parameterized SQL and scoped transactions
//! - [`migrations`] - Embedded schema migrations
//! - [`maintenance`] - Backup, vacuum and size report
//! - [`repository`] - One repository per cache table
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pdv_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("data/pos_local.db")).await?;
//! let hits = db.products().search("arroz", 20).await?;
//! let pending = db.sync_state().pending_counts().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod maintenance;
pub mod migrations;
pub mod pool;
pub mod query;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use maintenance::DatabaseInfo;
pub use pool::{Database, DatabaseSettings, DbConfig};
pub use query::{SqlParam, TxFuture};
pub use repository::{PendingCounts, SyncTable, UpsertOutcome};
