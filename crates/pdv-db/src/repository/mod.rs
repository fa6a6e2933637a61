//! Typed access to each cache table. Obtain repositories from
//! [`Database`](crate::Database) rather than constructing them directly.

pub mod customer;
pub mod product;
pub mod sale;
pub mod session;
pub mod settings;
pub mod sync;

pub use customer::CustomerRepository;
pub use product::{ProductRepository, UpsertOutcome};
pub use sale::SaleRepository;
pub use session::SessionRepository;
pub use settings::SettingsRepository;
pub use sync::{PendingCounts, SyncStateRepository, SyncTable};
