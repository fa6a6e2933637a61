//! # Sync State Repository
//!
//! Flips the replication flags every cache table carries. The push side of
//! the sync pass reads dirty rows through the typed repositories and reports
//! back through here.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Dirty → Synced, guarded by sync_version                 │
//! │                                                                         │
//! │  local write        UPDATE ... synced = 0, sync_version = v + 1         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  sync pass reads row at version v+1, pushes it                          │
//! │       │                                                                 │
//! │       ├── push ok ──► UPDATE ... synced = 1                             │
//! │       │               WHERE id = ? AND sync_version = v+1               │
//! │       │                  │                                              │
//! │       │                  ├── 1 row: acknowledged                        │
//! │       │                  └── 0 rows: edited meanwhile, stays dirty      │
//! │       │                                                                 │
//! │       └── push failed ──► UPDATE ... sync_error = ?  (still dirty)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use pdv_core::LocalId;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::fmt;
use tracing::{debug, warn};

use crate::error::DbResult;
use crate::query::run_in_transaction;

/// Cache tables that replicate to the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTable {
    Products,
    Customers,
    CashierSessions,
    Sales,
}

impl SyncTable {
    pub const ALL: [SyncTable; 4] = [
        SyncTable::Products,
        SyncTable::Customers,
        SyncTable::CashierSessions,
        SyncTable::Sales,
    ];

    pub const fn table_name(&self) -> &'static str {
        match self {
            SyncTable::Products => "products",
            SyncTable::Customers => "customers",
            SyncTable::CashierSessions => "cashier_sessions",
            SyncTable::Sales => "sales",
        }
    }
}

impl fmt::Display for SyncTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Dirty row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingCounts {
    pub products: i64,
    pub customers: i64,
    pub cashier_sessions: i64,
    pub sales: i64,
}

impl PendingCounts {
    pub fn total(&self) -> i64 {
        self.products + self.customers + self.cashier_sessions + self.sales
    }
}

#[derive(Debug, Clone)]
pub struct SyncStateRepository {
    pool: SqlitePool,
}

impl SyncStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncStateRepository { pool }
    }

    /// Acknowledges a push of `id` at `version`.
    ///
    /// Returns `false` when the row changed after it was read for the push;
    /// it then stays dirty and goes out again on the next pass.
    pub async fn mark_synced(
        &self,
        table: SyncTable,
        id: LocalId,
        version: i64,
        remote_id: Option<i64>,
    ) -> DbResult<bool> {
        run_in_transaction(&self.pool, move |conn| {
            Box::pin(async move { mark_synced_in(conn, table, id, version, remote_id).await })
        })
        .await
    }

    /// Records a failed push. The row stays dirty.
    pub async fn mark_failed(&self, table: SyncTable, id: LocalId, error: &str) -> DbResult<()> {
        let error = error.to_string();
        run_in_transaction(&self.pool, move |conn| {
            Box::pin(async move { mark_failed_in(conn, table, id, &error).await })
        })
        .await
    }

    pub async fn count_pending(&self, table: SyncTable) -> DbResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE synced = 0",
            table.table_name()
        );
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    pub async fn pending_counts(&self) -> DbResult<PendingCounts> {
        Ok(PendingCounts {
            products: self.count_pending(SyncTable::Products).await?,
            customers: self.count_pending(SyncTable::Customers).await?,
            cashier_sessions: self.count_pending(SyncTable::CashierSessions).await?,
            sales: self.count_pending(SyncTable::Sales).await?,
        })
    }

    /// Remote id of a row, if it has been pushed or pulled before.
    pub async fn remote_id(&self, table: SyncTable, id: LocalId) -> DbResult<Option<i64>> {
        let sql = format!("SELECT remote_id FROM {} WHERE id = ?1", table.table_name());
        let remote: Option<Option<i64>> = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(remote.flatten())
    }
}

async fn mark_synced_in(
    conn: &mut SqliteConnection,
    table: SyncTable,
    id: LocalId,
    version: i64,
    remote_id: Option<i64>,
) -> DbResult<bool> {
    let now = Utc::now();
    let sql = format!(
        "UPDATE {} SET
            synced = 1,
            sync_error = NULL,
            synced_at = ?1,
            remote_id = COALESCE(?2, remote_id)
         WHERE id = ?3 AND sync_version = ?4",
        table.table_name()
    );
    let result = sqlx::query(&sql)
        .bind(now)
        .bind(remote_id)
        .bind(id)
        .bind(version)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        warn!(table = %table, id, version, "Row changed during push, left dirty");
        return Ok(false);
    }

    if table == SyncTable::Sales {
        sqlx::query("UPDATE sale_items SET synced = 1, sync_error = NULL WHERE sale_id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }

    debug!(table = %table, id, version, "Marked synced");
    Ok(true)
}

async fn mark_failed_in(
    conn: &mut SqliteConnection,
    table: SyncTable,
    id: LocalId,
    error: &str,
) -> DbResult<()> {
    let sql = format!(
        "UPDATE {} SET sync_error = ?1 WHERE id = ?2",
        table.table_name()
    );
    sqlx::query(&sql)
        .bind(error)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if table == SyncTable::Sales {
        sqlx::query("UPDATE sale_items SET sync_error = ?1 WHERE sale_id = ?2")
            .bind(error)
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }

    debug!(table = %table, id, error, "Recorded sync failure");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use pdv_core::{Money, NewSale, NewSaleItem, ProductData};

    async fn db_with_product() -> (Database, LocalId, i64) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .insert(ProductData {
                name: "Arroz 5kg".into(),
                sku: Some("ARZ5".into()),
                price: Money::from_cents(2599),
                is_active: true,
                ..Default::default()
            })
            .await
            .unwrap();
        (db, product.id, product.sync.sync_version)
    }

    #[tokio::test]
    async fn test_mark_synced_with_current_version() {
        let (db, id, version) = db_with_product().await;
        assert_eq!(db.sync_state().count_pending(SyncTable::Products).await.unwrap(), 1);

        let acked = db
            .sync_state()
            .mark_synced(SyncTable::Products, id, version, Some(501))
            .await
            .unwrap();
        assert!(acked);

        let product = db.products().get(id).await.unwrap().unwrap();
        assert!(product.sync.synced);
        assert_eq!(product.sync.remote_id, Some(501));
        assert!(product.sync.synced_at.is_some());
        assert_eq!(db.sync_state().pending_counts().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_stale_ack_leaves_row_dirty() {
        let (db, id, version) = db_with_product().await;

        let mut data = db.products().get(id).await.unwrap().unwrap().data;
        data.price = Money::from_cents(2799);
        db.products().update(id, data).await.unwrap();

        let acked = db
            .sync_state()
            .mark_synced(SyncTable::Products, id, version, Some(501))
            .await
            .unwrap();
        assert!(!acked);

        let product = db.products().get(id).await.unwrap().unwrap();
        assert!(!product.sync.synced);
        assert_eq!(product.sync.remote_id, None);
    }

    #[tokio::test]
    async fn test_mark_failed_keeps_dirty() {
        let (db, id, _) = db_with_product().await;
        db.sync_state()
            .mark_failed(SyncTable::Products, id, "Server error (503)")
            .await
            .unwrap();

        let product = db.products().get(id).await.unwrap().unwrap();
        assert!(!product.sync.synced);
        assert_eq!(product.sync.sync_error.as_deref(), Some("Server error (503)"));
        assert_eq!(db.sync_state().remote_id(SyncTable::Products, id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mark_failed_sale_tags_its_items() {
        let (db, product_id, _) = db_with_product().await;
        let product = db.products().get(product_id).await.unwrap().unwrap();
        let sale = db
            .sales()
            .create(NewSale {
                sale_number: "S-9".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        db.sales()
            .add_item(sale.id, NewSaleItem::for_product(&product, 1))
            .await
            .unwrap();

        db.sync_state()
            .mark_failed(SyncTable::Sales, sale.id, "Validation error: customer")
            .await
            .unwrap();

        let stored = db.sales().get(sale.id).await.unwrap().unwrap();
        assert_eq!(stored.sync.sync_error.as_deref(), Some("Validation error: customer"));
        assert!(stored
            .items
            .iter()
            .all(|item| item.sync_error.as_deref() == Some("Validation error: customer")));

        // a missing row is not an error and leaves nothing half-written
        db.sync_state()
            .mark_failed(SyncTable::Sales, 9999, "gone")
            .await
            .unwrap();
    }
}
