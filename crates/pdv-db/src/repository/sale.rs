//! # Sale Repository
//!
//! Every mutation is one transaction: load the sale with its items, apply
//! the change through [`Sale`], write the header back and mark it dirty.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   complete(sale_id)  (single transaction)               │
//! │                                                                         │
//! │  load sale + items                                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Sale::complete ── err ──► ROLLBACK (sale still pending)               │
//! │       │ ok                                                              │
//! │       ▼                                                                 │
//! │  UPDATE sales (status, totals, synced = 0, version + 1)                 │
//! │  UPDATE sale_items (synced = 0)                                         │
//! │       │                                                                 │
//! │       ▼  cashier_session_id set?                                        │
//! │  CashierSession::add_sale ── err ──► ROLLBACK                          │
//! │       │ ok                                                              │
//! │       ▼                                                                 │
//! │  UPDATE cashier_sessions (category totals, count)  ──► COMMIT          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `sales` table CHECKs `total = subtotal - discount + tax`, so a header
//! written with stale totals is rejected by SQLite as well.

use chrono::{DateTime, Utc};
use pdv_core::{
    Decimal, LocalId, Money, NewSale, NewSaleItem, PaymentMethod, Sale, SaleItem, SaleStatus,
    SyncState, TaxRate,
};
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use super::session::{fetch_session_in, save_session_in};
use crate::error::{DbError, DbResult};
use crate::query::{run_in_transaction, TxFuture};

const SALE_COLUMNS: &str = "id, remote_id, sale_number, customer_id, customer_name, \
     customer_document, cashier_session_id, user_id, user_name, subtotal_cents, \
     discount_cents, discount_bps, tax_cents, total_cents, payment_method, \
     amount_paid_cents, change_cents, status, notes, created_at, updated_at, \
     completed_at, synced, sync_error, sync_version, synced_at";

const ITEM_COLUMNS: &str = "id, sale_id, product_id, product_name, product_sku, quantity, \
     weight, unit_price_cents, total_price_cents, discount_cents, tax_rate_bps, tax_cents, \
     created_at, synced, sync_error";

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: i64,
    remote_id: Option<i64>,
    sale_number: String,
    customer_id: Option<i64>,
    customer_name: Option<String>,
    customer_document: Option<String>,
    cashier_session_id: Option<i64>,
    user_id: Option<i64>,
    user_name: Option<String>,
    subtotal_cents: i64,
    discount_cents: i64,
    discount_bps: u32,
    tax_cents: i64,
    total_cents: i64,
    payment_method: PaymentMethod,
    amount_paid_cents: i64,
    change_cents: i64,
    status: SaleStatus,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    synced: bool,
    sync_error: Option<String>,
    sync_version: i64,
    synced_at: Option<DateTime<Utc>>,
}

impl SaleRow {
    fn into_sale(self, items: Vec<SaleItem>) -> Sale {
        Sale {
            id: self.id,
            sale_number: self.sale_number,
            customer_id: self.customer_id,
            customer_name: self.customer_name,
            customer_document: self.customer_document,
            cashier_session_id: self.cashier_session_id,
            user_id: self.user_id,
            user_name: self.user_name,
            items,
            subtotal: Money::from_cents(self.subtotal_cents),
            discount_amount: Money::from_cents(self.discount_cents),
            discount_bps: self.discount_bps,
            tax_amount: Money::from_cents(self.tax_cents),
            total_amount: Money::from_cents(self.total_cents),
            payment_method: self.payment_method,
            amount_paid: Money::from_cents(self.amount_paid_cents),
            change_amount: Money::from_cents(self.change_cents),
            status: self.status,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
            sync: SyncState {
                remote_id: self.remote_id,
                synced: self.synced,
                sync_error: self.sync_error,
                sync_version: self.sync_version,
                synced_at: self.synced_at,
            },
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SaleItemRow {
    id: i64,
    sale_id: i64,
    product_id: i64,
    product_name: String,
    product_sku: Option<String>,
    quantity: i64,
    weight: Option<String>,
    unit_price_cents: i64,
    total_price_cents: i64,
    discount_cents: i64,
    tax_rate_bps: u32,
    tax_cents: i64,
    created_at: DateTime<Utc>,
    synced: bool,
    sync_error: Option<String>,
}

impl TryFrom<SaleItemRow> for SaleItem {
    type Error = DbError;

    fn try_from(row: SaleItemRow) -> DbResult<Self> {
        let weight = row
            .weight
            .as_deref()
            .map(Decimal::from_str)
            .transpose()
            .map_err(|e| DbError::decode("sale_items.weight", e))?;

        Ok(SaleItem {
            id: row.id,
            sale_id: row.sale_id,
            product_id: row.product_id,
            product_name: row.product_name,
            product_sku: row.product_sku,
            quantity: row.quantity,
            weight,
            unit_price: Money::from_cents(row.unit_price_cents),
            total_price: Money::from_cents(row.total_price_cents),
            discount: Money::from_cents(row.discount_cents),
            tax_rate: TaxRate::from_bps(row.tax_rate_bps),
            tax: Money::from_cents(row.tax_cents),
            created_at: row.created_at,
            synced: row.synced,
            sync_error: row.sync_error,
        })
    }
}

// =============================================================================
// Connection-level helpers
// =============================================================================

async fn fetch_items_in(conn: &mut SqliteConnection, sale_id: LocalId) -> DbResult<Vec<SaleItem>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM sale_items WHERE sale_id = ?1 ORDER BY id");
    let rows: Vec<SaleItemRow> = sqlx::query_as(&sql)
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;
    rows.into_iter().map(SaleItem::try_from).collect()
}

async fn fetch_sale_in(conn: &mut SqliteConnection, id: LocalId) -> DbResult<Sale> {
    let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");
    let row: Option<SaleRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    let row = row.ok_or_else(|| DbError::not_found("Sale", id))?;
    let items = fetch_items_in(conn, id).await?;
    Ok(row.into_sale(items))
}

/// Writes the header of `sale` and marks it and its items dirty.
async fn save_sale_in(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE sales SET
            customer_id = ?2,
            customer_name = ?3,
            customer_document = ?4,
            subtotal_cents = ?5,
            discount_cents = ?6,
            discount_bps = ?7,
            tax_cents = ?8,
            total_cents = ?9,
            payment_method = ?10,
            amount_paid_cents = ?11,
            change_cents = ?12,
            status = ?13,
            notes = ?14,
            completed_at = ?15,
            updated_at = ?16,
            synced = 0,
            sync_version = sync_version + 1
        WHERE id = ?1
        "#,
    )
    .bind(sale.id)
    .bind(sale.customer_id)
    .bind(&sale.customer_name)
    .bind(&sale.customer_document)
    .bind(sale.subtotal.cents())
    .bind(sale.discount_amount.cents())
    .bind(sale.discount_bps)
    .bind(sale.tax_amount.cents())
    .bind(sale.total_amount.cents())
    .bind(sale.payment_method)
    .bind(sale.amount_paid.cents())
    .bind(sale.change_amount.cents())
    .bind(sale.status)
    .bind(&sale.notes)
    .bind(sale.completed_at)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    sqlx::query("UPDATE sale_items SET synced = 0 WHERE sale_id = ?1")
        .bind(sale.id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn insert_item_in(conn: &mut SqliteConnection, item: &SaleItem) -> DbResult<LocalId> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sale_items (
            sale_id, product_id, product_name, product_sku, quantity, weight,
            unit_price_cents, total_price_cents, discount_cents, tax_rate_bps,
            tax_cents, created_at, synced
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0)
        RETURNING id
        "#,
    )
    .bind(item.sale_id)
    .bind(item.product_id)
    .bind(&item.product_name)
    .bind(&item.product_sku)
    .bind(item.quantity)
    .bind(item.weight.map(|w| w.to_string()))
    .bind(item.unit_price.cents())
    .bind(item.total_price.cents())
    .bind(item.discount.cents())
    .bind(item.tax_rate.bps())
    .bind(item.tax.cents())
    .bind(item.created_at)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Starts an empty pending sale.
    pub async fn create(&self, header: NewSale) -> DbResult<Sale> {
        run_in_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let now = Utc::now();
                let draft = Sale::new(0, header, now);
                let id: i64 = sqlx::query_scalar(
                    r#"
                    INSERT INTO sales (
                        sale_number, customer_id, customer_name, customer_document,
                        cashier_session_id, user_id, user_name, payment_method,
                        status, notes, created_at, updated_at, synced, sync_version
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, 0, 1)
                    RETURNING id
                    "#,
                )
                .bind(&draft.sale_number)
                .bind(draft.customer_id)
                .bind(&draft.customer_name)
                .bind(&draft.customer_document)
                .bind(draft.cashier_session_id)
                .bind(draft.user_id)
                .bind(&draft.user_name)
                .bind(draft.payment_method)
                .bind(draft.status)
                .bind(&draft.notes)
                .bind(now)
                .fetch_one(&mut *conn)
                .await?;

                debug!(id, number = %draft.sale_number, "Sale created");
                fetch_sale_in(conn, id).await
            })
        })
        .await
    }

    pub async fn get(&self, id: LocalId) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        match fetch_sale_in(&mut conn, id).await {
            Ok(sale) => Ok(Some(sale)),
            Err(DbError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn get_by_number(&self, sale_number: &str) -> DbResult<Option<Sale>> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM sales WHERE sale_number = ?1")
            .bind(sale_number)
            .fetch_optional(&self.pool)
            .await?;
        match id {
            Some(id) => self.get(id).await,
            None => Ok(None),
        }
    }

    /// Prices and appends a line to a pending sale.
    pub async fn add_item(&self, sale_id: LocalId, item: NewSaleItem) -> DbResult<Sale> {
        self.mutate(sale_id, move |conn, sale| {
            Box::pin(async move {
                let line = SaleItem::from_new(0, sale_id, item, Utc::now())?;
                let id = insert_item_in(conn, &line).await?;
                sale.add_item(SaleItem { id, ..line })?;
                Ok(())
            })
        })
        .await
    }

    pub async fn remove_item(&self, sale_id: LocalId, item_id: LocalId) -> DbResult<Sale> {
        self.mutate(sale_id, move |conn, sale| {
            Box::pin(async move {
                sale.remove_item(item_id)?;
                sqlx::query("DELETE FROM sale_items WHERE id = ?1 AND sale_id = ?2")
                    .bind(item_id)
                    .bind(sale_id)
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .await
    }

    /// Sets the sale-level discount in basis points.
    pub async fn apply_discount(&self, sale_id: LocalId, bps: u32) -> DbResult<Sale> {
        self.mutate(sale_id, move |_, sale| {
            Box::pin(async move { sale.apply_discount(bps).map_err(DbError::from) })
        })
        .await
    }

    pub async fn set_payment(
        &self,
        sale_id: LocalId,
        method: PaymentMethod,
        amount_paid: Money,
    ) -> DbResult<Sale> {
        self.mutate(sale_id, move |_, sale| {
            Box::pin(async move {
                sale.set_payment(method, amount_paid)
                    .map_err(DbError::from)
            })
        })
        .await
    }

    /// Finalizes a sale and books it on its cashier session.
    pub async fn complete(&self, sale_id: LocalId) -> DbResult<Sale> {
        let sale = self
            .mutate(sale_id, move |conn, sale| {
                Box::pin(async move {
                    sale.complete(Utc::now())?;
                    if let Some(session_id) = sale.cashier_session_id {
                        let mut session = fetch_session_in(&mut *conn, session_id).await?;
                        session.add_sale(sale.total_amount, sale.payment_method)?;
                        save_session_in(conn, &session).await?;
                    }
                    Ok(())
                })
            })
            .await?;
        info!(
            id = sale.id,
            number = %sale.sale_number,
            total = %sale.total_amount,
            "Sale completed"
        );
        Ok(sale)
    }

    /// Cancels a pending or completed sale. A completed sale is also taken
    /// back out of its cashier session totals.
    pub async fn cancel(&self, sale_id: LocalId) -> DbResult<Sale> {
        let sale = self
            .mutate(sale_id, move |conn, sale| {
                Box::pin(async move {
                    let previous = sale.cancel()?;
                    if previous == SaleStatus::Completed {
                        if let Some(session_id) = sale.cashier_session_id {
                            let mut session = fetch_session_in(&mut *conn, session_id).await?;
                            session.cancel_sale(sale.total_amount, sale.payment_method)?;
                            save_session_in(conn, &session).await?;
                        }
                    }
                    Ok(())
                })
            })
            .await?;
        info!(id = sale.id, number = %sale.sale_number, "Sale cancelled");
        Ok(sale)
    }

    /// Deletes a sale and, by cascade, its items.
    pub async fn delete(&self, sale_id: LocalId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM sales WHERE id = ?1")
            .bind(sale_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", sale_id));
        }
        debug!(sale_id, "Sale deleted");
        Ok(())
    }

    /// Finished sales not yet acknowledged by the remote API.
    /// Pending sales are still being rung up and are never pushed.
    pub async fn list_unsynced(&self, limit: u32) -> DbResult<Vec<Sale>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM sales WHERE synced = 0 AND status != 'pending'
             ORDER BY created_at, id LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        self.load_many(ids).await
    }

    pub async fn list_by_session(&self, session_id: LocalId) -> DbResult<Vec<Sale>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM sales WHERE cashier_session_id = ?1 ORDER BY created_at, id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        self.load_many(ids).await
    }

    async fn load_many(&self, ids: Vec<i64>) -> DbResult<Vec<Sale>> {
        let mut conn = self.pool.acquire().await?;
        let mut sales = Vec::with_capacity(ids.len());
        for id in ids {
            sales.push(fetch_sale_in(&mut conn, id).await?);
        }
        Ok(sales)
    }

    /// Load, change, save, reload; all on one transaction.
    async fn mutate<F>(&self, sale_id: LocalId, change: F) -> DbResult<Sale>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection, &'c mut Sale) -> TxFuture<'c, ()>
            + Send
            + 'static,
    {
        run_in_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let mut sale = fetch_sale_in(&mut *conn, sale_id).await?;
                change(&mut *conn, &mut sale).await?;
                save_sale_in(&mut *conn, &sale).await?;
                fetch_sale_in(conn, sale_id).await
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use pdv_core::{CoreError, NewCashierSession, Product, ProductData};

    async fn setup() -> (Database, Product, Product) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let soap = db
            .products()
            .insert(ProductData {
                name: "Sabonete".into(),
                sku: Some("SAB".into()),
                price: Money::from_cents(350),
                tax_rate: TaxRate::from_bps(1800),
                is_active: true,
                ..Default::default()
            })
            .await
            .unwrap();
        let cheese = db
            .products()
            .insert(ProductData {
                name: "Queijo minas (kg)".into(),
                sku: Some("QMN".into()),
                price: Money::from_cents(4990),
                requires_weighing: true,
                is_active: true,
                ..Default::default()
            })
            .await
            .unwrap();
        (db, soap, cheese)
    }

    fn header(number: &str, session: Option<LocalId>) -> NewSale {
        NewSale {
            sale_number: number.into(),
            cashier_session_id: session,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_persisted_totals_match_items() {
        let (db, soap, cheese) = setup().await;
        let sales = db.sales();

        let sale = sales.create(header("S-1", None)).await.unwrap();
        assert_eq!(sale.status, SaleStatus::Pending);

        sales
            .add_item(sale.id, NewSaleItem::for_product(&soap, 3))
            .await
            .unwrap();
        let weighed = NewSaleItem::weighed(&cheese, Decimal::from_str("0.415").unwrap());
        let sale = sales.add_item(sale.id, weighed).await.unwrap();
        let sale = sales.apply_discount(sale.id, 500).await.unwrap();

        let stored = sales.get(sale.id).await.unwrap().unwrap();
        assert_eq!(stored.items.len(), 2);
        assert!(stored.totals_consistent());
        assert_eq!(stored.items[1].weight, Some(Decimal::from_str("0.415").unwrap()));
        // 0.415 kg at R$ 49.90 = R$ 20.7085, rounded half-even
        assert_eq!(stored.items[1].total_price.cents(), 2071);
        assert_eq!(stored.subtotal.cents(), 1050 + 2071);

        let first_item = stored.items[0].id;
        let after = sales.remove_item(sale.id, first_item).await.unwrap();
        assert_eq!(after.items.len(), 1);
        assert!(after.totals_consistent());
        assert_eq!(after.subtotal.cents(), 2071);
    }

    #[tokio::test]
    async fn test_complete_books_session() {
        let (db, soap, _) = setup().await;
        let session = db
            .sessions()
            .open(NewCashierSession {
                session_number: "CX-1".into(),
                user_id: 1,
                opening_cash: Money::from_cents(5_000),
                ..Default::default()
            })
            .await
            .unwrap();

        let sales = db.sales();
        let sale = sales.create(header("S-1", Some(session.id))).await.unwrap();
        sales
            .add_item(sale.id, NewSaleItem::for_product(&soap, 2))
            .await
            .unwrap();

        // not paid yet
        let err = sales.complete(sale.id).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InsufficientPayment { .. })
        ));

        let sale = sales
            .set_payment(sale.id, PaymentMethod::Pix, Money::from_cents(1_000))
            .await
            .unwrap();
        let sale = sales.complete(sale.id).await.unwrap();
        assert_eq!(sale.status, SaleStatus::Completed);
        assert!(sale.completed_at.is_some());

        let booked = db.sessions().get(session.id).await.unwrap().unwrap();
        assert_eq!(booked.sales_count, 1);
        assert_eq!(booked.totals.pix, sale.total_amount);
        assert_eq!(booked.total_sales(), sale.total_amount);

        let cancelled = sales.cancel(sale.id).await.unwrap();
        assert_eq!(cancelled.status, SaleStatus::Cancelled);
        let booked = db.sessions().get(session.id).await.unwrap().unwrap();
        assert_eq!(booked.sales_count, 0);
        assert_eq!(booked.cancelled_sales_count, 1);
        assert!(booked.total_sales().is_zero());

        // completed sales cannot be edited
        let err = sales
            .add_item(sale.id, NewSaleItem::for_product(&soap, 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InvalidSaleStatus { .. })
        ));
        assert_eq!(sales.get(sale.id).await.unwrap().unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn test_unsynced_skips_pending_and_delete_cascades() {
        let (db, soap, _) = setup().await;
        let sales = db.sales();

        let open = sales.create(header("S-1", None)).await.unwrap();
        sales
            .add_item(open.id, NewSaleItem::for_product(&soap, 1))
            .await
            .unwrap();
        assert!(sales.list_unsynced(10).await.unwrap().is_empty());

        let done = sales.create(header("S-2", None)).await.unwrap();
        sales
            .add_item(done.id, NewSaleItem::for_product(&soap, 1))
            .await
            .unwrap();
        sales
            .set_payment(done.id, PaymentMethod::Cash, Money::from_cents(500))
            .await
            .unwrap();
        let done = sales.complete(done.id).await.unwrap();
        assert_eq!(done.change_amount.cents(), 500 - done.total_amount.cents());

        let unsynced = sales.list_unsynced(10).await.unwrap();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].sale_number, "S-2");
        assert_eq!(sales.get_by_number("S-2").await.unwrap().unwrap().id, done.id);

        sales.delete(open.id).await.unwrap();
        let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sale_items WHERE sale_id = ?1")
            .bind(open.id)
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(orphans, 0);
        assert!(matches!(
            sales.delete(open.id).await.unwrap_err(),
            DbError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_duplicate_sale_number() {
        let (db, _, _) = setup().await;
        db.sales().create(header("S-1", None)).await.unwrap();
        let err = db.sales().create(header("S-1", None)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mutations_on_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("pos.db")).max_connections(8))
            .await
            .unwrap();
        let soap = db
            .products()
            .insert(ProductData {
                name: "Sabonete".into(),
                price: Money::from_cents(350),
                is_active: true,
                ..Default::default()
            })
            .await
            .unwrap();

        let mut ids = Vec::new();
        for n in 0..16 {
            let sale = db.sales().create(header(&format!("S-{n}"), None)).await.unwrap();
            db.sales()
                .add_item(sale.id, NewSaleItem::for_product(&soap, 2))
                .await
                .unwrap();
            ids.push(sale.id);
        }

        let mut tasks = Vec::new();
        for round in 0..80u32 {
            let sales = db.sales();
            let id = ids[round as usize % ids.len()];
            tasks.push(tokio::spawn(async move {
                sales.apply_discount(id, (round % 10) * 100).await
            }));
        }
        for task in tasks {
            let sale = task.await.unwrap().unwrap();
            assert!(sale.totals_consistent());
        }

        for id in ids {
            let stored = db.sales().get(id).await.unwrap().unwrap();
            assert!(stored.totals_consistent());
            assert_eq!(stored.items.len(), 1);
        }
    }
}
