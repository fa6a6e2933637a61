//! # Product Repository
//!
//! Products arrive from the remote catalog and are occasionally created or
//! edited at the terminal while offline.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Remote upsert reconciliation                          │
//! │                                                                         │
//! │  pulled product (remote_id R, sku S)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  row with remote_id = R ?  ──no──► row with sku = S, no remote_id ?    │
//! │       │ yes                              │ yes               │ no       │
//! │       ▼                                  ▼                   ▼          │
//! │  ┌──────────────┐                   same as left        INSERT clean   │
//! │  │ row clean?   │                                                       │
//! │  └──┬────────┬──┘                                                       │
//! │  yes│        │no                                                        │
//! │     ▼        ▼                                                          │
//! │  overwrite  keep local edit, only link remote_id (pushed next pass)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use pdv_core::{LocalId, Money, Product, ProductData, SyncState, TaxRate};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::query::run_in_transaction;

const PRODUCT_COLUMNS: &str = "id, remote_id, name, description, sku, barcode, price_cents, \
     cost_cents, stock_quantity, category_name, brand, requires_weighing, is_active, \
     tax_rate_bps, created_at, updated_at, synced, sync_error, sync_version, synced_at";

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i64,
    remote_id: Option<i64>,
    name: String,
    description: Option<String>,
    sku: Option<String>,
    barcode: Option<String>,
    price_cents: i64,
    cost_cents: Option<i64>,
    stock_quantity: i64,
    category_name: Option<String>,
    brand: Option<String>,
    requires_weighing: bool,
    is_active: bool,
    tax_rate_bps: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    synced: bool,
    sync_error: Option<String>,
    sync_version: i64,
    synced_at: Option<DateTime<Utc>>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            data: ProductData {
                name: row.name,
                description: row.description,
                sku: row.sku,
                barcode: row.barcode,
                price: Money::from_cents(row.price_cents),
                cost: row.cost_cents.map(Money::from_cents),
                stock_quantity: row.stock_quantity,
                category_name: row.category_name,
                brand: row.brand,
                requires_weighing: row.requires_weighing,
                is_active: row.is_active,
                tax_rate: TaxRate::from_bps(row.tax_rate_bps),
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
            sync: SyncState {
                remote_id: row.remote_id,
                synced: row.synced,
                sync_error: row.sync_error,
                sync_version: row.sync_version,
                synced_at: row.synced_at,
            },
        }
    }
}

/// What a remote upsert did to the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// A pending local edit won; only the remote id was linked.
    KeptLocal,
}

#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Creates a product at this terminal. It starts dirty.
    pub async fn insert(&self, data: ProductData) -> DbResult<Product> {
        let data = data.normalized();
        let now = Utc::now();
        debug!(name = %data.name, sku = ?data.sku, "Inserting local product");

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO products (
                name, description, sku, barcode, price_cents, cost_cents,
                stock_quantity, category_name, brand, requires_weighing,
                is_active, tax_rate_bps, created_at, updated_at,
                synced, sync_version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13, 0, 1)
            RETURNING id
            "#,
        )
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.sku)
        .bind(&data.barcode)
        .bind(data.price.cents())
        .bind(data.cost.map(|c| c.cents()))
        .bind(data.stock_quantity)
        .bind(&data.category_name)
        .bind(&data.brand)
        .bind(data.requires_weighing)
        .bind(data.is_active)
        .bind(data.tax_rate.bps())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Replaces a product's fields from a local edit and marks it dirty.
    pub async fn update(&self, id: LocalId, data: ProductData) -> DbResult<Product> {
        let data = data.normalized();
        debug!(id, "Updating local product");

        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?2, description = ?3, sku = ?4, barcode = ?5,
                price_cents = ?6, cost_cents = ?7, stock_quantity = ?8,
                category_name = ?9, brand = ?10, requires_weighing = ?11,
                is_active = ?12, tax_rate_bps = ?13, updated_at = ?14,
                synced = 0, sync_version = sync_version + 1
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.sku)
        .bind(&data.barcode)
        .bind(data.price.cents())
        .bind(data.cost.map(|c| c.cents()))
        .bind(data.stock_quantity)
        .bind(&data.category_name)
        .bind(&data.brand)
        .bind(data.requires_weighing)
        .bind(data.is_active)
        .bind(data.tax_rate.bps())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Applies a product pulled from the remote catalog.
    pub async fn upsert_remote(
        &self,
        remote_id: i64,
        data: ProductData,
    ) -> DbResult<UpsertOutcome> {
        let data = data.normalized();
        run_in_transaction(&self.pool, move |conn| {
            Box::pin(async move { upsert_remote_in(conn, remote_id, &data).await })
        })
        .await
    }

    pub async fn get(&self, id: LocalId) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let row: Option<ProductRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Product::from))
    }

    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?1");
        let row: Option<ProductRow> = sqlx::query_as(&sql)
            .bind(sku.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Product::from))
    }

    /// First active product with this barcode.
    pub async fn get_by_barcode(&self, barcode: &str) -> DbResult<Option<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products
             WHERE barcode = ?1 AND is_active = 1 ORDER BY id LIMIT 1"
        );
        let row: Option<ProductRow> = sqlx::query_as(&sql)
            .bind(barcode.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Product::from))
    }

    pub async fn get_by_remote_id(&self, remote_id: i64) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE remote_id = ?1");
        let row: Option<ProductRow> = sqlx::query_as(&sql)
            .bind(remote_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Product::from))
    }

    /// Active products whose name, sku or barcode contains `query`.
    /// An empty query lists active products by name.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        let pattern = format!("%{}%", query.trim());
        debug!(query = %query, limit, "Searching products");

        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products
             WHERE is_active = 1
               AND (name LIKE ?1 OR sku LIKE ?1 OR barcode LIKE ?1)
             ORDER BY name
             LIMIT ?2"
        );
        let rows: Vec<ProductRow> = sqlx::query_as(&sql)
            .bind(pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Dirty products, oldest edit first.
    pub async fn list_unsynced(&self, limit: u32) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products
             WHERE synced = 0 ORDER BY updated_at, id LIMIT ?1"
        );
        let rows: Vec<ProductRow> = sqlx::query_as(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

async fn upsert_remote_in(
    conn: &mut SqliteConnection,
    remote_id: i64,
    data: &ProductData,
) -> DbResult<UpsertOutcome> {
    let now = Utc::now();

    let mut existing: Option<(i64, bool)> =
        sqlx::query_as("SELECT id, synced FROM products WHERE remote_id = ?1")
            .bind(remote_id)
            .fetch_optional(&mut *conn)
            .await?;

    // an offline-created product the server now knows under its sku
    if existing.is_none() {
        if let Some(sku) = &data.sku {
            existing = sqlx::query_as(
                "SELECT id, synced FROM products WHERE sku = ?1 AND remote_id IS NULL",
            )
            .bind(sku)
            .fetch_optional(&mut *conn)
            .await?;
        }
    }

    match existing {
        None => {
            sqlx::query(
                r#"
                INSERT INTO products (
                    remote_id, name, description, sku, barcode, price_cents,
                    cost_cents, stock_quantity, category_name, brand,
                    requires_weighing, is_active, tax_rate_bps,
                    created_at, updated_at, synced, sync_version, synced_at
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                    ?14, ?14, 1, 0, ?14
                )
                "#,
            )
            .bind(remote_id)
            .bind(&data.name)
            .bind(&data.description)
            .bind(&data.sku)
            .bind(&data.barcode)
            .bind(data.price.cents())
            .bind(data.cost.map(|c| c.cents()))
            .bind(data.stock_quantity)
            .bind(&data.category_name)
            .bind(&data.brand)
            .bind(data.requires_weighing)
            .bind(data.is_active)
            .bind(data.tax_rate.bps())
            .bind(now)
            .execute(&mut *conn)
            .await?;
            Ok(UpsertOutcome::Inserted)
        }
        Some((id, false)) => {
            sqlx::query("UPDATE products SET remote_id = ?1 WHERE id = ?2")
                .bind(remote_id)
                .bind(id)
                .execute(&mut *conn)
                .await?;
            debug!(id, remote_id, "Kept pending local product edit");
            Ok(UpsertOutcome::KeptLocal)
        }
        Some((id, true)) => {
            sqlx::query(
                r#"
                UPDATE products SET
                    remote_id = ?2, name = ?3, description = ?4, sku = ?5,
                    barcode = ?6, price_cents = ?7, cost_cents = ?8,
                    stock_quantity = ?9, category_name = ?10, brand = ?11,
                    requires_weighing = ?12, is_active = ?13, tax_rate_bps = ?14,
                    updated_at = ?15, synced_at = ?15, sync_error = NULL
                WHERE id = ?1
                "#,
            )
            .bind(id)
            .bind(remote_id)
            .bind(&data.name)
            .bind(&data.description)
            .bind(&data.sku)
            .bind(&data.barcode)
            .bind(data.price.cents())
            .bind(data.cost.map(|c| c.cents()))
            .bind(data.stock_quantity)
            .bind(&data.category_name)
            .bind(&data.brand)
            .bind(data.requires_weighing)
            .bind(data.is_active)
            .bind(data.tax_rate.bps())
            .bind(now)
            .execute(&mut *conn)
            .await?;
            Ok(UpsertOutcome::Updated)
        }
    }
}
