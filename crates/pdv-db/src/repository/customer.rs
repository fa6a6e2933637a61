//! Customer cache. Same reconciliation rules as products, keyed on the
//! CPF/CNPJ document instead of the SKU.

use chrono::{DateTime, Utc};
use pdv_core::{Customer, CustomerData, LocalId, SyncState};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::product::UpsertOutcome;
use crate::error::{DbError, DbResult};
use crate::query::run_in_transaction;

const CUSTOMER_COLUMNS: &str = "id, remote_id, name, email, phone, document, document_type, \
     address, city, state, zip_code, is_active, notes, created_at, updated_at, \
     synced, sync_error, sync_version, synced_at";

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: i64,
    remote_id: Option<i64>,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    document: Option<String>,
    document_type: Option<String>,
    address: Option<String>,
    city: Option<String>,
    state: Option<String>,
    zip_code: Option<String>,
    is_active: bool,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    synced: bool,
    sync_error: Option<String>,
    sync_version: i64,
    synced_at: Option<DateTime<Utc>>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            id: row.id,
            data: CustomerData {
                name: row.name,
                email: row.email,
                phone: row.phone,
                document: row.document,
                document_type: row.document_type,
                address: row.address,
                city: row.city,
                state: row.state,
                zip_code: row.zip_code,
                is_active: row.is_active,
                notes: row.notes,
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

#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    pub async fn insert(&self, data: CustomerData) -> DbResult<Customer> {
        let data = data.normalized();
        let now = Utc::now();
        debug!(name = %data.name, "Inserting local customer");

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO customers (
                name, email, phone, document, document_type, address, city,
                state, zip_code, is_active, notes, created_at, updated_at,
                synced, sync_version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12, 0, 1)
            RETURNING id
            "#,
        )
        .bind(&data.name)
        .bind(&data.email)
        .bind(&data.phone)
        .bind(&data.document)
        .bind(&data.document_type)
        .bind(&data.address)
        .bind(&data.city)
        .bind(&data.state)
        .bind(&data.zip_code)
        .bind(data.is_active)
        .bind(&data.notes)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", id))
    }

    pub async fn update(&self, id: LocalId, data: CustomerData) -> DbResult<Customer> {
        let data = data.normalized();
        let result = sqlx::query(
            r#"
            UPDATE customers SET
                name = ?2, email = ?3, phone = ?4, document = ?5,
                document_type = ?6, address = ?7, city = ?8, state = ?9,
                zip_code = ?10, is_active = ?11, notes = ?12, updated_at = ?13,
                synced = 0, sync_version = sync_version + 1
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(&data.name)
        .bind(&data.email)
        .bind(&data.phone)
        .bind(&data.document)
        .bind(&data.document_type)
        .bind(&data.address)
        .bind(&data.city)
        .bind(&data.state)
        .bind(&data.zip_code)
        .bind(data.is_active)
        .bind(&data.notes)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", id));
        }
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", id))
    }

    /// Applies a customer pulled from the remote API.
    pub async fn upsert_remote(
        &self,
        remote_id: i64,
        data: CustomerData,
    ) -> DbResult<UpsertOutcome> {
        let data = data.normalized();
        run_in_transaction(&self.pool, move |conn| {
            Box::pin(async move { upsert_remote_in(conn, remote_id, &data).await })
        })
        .await
    }

    pub async fn get(&self, id: LocalId) -> DbResult<Option<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?1");
        let row: Option<CustomerRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Customer::from))
    }

    pub async fn get_by_document(&self, document: &str) -> DbResult<Option<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE document = ?1");
        let row: Option<CustomerRow> = sqlx::query_as(&sql)
            .bind(document.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Customer::from))
    }

    /// Active customers matching name, document, email or phone.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Customer>> {
        let pattern = format!("%{}%", query.trim());
        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers
             WHERE is_active = 1
               AND (name LIKE ?1 OR document LIKE ?1 OR email LIKE ?1 OR phone LIKE ?1)
             ORDER BY name
             LIMIT ?2"
        );
        let rows: Vec<CustomerRow> = sqlx::query_as(&sql)
            .bind(pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Customer::from).collect())
    }

    pub async fn list_unsynced(&self, limit: u32) -> DbResult<Vec<Customer>> {
        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers
             WHERE synced = 0 ORDER BY updated_at, id LIMIT ?1"
        );
        let rows: Vec<CustomerRow> = sqlx::query_as(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Customer::from).collect())
    }
}

async fn upsert_remote_in(
    conn: &mut SqliteConnection,
    remote_id: i64,
    data: &CustomerData,
) -> DbResult<UpsertOutcome> {
    let now = Utc::now();

    let mut existing: Option<(i64, bool)> =
        sqlx::query_as("SELECT id, synced FROM customers WHERE remote_id = ?1")
            .bind(remote_id)
            .fetch_optional(&mut *conn)
            .await?;

    if existing.is_none() {
        if let Some(document) = &data.document {
            existing = sqlx::query_as(
                "SELECT id, synced FROM customers WHERE document = ?1 AND remote_id IS NULL",
            )
            .bind(document)
            .fetch_optional(&mut *conn)
            .await?;
        }
    }

    match existing {
        None => {
            sqlx::query(
                r#"
                INSERT INTO customers (
                    remote_id, name, email, phone, document, document_type,
                    address, city, state, zip_code, is_active, notes,
                    created_at, updated_at, synced, sync_version, synced_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13, 1, 0, ?13)
                "#,
            )
            .bind(remote_id)
            .bind(&data.name)
            .bind(&data.email)
            .bind(&data.phone)
            .bind(&data.document)
            .bind(&data.document_type)
            .bind(&data.address)
            .bind(&data.city)
            .bind(&data.state)
            .bind(&data.zip_code)
            .bind(data.is_active)
            .bind(&data.notes)
            .bind(now)
            .execute(&mut *conn)
            .await?;
            Ok(UpsertOutcome::Inserted)
        }
        Some((id, false)) => {
            sqlx::query("UPDATE customers SET remote_id = ?1 WHERE id = ?2")
                .bind(remote_id)
                .bind(id)
                .execute(&mut *conn)
                .await?;
            debug!(id, remote_id, "Kept pending local customer edit");
            Ok(UpsertOutcome::KeptLocal)
        }
        Some((id, true)) => {
            sqlx::query(
                r#"
                UPDATE customers SET
                    remote_id = ?2, name = ?3, email = ?4, phone = ?5,
                    document = ?6, document_type = ?7, address = ?8, city = ?9,
                    state = ?10, zip_code = ?11, is_active = ?12, notes = ?13,
                    updated_at = ?14, synced_at = ?14, sync_error = NULL
                WHERE id = ?1
                "#,
            )
            .bind(id)
            .bind(remote_id)
            .bind(&data.name)
            .bind(&data.email)
            .bind(&data.phone)
            .bind(&data.document)
            .bind(&data.document_type)
            .bind(&data.address)
            .bind(&data.city)
            .bind(&data.state)
            .bind(&data.zip_code)
            .bind(data.is_active)
            .bind(&data.notes)
            .bind(now)
            .execute(&mut *conn)
            .await?;
            Ok(UpsertOutcome::Updated)
        }
    }
}
