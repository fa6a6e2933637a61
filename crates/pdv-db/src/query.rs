//! # Parameterized Queries and Scoped Transactions
//!
//! Ad-hoc SQL for callers the repositories do not cover, plus the
//! transaction scope every multi-statement mutation in this crate runs in.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Scoped Transaction                                   │
//! │                                                                         │
//! │  db.transaction(|conn| Box::pin(async move { ... }))                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN IMMEDIATE                                                        │
//! │       │                                                                 │
//! │       ├── closure returns Ok(v)  ──► COMMIT   ──► Ok(v)                │
//! │       │                                                                 │
//! │       └── closure returns Err(e) ──► ROLLBACK ──► Err(e)               │
//! │                                                                         │
//! │  The closure only ever sees `&mut SqliteConnection`; it cannot commit  │
//! │  or roll back on its own.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

use crate::error::DbResult;
use crate::pool::Database;

/// Future returned by a transaction body.
pub type TxFuture<'c, T> = Pin<Box<dyn Future<Output = DbResult<T>> + Send + 'c>>;

/// A bind value for ad-hoc SQL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlParam {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Integer(v)
    }
}

impl From<i32> for SqlParam {
    fn from(v: i32) -> Self {
        SqlParam::Integer(v as i64)
    }
}

impl From<f64> for SqlParam {
    fn from(v: f64) -> Self {
        SqlParam::Real(v)
    }
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        SqlParam::Bool(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        SqlParam::Text(v)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlParam::Null)
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[SqlParam],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::Integer(v) => query.bind(*v),
            SqlParam::Real(v) => query.bind(*v),
            SqlParam::Text(v) => query.bind(v.clone()),
            SqlParam::Bool(v) => query.bind(*v),
        };
    }
    query
}

/// Runs `body` inside one transaction on `pool`.
///
/// The write lock is taken up front (`BEGIN IMMEDIATE`): a deferred
/// transaction that reads before writing cannot upgrade while another
/// connection writes, and SQLite fails it with `SQLITE_BUSY` without
/// waiting on `busy_timeout`.
pub(crate) async fn run_in_transaction<T, F>(pool: &SqlitePool, body: F) -> DbResult<T>
where
    T: Send,
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> TxFuture<'c, T> + Send,
{
    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;
    match body(&mut *tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            debug!(error = %err, "Transaction rolled back");
            Err(err)
        }
    }
}

impl Database {
    /// Runs `body` as one unit of work: committed if it returns `Ok`,
    /// rolled back if it returns `Err`.
    ///
    /// ```rust,ignore
    /// db.transaction(|conn| Box::pin(async move {
    ///     sqlx::query("INSERT INTO app_settings ...").execute(&mut *conn).await?;
    ///     sqlx::query("UPDATE products ...").execute(&mut *conn).await?;
    ///     Ok(())
    /// })).await?;
    /// ```
    pub async fn transaction<T, F>(&self, body: F) -> DbResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> TxFuture<'c, T> + Send,
    {
        run_in_transaction(self.pool(), body).await
    }

    /// Executes one statement and returns the affected row count.
    pub async fn execute(&self, sql: &str, params: &[SqlParam]) -> DbResult<u64> {
        let result = bind_params(sqlx::query(sql), params)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Executes `sql` once per parameter row, all in one transaction.
    ///
    /// If any row fails nothing from the batch is kept.
    pub async fn execute_many(&self, sql: &str, rows: &[Vec<SqlParam>]) -> DbResult<u64> {
        let sql = sql.to_string();
        let rows = rows.to_vec();
        self.transaction(move |conn| {
            Box::pin(async move {
                let mut affected = 0;
                for params in &rows {
                    let result = bind_params(sqlx::query(&sql), params)
                        .execute(&mut *conn)
                        .await?;
                    affected += result.rows_affected();
                }
                Ok(affected)
            })
        })
        .await
    }

    /// Runs a query and returns the raw rows.
    pub async fn fetch_all(&self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<SqliteRow>> {
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::DbConfig;
    use sqlx::Row;

    const INSERT_SETTING: &str =
        "INSERT INTO app_settings (key, value, updated_at) VALUES (?, ?, datetime('now'))";

    async fn setting_count(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM app_settings")
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_execute_and_fetch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let n = db
            .execute(INSERT_SETTING, &["terminal".into(), "T01".into()])
            .await
            .unwrap();
        assert_eq!(n, 1);

        let rows = db
            .fetch_all(
                "SELECT value FROM app_settings WHERE key = ?",
                &[SqlParam::from("terminal")],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        let value: String = rows[0].get("value");
        assert_eq!(value, "T01");
    }

    #[tokio::test]
    async fn test_execute_many_is_atomic() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let before = setting_count(&db).await;

        let rows: Vec<Vec<SqlParam>> = vec![
            vec!["a".into(), "1".into()],
            vec!["a".into(), "2".into()],
            vec!["c".into(), "3".into()],
        ];
        let err = db.execute_many(INSERT_SETTING, &rows).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
        assert_eq!(setting_count(&db).await, before);

        let ok_rows: Vec<Vec<SqlParam>> =
            vec![vec!["a".into(), "1".into()], vec!["b".into(), "2".into()]];
        assert_eq!(db.execute_many(INSERT_SETTING, &ok_rows).await.unwrap(), 2);
        assert_eq!(setting_count(&db).await, before + 2);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_error() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let result: DbResult<()> = db
            .transaction(|conn| {
                Box::pin(async move {
                    sqlx::query(INSERT_SETTING)
                        .bind("x")
                        .bind("1")
                        .execute(&mut *conn)
                        .await?;
                    Err(DbError::Conflict("abort".into()))
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(setting_count(&db).await, 0);

        db.transaction(|conn| {
            Box::pin(async move {
                sqlx::query(INSERT_SETTING)
                    .bind("x")
                    .bind("1")
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .await
        .unwrap();
        assert_eq!(setting_count(&db).await, 1);
    }

    #[test]
    fn test_param_conversions() {
        assert_eq!(SqlParam::from(Some(3i64)), SqlParam::Integer(3));
        assert_eq!(SqlParam::from(None::<String>), SqlParam::Null);
        assert_eq!(SqlParam::from(true), SqlParam::Bool(true));
    }
}
