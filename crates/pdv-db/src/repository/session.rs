//! # Cashier Session Repository
//!
//! One drawer is active per terminal at a time: opening a second session
//! while another is open or suspended is a conflict.
//!
//! State transitions are delegated to [`CashierSession`]; this module only
//! loads, persists and marks rows dirty. The `*_in` helpers run on a caller's
//! connection so sale completion can update the session in the same
//! transaction.

use chrono::{DateTime, Utc};
use pdv_core::{
    CashierSession, LocalId, Money, NewCashierSession, SessionStatus, SessionTotals, SyncState,
};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::query::run_in_transaction;

const SESSION_COLUMNS: &str = "id, remote_id, session_number, user_id, user_name, terminal_id, \
     status, opening_cash_cents, total_cash_sales_cents, total_card_sales_cents, \
     total_pix_sales_cents, total_other_sales_cents, sales_count, cancelled_sales_count, \
     closing_cash_cents, expected_cash_cents, cash_difference_cents, opening_notes, \
     closing_notes, opened_at, closed_at, updated_at, synced, sync_error, sync_version, synced_at";

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: i64,
    remote_id: Option<i64>,
    session_number: String,
    user_id: i64,
    user_name: Option<String>,
    terminal_id: Option<String>,
    status: SessionStatus,
    opening_cash_cents: i64,
    total_cash_sales_cents: i64,
    total_card_sales_cents: i64,
    total_pix_sales_cents: i64,
    total_other_sales_cents: i64,
    sales_count: i64,
    cancelled_sales_count: i64,
    closing_cash_cents: Option<i64>,
    expected_cash_cents: Option<i64>,
    cash_difference_cents: Option<i64>,
    opening_notes: Option<String>,
    closing_notes: Option<String>,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    synced: bool,
    sync_error: Option<String>,
    sync_version: i64,
    synced_at: Option<DateTime<Utc>>,
}

impl From<SessionRow> for CashierSession {
    fn from(row: SessionRow) -> Self {
        CashierSession {
            id: row.id,
            session_number: row.session_number,
            user_id: row.user_id,
            user_name: row.user_name,
            terminal_id: row.terminal_id,
            status: row.status,
            opening_cash: Money::from_cents(row.opening_cash_cents),
            totals: SessionTotals {
                cash: Money::from_cents(row.total_cash_sales_cents),
                card: Money::from_cents(row.total_card_sales_cents),
                pix: Money::from_cents(row.total_pix_sales_cents),
                other: Money::from_cents(row.total_other_sales_cents),
            },
            sales_count: row.sales_count,
            cancelled_sales_count: row.cancelled_sales_count,
            closing_cash: row.closing_cash_cents.map(Money::from_cents),
            expected_cash: row.expected_cash_cents.map(Money::from_cents),
            cash_difference: row.cash_difference_cents.map(Money::from_cents),
            opening_notes: row.opening_notes,
            closing_notes: row.closing_notes,
            opened_at: row.opened_at,
            closed_at: row.closed_at,
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

// =============================================================================
// Connection-level helpers
// =============================================================================

pub(crate) async fn fetch_session_in(
    conn: &mut SqliteConnection,
    id: LocalId,
) -> DbResult<CashierSession> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM cashier_sessions WHERE id = ?1");
    let row: Option<SessionRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(CashierSession::from)
        .ok_or_else(|| DbError::not_found("CashierSession", id))
}

/// Writes every mutable column of `session` and marks the row dirty.
pub(crate) async fn save_session_in(
    conn: &mut SqliteConnection,
    session: &CashierSession,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE cashier_sessions SET
            status = ?2,
            total_sales_cents = ?3,
            total_cash_sales_cents = ?4,
            total_card_sales_cents = ?5,
            total_pix_sales_cents = ?6,
            total_other_sales_cents = ?7,
            sales_count = ?8,
            cancelled_sales_count = ?9,
            closing_cash_cents = ?10,
            expected_cash_cents = ?11,
            cash_difference_cents = ?12,
            closing_notes = ?13,
            closed_at = ?14,
            updated_at = ?15,
            synced = 0,
            sync_version = sync_version + 1
        WHERE id = ?1
        "#,
    )
    .bind(session.id)
    .bind(session.status)
    .bind(session.total_sales().cents())
    .bind(session.totals.cash.cents())
    .bind(session.totals.card.cents())
    .bind(session.totals.pix.cents())
    .bind(session.totals.other.cents())
    .bind(session.sales_count)
    .bind(session.cancelled_sales_count)
    .bind(session.closing_cash.map(|m| m.cents()))
    .bind(session.expected_cash.map(|m| m.cents()))
    .bind(session.cash_difference.map(|m| m.cents()))
    .bind(&session.closing_notes)
    .bind(session.closed_at)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SessionRepository { pool }
    }

    /// Opens a drawer. Fails with [`DbError::Conflict`] if one is already
    /// open or suspended.
    pub async fn open(&self, new: NewCashierSession) -> DbResult<CashierSession> {
        run_in_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let active: Option<String> = sqlx::query_scalar(
                    "SELECT session_number FROM cashier_sessions WHERE status != 'closed' LIMIT 1",
                )
                .fetch_optional(&mut *conn)
                .await?;
                if let Some(number) = active {
                    return Err(DbError::Conflict(format!(
                        "cashier session {number} is still active"
                    )));
                }

                let now = Utc::now();
                let draft = CashierSession::open(0, new, now);
                let id: i64 = sqlx::query_scalar(
                    r#"
                    INSERT INTO cashier_sessions (
                        session_number, user_id, user_name, terminal_id, status,
                        opening_cash_cents, opening_notes, opened_at, created_at,
                        updated_at, synced, sync_version
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?8, 0, 1)
                    RETURNING id
                    "#,
                )
                .bind(&draft.session_number)
                .bind(draft.user_id)
                .bind(&draft.user_name)
                .bind(&draft.terminal_id)
                .bind(draft.status)
                .bind(draft.opening_cash.cents())
                .bind(&draft.opening_notes)
                .bind(now)
                .fetch_one(&mut *conn)
                .await?;

                info!(id, number = %draft.session_number, "Cashier session opened");
                fetch_session_in(conn, id).await
            })
        })
        .await
    }

    pub async fn get(&self, id: LocalId) -> DbResult<Option<CashierSession>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM cashier_sessions WHERE id = ?1");
        let row: Option<SessionRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(CashierSession::from))
    }

    /// The open or suspended session, if any.
    pub async fn current(&self) -> DbResult<Option<CashierSession>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM cashier_sessions
             WHERE status != 'closed' ORDER BY opened_at DESC, id DESC LIMIT 1"
        );
        let row: Option<SessionRow> = sqlx::query_as(&sql).fetch_optional(&self.pool).await?;
        Ok(row.map(CashierSession::from))
    }

    pub async fn suspend(&self, id: LocalId) -> DbResult<CashierSession> {
        self.transition(id, |s| s.suspend().map_err(DbError::from))
            .await
    }

    pub async fn resume(&self, id: LocalId) -> DbResult<CashierSession> {
        self.transition(id, |s| s.resume().map_err(DbError::from))
            .await
    }

    /// Closes the drawer with the counted cash.
    pub async fn close(
        &self,
        id: LocalId,
        closing_cash: Money,
        notes: Option<String>,
    ) -> DbResult<CashierSession> {
        let session = self
            .transition(id, move |s| {
                s.close(closing_cash, notes, Utc::now())
                    .map_err(DbError::from)
            })
            .await?;
        info!(
            id,
            expected = ?session.expected_cash,
            difference = ?session.cash_difference,
            "Cashier session closed"
        );
        Ok(session)
    }

    /// Dirty sessions, oldest first.
    pub async fn list_unsynced(&self, limit: u32) -> DbResult<Vec<CashierSession>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM cashier_sessions
             WHERE synced = 0 ORDER BY opened_at, id LIMIT ?1"
        );
        let rows: Vec<SessionRow> = sqlx::query_as(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(CashierSession::from).collect())
    }

    async fn transition<F>(&self, id: LocalId, apply: F) -> DbResult<CashierSession>
    where
        F: FnOnce(&mut CashierSession) -> DbResult<()> + Send + 'static,
    {
        run_in_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let mut session = fetch_session_in(&mut *conn, id).await?;
                apply(&mut session)?;
                save_session_in(&mut *conn, &session).await?;
                debug!(id, status = %session.status, "Cashier session updated");
                fetch_session_in(conn, id).await
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use pdv_core::CoreError;

    fn new_session(number: &str) -> NewCashierSession {
        NewCashierSession {
            session_number: number.into(),
            user_id: 7,
            user_name: Some("Operador".into()),
            terminal_id: Some("T01".into()),
            opening_cash: Money::from_cents(10_000),
            opening_notes: None,
        }
    }

    #[tokio::test]
    async fn test_single_active_session() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sessions();

        let first = repo.open(new_session("CX-1")).await.unwrap();
        assert_eq!(first.status, SessionStatus::Open);
        assert_eq!(first.sync.sync_version, 1);

        let err = repo.open(new_session("CX-2")).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));

        repo.suspend(first.id).await.unwrap();
        assert!(repo.open(new_session("CX-2")).await.is_err());

        let current = repo.current().await.unwrap().unwrap();
        assert_eq!(current.id, first.id);
        assert_eq!(current.status, SessionStatus::Suspended);
    }

    #[tokio::test]
    async fn test_close_settles_cash() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sessions();
        let session = repo.open(new_session("CX-1")).await.unwrap();

        let closed = repo
            .close(session.id, Money::from_cents(9_950), Some("troco".into()))
            .await
            .unwrap();
        assert_eq!(closed.status, SessionStatus::Closed);
        assert_eq!(closed.expected_cash, Some(Money::from_cents(10_000)));
        assert_eq!(closed.cash_difference, Some(Money::from_cents(-50)));
        assert_eq!(closed.sync.sync_version, 2);
        assert!(repo.current().await.unwrap().is_none());

        // a closed session accepts no further transitions
        let err = repo.resume(session.id).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InvalidSessionStatus { .. })
        ));

        repo.open(new_session("CX-2")).await.unwrap();
        assert_eq!(repo.list_unsynced(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_session() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.sessions().suspend(42).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
