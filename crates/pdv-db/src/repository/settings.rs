//! Key/value terminal settings stored in the local database (terminal id,
//! last pull time and the like). Values are text; typed reads parse them.

use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::DbResult;

#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM app_settings WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    pub async fn get_or(&self, key: &str, default: &str) -> DbResult<String> {
        Ok(self.get(key).await?.unwrap_or_else(|| default.to_string()))
    }

    /// Reads and parses a setting. Unparseable values read as absent.
    pub async fn get_parsed<T: FromStr>(&self, key: &str) -> DbResult<Option<T>> {
        let Some(raw) = self.get(key).await? else {
            return Ok(None);
        };
        match raw.parse() {
            Ok(value) => Ok(Some(value)),
            Err(_) => {
                warn!(key, value = %raw, "Ignoring unparseable setting");
                Ok(None)
            }
        }
    }

    pub async fn set(&self, key: &str, value: impl ToString) -> DbResult<()> {
        let value = value.to_string();
        sqlx::query(
            r#"
            INSERT INTO app_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(&value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        debug!(key, "Setting saved");
        Ok(())
    }

    /// Returns whether the key existed.
    pub async fn delete(&self, key: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM app_settings WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn all(&self) -> DbResult<BTreeMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM app_settings")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let settings = db.settings();

        assert_eq!(settings.get("terminal_id").await.unwrap(), None);
        assert_eq!(settings.get_or("terminal_id", "T00").await.unwrap(), "T00");

        settings.set("terminal_id", "T07").await.unwrap();
        settings.set("terminal_id", "T08").await.unwrap();
        settings.set("sync_batch", 25).await.unwrap();
        settings.set("label", "abc").await.unwrap();

        assert_eq!(settings.get("terminal_id").await.unwrap().as_deref(), Some("T08"));
        assert_eq!(settings.get_parsed::<u32>("sync_batch").await.unwrap(), Some(25));
        assert_eq!(settings.get_parsed::<u32>("label").await.unwrap(), None);
        assert_eq!(settings.all().await.unwrap().len(), 3);

        assert!(settings.delete("label").await.unwrap());
        assert!(!settings.delete("label").await.unwrap());
    }
}
