//! # Maintenance
//!
//! Backup, compaction and a size report for the local cache file.
//!
//! Backups use `VACUUM INTO`, which writes a consistent, compacted copy
//! while the pool stays usable. Default names are
//! `<stem>_backup_YYYYMMDD_HHMMSS.db` in the configured backup directory.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::pool::Database;

/// Snapshot of the database for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseInfo {
    pub path: Option<PathBuf>,
    pub file_size_bytes: u64,
    /// Row count per user table.
    pub tables: BTreeMap<String, i64>,
}

impl Database {
    /// Writes a consistent copy of the database and returns its path.
    ///
    /// Without `dest` an in-memory database has nowhere to default to and
    /// the call fails.
    pub async fn backup(&self, dest: Option<&Path>) -> DbResult<PathBuf> {
        let target = match dest {
            Some(path) => path.to_path_buf(),
            None => self.default_backup_path()?,
        };

        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        if target.exists() {
            return Err(DbError::Conflict(format!(
                "backup target {} already exists",
                target.display()
            )));
        }

        sqlx::query("VACUUM INTO ?1")
            .bind(target.to_string_lossy().into_owned())
            .execute(self.pool())
            .await?;

        info!(path = %target.display(), "Database backup written");
        Ok(target)
    }

    fn default_backup_path(&self) -> DbResult<PathBuf> {
        let source = self.path().ok_or_else(|| {
            DbError::Internal("in-memory database needs an explicit backup path".to_string())
        })?;
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "database".to_string());
        let dir = match self.backup_dir() {
            Some(dir) => dir.to_path_buf(),
            None => source
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        Ok(dir.join(format!("{stem}_backup_{stamp}.db")))
    }

    /// Rebuilds the file to reclaim free pages.
    pub async fn vacuum(&self) -> DbResult<()> {
        info!("Vacuuming database");
        sqlx::query("VACUUM").execute(self.pool()).await?;
        Ok(())
    }

    pub async fn info(&self) -> DbResult<DatabaseInfo> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx_%'
             ORDER BY name",
        )
        .fetch_all(self.pool())
        .await?;

        let mut tables = BTreeMap::new();
        for name in names {
            // names come from sqlite_master, not from input
            let sql = format!("SELECT COUNT(*) FROM \"{}\"", name.replace('"', "\"\""));
            let count: i64 = sqlx::query_scalar(&sql).fetch_one(self.pool()).await?;
            tables.insert(name, count);
        }

        let file_size_bytes = match self.path() {
            Some(path) => std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            None => 0,
        };

        Ok(DatabaseInfo {
            path: self.path().map(Path::to_path_buf),
            file_size_bytes,
            tables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;

    #[tokio::test]
    async fn test_backup_to_default_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("pos_local.db");
        let backups = dir.path().join("backups");
        let db = Database::new(DbConfig::new(&db_path).backup_dir(&backups))
            .await
            .unwrap();
        db.settings().set("terminal_id", "T01").await.unwrap();

        let copy = db.backup(None).await.unwrap();
        assert!(copy.starts_with(&backups));
        assert!(copy
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("pos_local_backup_"));

        let restored = Database::new(DbConfig::new(&copy).run_migrations(false))
            .await
            .unwrap();
        assert_eq!(
            restored.settings().get("terminal_id").await.unwrap().as_deref(),
            Some("T01")
        );

        // same target twice is refused
        assert!(matches!(
            db.backup(Some(&copy)).await.unwrap_err(),
            DbError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn test_in_memory_backup_needs_destination() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.backup(None).await.is_err());

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("copy.db");
        assert_eq!(db.backup(Some(&target)).await.unwrap(), target);
        assert!(target.exists());
    }

    #[tokio::test]
    async fn test_info_counts_tables() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.settings().set("a", 1).await.unwrap();
        db.vacuum().await.unwrap();

        let info = db.info().await.unwrap();
        assert_eq!(info.tables.get("app_settings"), Some(&1));
        assert_eq!(info.tables.get("sales"), Some(&0));
        assert!(!info.tables.contains_key("_sqlx_migrations"));
        assert_eq!(info.file_size_bytes, 0);
    }
}
