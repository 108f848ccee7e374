//! Database initialization
//!
//! Opens (creating if needed) the SQLite database, applies connection
//! pragmas and brings the schema up to the latest migration.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Busy timeout applied to every pooled connection
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Open the database file without touching the schema
pub async fn open_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // WAL allows concurrent readers with one writer
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    Ok(pool)
}

/// Open the database and run all pending migrations
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let pool = open_database(db_path).await?;
    crate::db::migrations::run_migrations(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database without any schema
///
/// An in-memory SQLite database lives as long as its connection, so the
/// pool is pinned to exactly one connection that never expires.
pub async fn init_memory_database_unmigrated() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// In-memory database at the latest schema version (used by tests)
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = init_memory_database_unmigrated().await?;
    crate::db::migrations::run_migrations(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_database_creates_file_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("mealwise.db");

        let pool = init_database(&db_path).await.unwrap();
        assert!(db_path.exists());

        let version = crate::db::current_version(&pool).await.unwrap();
        assert_eq!(version, crate::db::latest_version());
    }

    #[tokio::test]
    async fn test_reopen_existing_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("mealwise.db");

        let pool = init_database(&db_path).await.unwrap();
        pool.close().await;

        let pool = init_database(&db_path).await.unwrap();
        let version = crate::db::current_version(&pool).await.unwrap();
        assert_eq!(version, crate::db::latest_version());
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let pool = init_memory_database().await.unwrap();
        let result = sqlx::query(
            "INSERT INTO auth_tokens (token_hash, user_id, created_at, expires_at) \
             VALUES ('h', 'missing-user', 'now', 'later')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }
}
