//! Database schema migrations
//!
//! Versioned, linearly chained schema migrations. Each migration is an
//! `upgrade`/`downgrade` pair; version N always follows version N-1.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - Databases in the field were built from them
//! 2. **Always add new migrations** - Append a new entry with the next version number
//! 3. **Provide a downgrade** - It must undo exactly what the upgrade did
//! 4. **Prefer ALTER TABLE ADD COLUMN** - Column additions preserve existing rows
//!
//! Each migration runs inside a transaction together with the insert (or
//! delete) of its `schema_version` row, so a failed step leaves the recorded
//! version unchanged.

use crate::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// One step in the schema chain
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub upgrade: &'static [&'static str],
    pub downgrade: &'static [&'static str],
}

/// Row recorded in `schema_version` for an applied migration
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AppliedMigration {
    pub version: i64,
    pub name: String,
    pub applied_at: String,
}

/// The schema chain, oldest first
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users_and_tokens",
        upgrade: &[
            r#"
            CREATE TABLE users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                display_name TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE auth_tokens (
                token_hash TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX idx_auth_tokens_user_id ON auth_tokens(user_id)",
        ],
        downgrade: &["DROP TABLE auth_tokens", "DROP TABLE users"],
    },
    Migration {
        version: 2,
        name: "create_recipes_and_ingredients",
        upgrade: &[
            r#"
            CREATE TABLE recipes (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                description TEXT,
                servings INTEGER,
                prep_minutes INTEGER,
                cook_minutes INTEGER,
                instructions TEXT NOT NULL DEFAULT '[]',
                tags TEXT NOT NULL DEFAULT '[]',
                source_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX idx_recipes_user_id ON recipes(user_id)",
            r#"
            CREATE TABLE ingredients (
                id TEXT PRIMARY KEY,
                recipe_id TEXT NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                quantity REAL,
                unit TEXT,
                note TEXT
            )
            "#,
            "CREATE INDEX idx_ingredients_recipe_id ON ingredients(recipe_id)",
        ],
        downgrade: &["DROP TABLE ingredients", "DROP TABLE recipes"],
    },
    Migration {
        version: 3,
        name: "create_recipe_drafts",
        upgrade: &[
            r#"
            CREATE TABLE recipe_drafts (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                source_url TEXT NOT NULL,
                payload TEXT NOT NULL,
                warnings TEXT NOT NULL DEFAULT '[]',
                used_structured_data INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX idx_recipe_drafts_expires_at ON recipe_drafts(expires_at)",
        ],
        downgrade: &["DROP TABLE recipe_drafts"],
    },
    Migration {
        version: 4,
        name: "create_meal_plan_entries",
        upgrade: &[
            r#"
            CREATE TABLE meal_plan_entries (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                plan_date TEXT NOT NULL,
                meal_slot TEXT NOT NULL,
                recipe_id TEXT REFERENCES recipes(id) ON DELETE SET NULL,
                title TEXT NOT NULL,
                servings INTEGER,
                notes TEXT,
                created_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX idx_meal_plan_user_date ON meal_plan_entries(user_id, plan_date)",
        ],
        downgrade: &["DROP TABLE meal_plan_entries"],
    },
    Migration {
        version: 5,
        name: "create_chat_tables",
        upgrade: &[
            r#"
            CREATE TABLE conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX idx_conversations_user_id ON conversations(user_id)",
            r#"
            CREATE TABLE chat_messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                tool_name TEXT,
                proposal_id TEXT,
                created_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX idx_chat_messages_conversation ON chat_messages(conversation_id, created_at)",
            r#"
            CREATE TABLE tool_proposals (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                tool_name TEXT NOT NULL,
                arguments TEXT NOT NULL,
                summary TEXT NOT NULL,
                status TEXT NOT NULL,
                result TEXT,
                created_at TEXT NOT NULL,
                resolved_at TEXT
            )
            "#,
            "CREATE INDEX idx_tool_proposals_conversation ON tool_proposals(conversation_id)",
        ],
        downgrade: &[
            "DROP TABLE tool_proposals",
            "DROP TABLE chat_messages",
            "DROP TABLE conversations",
        ],
    },
    Migration {
        version: 6,
        name: "add_user_preferences",
        upgrade: &[
            "ALTER TABLE users ADD COLUMN household_size INTEGER NOT NULL DEFAULT 2",
            "ALTER TABLE users ADD COLUMN dietary_preferences TEXT NOT NULL DEFAULT '[]'",
            "ALTER TABLE users ADD COLUMN timezone TEXT NOT NULL DEFAULT 'UTC'",
        ],
        downgrade: &[
            "ALTER TABLE users DROP COLUMN timezone",
            "ALTER TABLE users DROP COLUMN dietary_preferences",
            "ALTER TABLE users DROP COLUMN household_size",
        ],
    },
];

/// Latest version in the compiled chain
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Check that versions start at 1 and increase by exactly one
pub fn validate_chain(migrations: &[Migration]) -> Result<()> {
    for (index, migration) in migrations.iter().enumerate() {
        let expected = index as i64 + 1;
        if migration.version != expected {
            return Err(Error::Migration(format!(
                "migration '{}' has version {} but position {} requires version {}",
                migration.name, migration.version, index, expected
            )));
        }
        if migration.upgrade.is_empty() {
            return Err(Error::Migration(format!(
                "migration v{} '{}' has no upgrade statements",
                migration.version, migration.name
            )));
        }
    }
    Ok(())
}

/// Create the bookkeeping table if missing
async fn ensure_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Get current schema version from database
///
/// Returns 0 if the schema_version table doesn't exist or has no rows
pub async fn current_version(pool: &SqlitePool) -> Result<i64> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

/// List applied migrations, oldest first
pub async fn applied(pool: &SqlitePool) -> Result<Vec<AppliedMigration>> {
    ensure_version_table(pool).await?;
    let rows = sqlx::query_as::<_, AppliedMigration>(
        "SELECT version, name, CAST(applied_at AS TEXT) AS applied_at FROM schema_version ORDER BY version",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Migrations not yet applied
pub async fn pending(pool: &SqlitePool) -> Result<Vec<Migration>> {
    let current = current_version(pool).await?;
    Ok(MIGRATIONS
        .iter()
        .filter(|m| m.version > current)
        .copied()
        .collect())
}

/// Run all pending migrations, returning the resulting version
pub async fn run_migrations(pool: &SqlitePool) -> Result<i64> {
    upgrade_chain(pool, MIGRATIONS, latest_version()).await
}

/// Upgrade to a specific version of the compiled chain
pub async fn upgrade_to(pool: &SqlitePool, target: i64) -> Result<i64> {
    upgrade_chain(pool, MIGRATIONS, target).await
}

/// Downgrade to `target`, running downgrade steps newest first
pub async fn downgrade_to(pool: &SqlitePool, target: i64) -> Result<i64> {
    downgrade_chain(pool, MIGRATIONS, target).await
}

async fn upgrade_chain(pool: &SqlitePool, migrations: &[Migration], target: i64) -> Result<i64> {
    validate_chain(migrations)?;
    let latest = migrations.last().map(|m| m.version).unwrap_or(0);
    if target > latest || target < 0 {
        return Err(Error::Migration(format!(
            "cannot upgrade to v{} (latest is v{})",
            target, latest
        )));
    }

    ensure_version_table(pool).await?;
    let current = current_version(pool).await?;

    if current == target {
        info!("Database schema is up to date (v{})", current);
        return Ok(current);
    }

    if current > latest {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current, latest
        );
        warn!("This may indicate a downgrade. Proceeding with caution.");
        return Ok(current);
    }

    if current > target {
        return Err(Error::Migration(format!(
            "database is at v{}; use a downgrade to reach v{}",
            current, target
        )));
    }

    info!("Running database migrations: v{} -> v{}", current, target);

    for migration in migrations
        .iter()
        .filter(|m| m.version > current && m.version <= target)
    {
        let mut tx = pool.begin().await?;
        for statement in migration.upgrade {
            sqlx::query(statement).execute(&mut *tx).await.map_err(|e| {
                Error::Migration(format!(
                    "upgrade v{} '{}' failed: {}",
                    migration.version, migration.name, e
                ))
            })?;
        }
        sqlx::query("INSERT INTO schema_version (version, name) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!("✓ Migration v{} ({}) applied", migration.version, migration.name);
    }

    info!("All migrations completed successfully");
    Ok(target)
}

async fn downgrade_chain(pool: &SqlitePool, migrations: &[Migration], target: i64) -> Result<i64> {
    validate_chain(migrations)?;
    ensure_version_table(pool).await?;
    let current = current_version(pool).await?;

    if target < 0 || target > current {
        return Err(Error::Migration(format!(
            "cannot downgrade from v{} to v{}",
            current, target
        )));
    }

    let latest = migrations.last().map(|m| m.version).unwrap_or(0);
    if current > latest {
        return Err(Error::Migration(format!(
            "database is at v{} but this build only knows migrations up to v{}",
            current, latest
        )));
    }

    for migration in migrations
        .iter()
        .rev()
        .filter(|m| m.version <= current && m.version > target)
    {
        let mut tx = pool.begin().await?;
        for statement in migration.downgrade {
            sqlx::query(statement).execute(&mut *tx).await.map_err(|e| {
                Error::Migration(format!(
                    "downgrade v{} '{}' failed: {}",
                    migration.version, migration.name, e
                ))
            })?;
        }
        sqlx::query("DELETE FROM schema_version WHERE version = ?")
            .bind(migration.version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!("✓ Migration v{} ({}) reverted", migration.version, migration.name);
    }

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database_unmigrated;

    async fn table_exists(pool: &SqlitePool, name: &str) -> bool {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?)",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    async fn column_exists(pool: &SqlitePool, table: &str, column: &str) -> bool {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM pragma_table_info('{}') WHERE name = ?",
            table
        ))
        .bind(column)
        .fetch_one(pool)
        .await
        .unwrap();
        count > 0
    }

    #[test]
    fn test_compiled_chain_is_linear() {
        validate_chain(MIGRATIONS).unwrap();
        assert_eq!(latest_version(), MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_validate_chain_rejects_gap() {
        let broken = [
            Migration { version: 1, name: "a", upgrade: &["SELECT 1"], downgrade: &[] },
            Migration { version: 3, name: "c", upgrade: &["SELECT 1"], downgrade: &[] },
        ];
        assert!(matches!(validate_chain(&broken), Err(Error::Migration(_))));
    }

    #[test]
    fn test_validate_chain_rejects_empty_upgrade() {
        let broken = [Migration { version: 1, name: "a", upgrade: &[], downgrade: &[] }];
        assert!(validate_chain(&broken).is_err());
    }

    #[tokio::test]
    async fn test_current_version_no_table() {
        let pool = init_memory_database_unmigrated().await.unwrap();
        assert_eq!(current_version(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upgrade_from_empty_database() {
        let pool = init_memory_database_unmigrated().await.unwrap();

        let version = run_migrations(&pool).await.unwrap();
        assert_eq!(version, latest_version());
        assert_eq!(current_version(&pool).await.unwrap(), latest_version());

        for table in ["users", "recipes", "ingredients", "recipe_drafts", "conversations", "tool_proposals"] {
            assert!(table_exists(&pool, table).await, "{} should exist", table);
        }
        assert!(column_exists(&pool, "users", "timezone").await);
        assert!(pending(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_migrations_idempotent() {
        let pool = init_memory_database_unmigrated().await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let rows = applied(&pool).await.unwrap();
        assert_eq!(rows.len(), MIGRATIONS.len());
        assert_eq!(rows[0].name, "create_users_and_tokens");
    }

    #[tokio::test]
    async fn test_downgrade_and_reupgrade() {
        let pool = init_memory_database_unmigrated().await.unwrap();
        run_migrations(&pool).await.unwrap();

        downgrade_to(&pool, 4).await.unwrap();
        assert_eq!(current_version(&pool).await.unwrap(), 4);
        assert!(!table_exists(&pool, "conversations").await);
        assert!(!column_exists(&pool, "users", "household_size").await);
        assert!(table_exists(&pool, "meal_plan_entries").await);

        let pending = pending(&pool).await.unwrap();
        assert_eq!(pending.iter().map(|m| m.version).collect::<Vec<_>>(), vec![5, 6]);

        run_migrations(&pool).await.unwrap();
        assert!(table_exists(&pool, "conversations").await);
        assert!(column_exists(&pool, "users", "household_size").await);
    }

    #[tokio::test]
    async fn test_downgrade_to_zero_removes_everything() {
        let pool = init_memory_database_unmigrated().await.unwrap();
        run_migrations(&pool).await.unwrap();
        downgrade_to(&pool, 0).await.unwrap();

        assert_eq!(current_version(&pool).await.unwrap(), 0);
        assert!(!table_exists(&pool, "users").await);
    }

    #[tokio::test]
    async fn test_downgrade_above_current_is_error() {
        let pool = init_memory_database_unmigrated().await.unwrap();
        upgrade_to(&pool, 2).await.unwrap();
        assert!(matches!(downgrade_to(&pool, 5).await, Err(Error::Migration(_))));
    }

    #[tokio::test]
    async fn test_downgrade_from_unknown_newer_version_is_error() {
        let pool = init_memory_database_unmigrated().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let future = latest_version() + 1;
        sqlx::query("INSERT INTO schema_version (version, name) VALUES (?, 'from_a_newer_build')")
            .bind(future)
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(downgrade_to(&pool, 1).await, Err(Error::Migration(_))));
        assert_eq!(current_version(&pool).await.unwrap(), future);
        assert!(table_exists(&pool, "tool_proposals").await);
    }

    #[tokio::test]
    async fn test_upgrade_past_latest_is_error() {
        let pool = init_memory_database_unmigrated().await.unwrap();
        assert!(upgrade_to(&pool, latest_version() + 1).await.is_err());
    }

    #[tokio::test]
    async fn test_user_rows_survive_preference_migration() {
        let pool = init_memory_database_unmigrated().await.unwrap();
        upgrade_to(&pool, 5).await.unwrap();

        sqlx::query(
            "INSERT INTO users (id, email, display_name, password_hash, created_at, updated_at) \
             VALUES ('u1', 'a@b.c', 'A', 'x', 'now', 'now')",
        )
        .execute(&pool)
        .await
        .unwrap();

        run_migrations(&pool).await.unwrap();

        let (household, timezone): (i64, String) =
            sqlx::query_as("SELECT household_size, timezone FROM users WHERE id = 'u1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(household, 2);
        assert_eq!(timezone, "UTC");
    }
}
