//! Database schema migrations
//!
//! Versioned, idempotent schema upgrades tracked in the `schema_version`
//! table. Existing migrations are never modified; every schema change gets a
//! new version.
//!
//! - v1: single-active-account index on the original `accounts` table
//! - v2: `is_default` column plus its single-default index

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
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

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("Migration v2 completed");
    }

    Ok(())
}

/// Migration v1: enforce at most one active account
///
/// Databases written before the index existed may hold several active rows;
/// all but the newest are demoted first so the index can be created.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    let demoted = sqlx::query(
        r#"
        UPDATE accounts SET is_active = 0
        WHERE is_active = 1
          AND id <> (SELECT MAX(id) FROM accounts WHERE is_active = 1)
        "#,
    )
    .execute(pool)
    .await?
    .rows_affected();

    if demoted > 0 {
        warn!("Migration v1: demoted {} extra active account(s)", demoted);
    }

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_single_active \
         ON accounts(is_active) WHERE is_active = 1",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Migration v2: add the `is_default` flag
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    let has_column: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('accounts') WHERE name = 'is_default'",
    )
    .fetch_one(pool)
    .await?;

    if has_column == 0 {
        sqlx::query("ALTER TABLE accounts ADD COLUMN is_default INTEGER NOT NULL DEFAULT 0")
            .execute(pool)
            .await?;
        info!("Migration v2: added is_default column to accounts");
    } else {
        info!("Migration v2: is_default column already exists - skipping");
    }

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_single_default \
         ON accounts(is_default) WHERE is_default = 1",
    )
    .execute(pool)
    .await?;

    Ok(())
}
