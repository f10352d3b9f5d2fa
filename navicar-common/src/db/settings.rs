//! Settings database access
//!
//! Read/write settings from the settings table (key-value store). Holds the
//! runtime playback settings, the legacy single-account credential keys and
//! the last-played track.

use crate::{Error, Result};
use sqlx::{Executor, Sqlite, SqlitePool};
use std::str::FromStr;

/// Generic setting getter
///
/// Returns None if the key doesn't exist or holds NULL.
pub async fn get_setting<T: FromStr>(db: &SqlitePool, key: &str) -> Result<Option<T>> {
    match get_raw(db, key).await? {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Setting value, or `default` when missing
pub async fn get_setting_or<T: FromStr>(db: &SqlitePool, key: &str, default: T) -> Result<T> {
    Ok(get_setting(db, key).await?.unwrap_or(default))
}

/// Raw string value of a setting
pub async fn get_raw<'e, E>(db: E, key: &str) -> Result<Option<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(db)
            .await?;

    Ok(value.flatten())
}

/// Generic setting setter
///
/// Inserts or updates setting in database.
pub async fn set_setting<'e, E, T>(db: E, key: &str, value: T) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
    T: ToString,
{
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}

/// Remove a setting; missing keys are not an error
pub async fn delete_setting<'e, E>(db: E, key: &str) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(key)
        .execute(db)
        .await?;

    Ok(())
}
