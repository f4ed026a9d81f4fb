//! Key/value settings persistence with typed accessors

use fieldnote_common::Result;
use sqlx::SqlitePool;

pub const KEY_AUTO_LOCK_MINUTES: &str = "auto_lock_minutes";
pub const KEY_PERSIST_UNLOCKED_SESSION: &str = "persist_unlocked_session";
pub const KEY_LAST_COMPANIES_REFRESH: &str = "last_companies_refresh";

/// Default idle minutes before auto-lock
pub const DEFAULT_AUTO_LOCK_MINUTES: i64 = 15;

/// Read a raw setting value
pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.0))
}

/// Upsert a setting value
pub async fn set(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Idle minutes before auto-lock; 0 disables
///
/// Unparseable stored values fall back to the default rather than error:
/// a corrupted setting must not brick the lock timer.
pub async fn auto_lock_minutes(pool: &SqlitePool) -> Result<i64> {
    Ok(get(pool, KEY_AUTO_LOCK_MINUTES)
        .await?
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_AUTO_LOCK_MINUTES))
}

pub async fn set_auto_lock_minutes(pool: &SqlitePool, minutes: i64) -> Result<()> {
    set(pool, KEY_AUTO_LOCK_MINUTES, &minutes.to_string()).await
}

/// Whether session snapshots may embed the (re-encrypted) token cache
///
/// Off by default; see the session manager for the trade-off.
pub async fn persist_unlocked_session(pool: &SqlitePool) -> Result<bool> {
    Ok(get(pool, KEY_PERSIST_UNLOCKED_SESSION)
        .await?
        .map(|v| v == "true")
        .unwrap_or(false))
}

pub async fn set_persist_unlocked_session(pool: &SqlitePool, enabled: bool) -> Result<()> {
    set(pool, KEY_PERSIST_UNLOCKED_SESSION, if enabled { "true" } else { "false" }).await
}

/// RFC 3339 timestamp of the last successful directory refresh
pub async fn last_companies_refresh(pool: &SqlitePool) -> Result<Option<String>> {
    get(pool, KEY_LAST_COMPANIES_REFRESH).await
}

pub async fn set_last_companies_refresh(pool: &SqlitePool, timestamp: &str) -> Result<()> {
    set(pool, KEY_LAST_COMPANIES_REFRESH, timestamp).await
}
