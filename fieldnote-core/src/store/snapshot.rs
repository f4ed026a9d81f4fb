//! Session snapshot persistence
//!
//! At most one snapshot row exists. The session manager decides what goes
//! into it (identity only, or identity plus an encrypted token cache) and
//! what a loaded row means; this module only moves rows.

use chrono::{DateTime, Utc};
use fieldnote_common::{Error, Result};
use sqlx::{Row, SqlitePool};

const ROW_ID: &str = "current";

/// Persisted session snapshot
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub user_name: String,
    pub session_token: String,
    /// Unix milliseconds of the last user activity
    pub last_activity: i64,
    pub created_at: DateTime<Utc>,
    /// Device-local key for `encrypted_cache` (base64, 32 bytes); present
    /// only in the opt-in persisted-secrets mode
    pub snapshot_key: Option<String>,
    /// Token cache encrypted under `snapshot_key`
    pub encrypted_cache: Option<String>,
}

/// Upsert the snapshot row
pub async fn save(pool: &SqlitePool, snapshot: &SessionSnapshot) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO auth_sessions (
            id, user_name, session_token, last_activity, created_at,
            snapshot_key, encrypted_cache
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            user_name = excluded.user_name,
            session_token = excluded.session_token,
            last_activity = excluded.last_activity,
            created_at = excluded.created_at,
            snapshot_key = excluded.snapshot_key,
            encrypted_cache = excluded.encrypted_cache
        "#,
    )
    .bind(ROW_ID)
    .bind(&snapshot.user_name)
    .bind(&snapshot.session_token)
    .bind(snapshot.last_activity)
    .bind(snapshot.created_at.to_rfc3339())
    .bind(&snapshot.snapshot_key)
    .bind(&snapshot.encrypted_cache)
    .execute(pool)
    .await?;
    Ok(())
}

/// Load the snapshot row, if any
pub async fn load(pool: &SqlitePool) -> Result<Option<SessionSnapshot>> {
    let row = sqlx::query("SELECT * FROM auth_sessions WHERE id = ?")
        .bind(ROW_ID)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let created_at: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| Error::Internal(format!("Failed to parse created_at: {e}")))?
        .with_timezone(&Utc);

    Ok(Some(SessionSnapshot {
        user_name: row.get("user_name"),
        session_token: row.get("session_token"),
        last_activity: row.get("last_activity"),
        created_at,
        snapshot_key: row.get("snapshot_key"),
        encrypted_cache: row.get("encrypted_cache"),
    }))
}

/// Delete the snapshot row (logout, failed restore)
pub async fn delete(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DELETE FROM auth_sessions")
        .execute(pool)
        .await?;
    Ok(())
}
