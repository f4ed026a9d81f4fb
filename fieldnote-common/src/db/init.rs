//! Client database initialization
//!
//! Opens (creating if necessary) the local SQLite store and brings the
//! schema up idempotently. All tables use `CREATE TABLE IF NOT EXISTS`, so
//! init is safe to run on every startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize the database connection pool and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_pragmas(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

async fn configure_pragmas(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    // WAL allows concurrent readers while a sync pass writes
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_user_credentials_table(pool).await?;
    create_auth_sessions_table(pool).await?;
    create_webauthn_credentials_table(pool).await?;
    create_voice_notes_table(pool).await?;
    create_companies_table(pool).await?;
    create_settings_table(pool).await?;
    Ok(())
}

/// Single-row vault record: password hash, salt, encrypted token map
async fn create_user_credentials_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_credentials (
            id TEXT PRIMARY KEY,
            user_name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            salt TEXT NOT NULL,
            encrypted_tokens TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Session snapshot for reload survival and biometric re-entry
///
/// `snapshot_key` and `encrypted_cache` are populated only in the opt-in
/// persisted-secrets mode; the default identity-only snapshot leaves both
/// NULL.
async fn create_auth_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS auth_sessions (
            id TEXT PRIMARY KEY,
            user_name TEXT NOT NULL,
            session_token TEXT NOT NULL,
            last_activity INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            snapshot_key TEXT,
            encrypted_cache TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_webauthn_credentials_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS webauthn_credentials (
            id TEXT PRIMARY KEY,
            credential_id TEXT NOT NULL UNIQUE,
            public_key TEXT NOT NULL,
            counter INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_webauthn_credential_id
         ON webauthn_credentials(credential_id)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_voice_notes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS voice_notes (
            id TEXT PRIMARY KEY,
            audio_data BLOB NOT NULL,
            audio_mime TEXT NOT NULL DEFAULT 'audio/mpeg',
            recorded_at TEXT NOT NULL,
            transcription TEXT,
            processed_text TEXT,
            conversation_date TEXT,
            selected_company_id TEXT,
            selected_contact_id TEXT,
            status TEXT NOT NULL,
            error_message TEXT,
            issue_url TEXT,
            issue_number INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_voice_notes_status ON voice_notes(status)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_voice_notes_recorded_at ON voice_notes(recorded_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_voice_notes_company
         ON voice_notes(selected_company_id)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Cached company directory; replaced wholesale on each refresh
async fn create_companies_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS companies (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            short_name TEXT NOT NULL,
            aliases TEXT NOT NULL DEFAULT '[]',
            location TEXT NOT NULL DEFAULT '',
            partnership_type TEXT NOT NULL DEFAULT '',
            study_programs TEXT NOT NULL DEFAULT '[]',
            contacts TEXT NOT NULL DEFAULT '[]',
            notes TEXT NOT NULL DEFAULT '',
            last_contact_date TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_companies_name ON companies(name)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_companies_short_name ON companies(short_name)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
