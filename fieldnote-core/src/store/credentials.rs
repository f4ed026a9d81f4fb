//! Vault credential record persistence
//!
//! At most one record exists per installation. The single-row invariant is
//! enforced here with a fixed primary key; the vault layer adds the
//! one-time-setup rule on top.

use chrono::{DateTime, Utc};
use fieldnote_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

/// Fixed id of the single credentials row
const RECORD_ID: &str = "local";

/// The persisted vault record
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub id: String,
    pub user_name: String,
    pub password_hash: String,
    pub salt: String,
    /// token name → base64(nonce || ciphertext)
    pub encrypted_tokens: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// True iff a credentials record is persisted
pub async fn exists(pool: &SqlitePool) -> Result<bool> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_credentials")
        .fetch_one(pool)
        .await?;
    Ok(row.0 > 0)
}

/// Load the record, if any
pub async fn get(pool: &SqlitePool) -> Result<Option<CredentialRecord>> {
    let row = sqlx::query("SELECT * FROM user_credentials WHERE id = ?")
        .bind(RECORD_ID)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let encrypted_tokens: String = row.get("encrypted_tokens");
    let encrypted_tokens = serde_json::from_str(&encrypted_tokens)
        .map_err(|e| Error::Internal(format!("Failed to deserialize token map: {e}")))?;

    let created_at: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| Error::Internal(format!("Failed to parse created_at: {e}")))?
        .with_timezone(&Utc);

    let updated_at: String = row.get("updated_at");
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| Error::Internal(format!("Failed to parse updated_at: {e}")))?
        .with_timezone(&Utc);

    Ok(Some(CredentialRecord {
        id: row.get("id"),
        user_name: row.get("user_name"),
        password_hash: row.get("password_hash"),
        salt: row.get("salt"),
        encrypted_tokens,
        created_at,
        updated_at,
    }))
}

/// Insert the initial record
pub async fn insert(
    pool: &SqlitePool,
    user_name: &str,
    password_hash: &str,
    salt: &str,
    encrypted_tokens: &BTreeMap<String, String>,
) -> Result<()> {
    let tokens_json = serde_json::to_string(encrypted_tokens)
        .map_err(|e| Error::Internal(format!("Failed to serialize token map: {e}")))?;
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO user_credentials (
            id, user_name, password_hash, salt, encrypted_tokens, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(RECORD_ID)
    .bind(user_name)
    .bind(password_hash)
    .bind(salt)
    .bind(&tokens_json)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Replace hash, salt, and the full token map in one statement
///
/// Used by password change: the single UPDATE is atomic, so either the
/// whole re-encrypted record lands or the old one remains.
pub async fn replace_secrets(
    pool: &SqlitePool,
    password_hash: &str,
    salt: &str,
    encrypted_tokens: &BTreeMap<String, String>,
) -> Result<()> {
    let tokens_json = serde_json::to_string(encrypted_tokens)
        .map_err(|e| Error::Internal(format!("Failed to serialize token map: {e}")))?;

    let result = sqlx::query(
        r#"
        UPDATE user_credentials
        SET password_hash = ?, salt = ?, encrypted_tokens = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(password_hash)
    .bind(salt)
    .bind(&tokens_json)
    .bind(Utc::now().to_rfc3339())
    .bind(RECORD_ID)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound("user credentials".to_string()));
    }
    Ok(())
}

/// Replace only the token map, leaving hash and salt untouched
pub async fn update_tokens(
    pool: &SqlitePool,
    encrypted_tokens: &BTreeMap<String, String>,
) -> Result<()> {
    let tokens_json = serde_json::to_string(encrypted_tokens)
        .map_err(|e| Error::Internal(format!("Failed to serialize token map: {e}")))?;

    let result =
        sqlx::query("UPDATE user_credentials SET encrypted_tokens = ?, updated_at = ? WHERE id = ?")
            .bind(&tokens_json)
            .bind(Utc::now().to_rfc3339())
            .bind(RECORD_ID)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound("user credentials".to_string()));
    }
    Ok(())
}

/// Delete the record (explicit reset path)
pub async fn delete(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DELETE FROM user_credentials")
        .execute(pool)
        .await?;
    Ok(())
}
