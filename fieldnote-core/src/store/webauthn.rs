//! Platform authenticator credential persistence

use chrono::{DateTime, Utc};
use fieldnote_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// A registered platform authenticator credential
#[derive(Debug, Clone)]
pub struct WebAuthnCredential {
    pub id: String,
    /// Authenticator's public credential identifier (base64)
    pub credential_id: String,
    /// Public key (base64); kept for bookkeeping, not server verification
    pub public_key: String,
    /// Anti-replay signature counter reported by the authenticator
    pub counter: i64,
    pub created_at: DateTime<Utc>,
}

/// Persist a newly created credential with counter 0
pub async fn insert(pool: &SqlitePool, credential_id: &str, public_key: &str) -> Result<String> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO webauthn_credentials (id, credential_id, public_key, counter, created_at)
        VALUES (?, ?, ?, 0, ?)
        "#,
    )
    .bind(&id)
    .bind(credential_id)
    .bind(public_key)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(id)
}

/// All registered credentials, oldest first
pub async fn all(pool: &SqlitePool) -> Result<Vec<WebAuthnCredential>> {
    let rows = sqlx::query("SELECT * FROM webauthn_credentials ORDER BY created_at ASC")
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(credential_from_row).collect()
}

/// Update the signature counter after a successful assertion
pub async fn update_counter(pool: &SqlitePool, credential_id: &str, counter: i64) -> Result<()> {
    let result = sqlx::query("UPDATE webauthn_credentials SET counter = ? WHERE credential_id = ?")
        .bind(counter)
        .bind(credential_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!(
            "webauthn credential {credential_id}"
        )));
    }
    Ok(())
}

/// Remove a credential (revocation)
pub async fn delete(pool: &SqlitePool, credential_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM webauthn_credentials WHERE credential_id = ?")
        .bind(credential_id)
        .execute(pool)
        .await?;
    Ok(())
}

fn credential_from_row(row: sqlx::sqlite::SqliteRow) -> Result<WebAuthnCredential> {
    let created_at: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| Error::Internal(format!("Failed to parse created_at: {e}")))?
        .with_timezone(&Utc);

    Ok(WebAuthnCredential {
        id: row.get("id"),
        credential_id: row.get("credential_id"),
        public_key: row.get("public_key"),
        counter: row.get("counter"),
        created_at,
    })
}
