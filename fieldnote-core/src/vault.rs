//! Credential vault
//!
//! Persists the password hash, salt, and third-party API tokens encrypted
//! under a key derived from the user password. Setup is one-time; a
//! "reset" must go through the explicit [`CredentialVault::reset`] path.
//!
//! Unlock is all-or-nothing: if any single stored token fails to decrypt,
//! the whole unlock is treated as a wrong password even when the hash check
//! passed, which keeps corrupted partial state from half-opening the vault.

use sqlx::SqlitePool;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

use crate::crypto::{self, CryptoError, DerivedKey};
use crate::store::credentials;

/// Well-known token name: source-control API token
pub const TOKEN_REPO: &str = "repo_token";
/// Well-known token name: AI provider API key
pub const TOKEN_AI: &str = "ai_api_key";

/// Decrypted token map handed to the session manager on unlock
pub type TokenSet = BTreeMap<String, String>;

/// Vault operation failures
#[derive(Debug, Error)]
pub enum VaultError {
    /// `setup` called while a credentials record already exists
    #[error("vault already initialized")]
    AlreadyInitialized,

    /// Operation requires a credentials record and none exists
    #[error("vault not initialized")]
    NotInitialized,

    /// Wrong password; covers both hash mismatch and any token
    /// decryption failure
    #[error("wrong password")]
    WrongPassword,

    /// Cipher failure outside the wrong-password path (encryption, bad salt)
    #[error("crypto error: {0}")]
    Crypto(CryptoError),

    #[error("storage error: {0}")]
    Storage(#[from] fieldnote_common::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Password-protected store of encrypted third-party credentials
#[derive(Clone)]
pub struct CredentialVault {
    pool: SqlitePool,
}

impl CredentialVault {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// True iff a credentials record is persisted (drives first-run setup)
    pub async fn exists(&self) -> Result<bool, VaultError> {
        Ok(credentials::exists(&self.pool).await?)
    }

    /// User name of the installed record, if any
    pub async fn user_name(&self) -> Result<Option<String>, VaultError> {
        Ok(credentials::get(&self.pool).await?.map(|r| r.user_name))
    }

    /// One-time vault creation
    ///
    /// Generates a fresh salt, hashes the password, encrypts every provided
    /// token, and persists the record. Fails if a record already exists.
    pub async fn setup(
        &self,
        user_name: &str,
        password: &str,
        tokens: TokenSet,
    ) -> Result<(), VaultError> {
        if credentials::exists(&self.pool).await? {
            return Err(VaultError::AlreadyInitialized);
        }

        let salt = crypto::generate_salt();
        let password_hash = hash_password_blocking(password, &salt).await?;
        let key = derive_key_blocking(password, &salt).await?;

        let mut encrypted = BTreeMap::new();
        for (name, value) in &tokens {
            let ciphertext = crypto::encrypt(value, &key).map_err(VaultError::Crypto)?;
            encrypted.insert(name.clone(), ciphertext);
        }

        credentials::insert(&self.pool, user_name, &password_hash, &salt, &encrypted).await?;
        info!("Vault initialized for user {user_name}");
        Ok(())
    }

    /// Check a password against the stored hash
    pub async fn verify(&self, password: &str) -> Result<bool, VaultError> {
        let record = credentials::get(&self.pool)
            .await?
            .ok_or(VaultError::NotInitialized)?;

        verify_password_blocking(password, &record.salt, &record.password_hash).await
    }

    /// Verify the password and decrypt every stored token
    pub async fn unlock(&self, password: &str) -> Result<TokenSet, VaultError> {
        let record = credentials::get(&self.pool)
            .await?
            .ok_or(VaultError::NotInitialized)?;

        if !verify_password_blocking(password, &record.salt, &record.password_hash).await? {
            return Err(VaultError::WrongPassword);
        }

        let key = derive_key_blocking(password, &record.salt).await?;

        let mut tokens = TokenSet::new();
        for (name, ciphertext) in &record.encrypted_tokens {
            // Any single failure invalidates the whole unlock
            let value =
                crypto::decrypt(ciphertext, &key).map_err(|_| VaultError::WrongPassword)?;
            tokens.insert(name.clone(), value);
        }

        Ok(tokens)
    }

    /// Change the vault password, re-encrypting every token under a new salt
    ///
    /// Returns `Ok(false)` when the old password does not verify. The
    /// persisted record is replaced in a single atomic statement: either the
    /// fully re-encrypted record lands or the old one remains.
    pub async fn change_password(&self, old: &str, new: &str) -> Result<bool, VaultError> {
        let tokens = match self.unlock(old).await {
            Ok(tokens) => tokens,
            Err(VaultError::WrongPassword) => return Ok(false),
            Err(e) => return Err(e),
        };

        let new_salt = crypto::generate_salt();
        let new_hash = hash_password_blocking(new, &new_salt).await?;
        let new_key = derive_key_blocking(new, &new_salt).await?;

        let mut encrypted = BTreeMap::new();
        for (name, value) in &tokens {
            let ciphertext = crypto::encrypt(value, &new_key).map_err(VaultError::Crypto)?;
            encrypted.insert(name.clone(), ciphertext);
        }

        credentials::replace_secrets(&self.pool, &new_hash, &new_salt, &encrypted).await?;
        info!("Vault password changed; {} token(s) re-encrypted", encrypted.len());
        Ok(true)
    }

    /// Re-encrypt a single token under the current salt
    ///
    /// Requires the current password (held in memory by an unlocked
    /// session); other tokens and the salt are left untouched.
    pub async fn rotate_token(
        &self,
        password: &str,
        name: &str,
        value: &str,
    ) -> Result<(), VaultError> {
        let record = credentials::get(&self.pool)
            .await?
            .ok_or(VaultError::NotInitialized)?;

        if !verify_password_blocking(password, &record.salt, &record.password_hash).await? {
            return Err(VaultError::WrongPassword);
        }

        let key = derive_key_blocking(password, &record.salt).await?;
        let ciphertext = crypto::encrypt(value, &key).map_err(VaultError::Crypto)?;

        let mut encrypted = record.encrypted_tokens;
        encrypted.insert(name.to_string(), ciphertext);
        credentials::update_tokens(&self.pool, &encrypted).await?;
        info!("Vault token '{name}' rotated");
        Ok(())
    }

    /// Delete the credentials record, the only path that makes a second
    /// `setup` possible
    pub async fn reset(&self) -> Result<(), VaultError> {
        credentials::delete(&self.pool).await?;
        info!("Vault reset: credentials record deleted");
        Ok(())
    }
}

// PBKDF2 at production round counts takes tens of milliseconds; run it off
// the async reactor.

async fn derive_key_blocking(password: &str, salt: &str) -> Result<DerivedKey, VaultError> {
    let password = password.to_string();
    let salt = salt.to_string();
    tokio::task::spawn_blocking(move || crypto::derive_key(&password, &salt))
        .await
        .map_err(|e| VaultError::Internal(format!("derivation task failed: {e}")))?
        .map_err(VaultError::Crypto)
}

async fn hash_password_blocking(password: &str, salt: &str) -> Result<String, VaultError> {
    let password = password.to_string();
    let salt = salt.to_string();
    tokio::task::spawn_blocking(move || crypto::hash_password(&password, &salt))
        .await
        .map_err(|e| VaultError::Internal(format!("derivation task failed: {e}")))?
        .map_err(VaultError::Crypto)
}

async fn verify_password_blocking(
    password: &str,
    salt: &str,
    expected: &str,
) -> Result<bool, VaultError> {
    let password = password.to_string();
    let salt = salt.to_string();
    let expected = expected.to_string();
    tokio::task::spawn_blocking(move || crypto::verify_password(&password, &salt, &expected))
        .await
        .map_err(|e| VaultError::Internal(format!("derivation task failed: {e}")))?
        .map_err(VaultError::Crypto)
}
