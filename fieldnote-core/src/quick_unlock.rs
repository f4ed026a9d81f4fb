//! Biometric quick-unlock
//!
//! A platform authenticator (fingerprint/face/PIN) gates a shortcut back
//! into an already-established session. This is a convenience gate layered
//! on top of the password-derived encryption, never a replacement for it:
//! a successful assertion triggers the session manager's snapshot-restore
//! path, and whether secrets come back depends entirely on what that
//! snapshot legitimately carries.
//!
//! The authenticator itself sits behind [`PlatformAuthenticator`] so the
//! manager stays testable and portable across environments that expose
//! platform credentials differently.

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};

use crate::crypto;
use crate::session::{SessionError, SessionManager};
use crate::store::webauthn;

/// Authenticator-side failures
#[derive(Debug, Error)]
pub enum AuthenticatorError {
    /// No platform authenticator in this environment
    #[error("platform authenticator unavailable")]
    Unavailable,

    /// The user dismissed or failed the platform prompt
    #[error("authenticator request was not completed")]
    NotCompleted,

    #[error("authenticator error: {0}")]
    Other(String),
}

/// A credential newly created by the authenticator
#[derive(Debug, Clone)]
pub struct CreatedCredential {
    /// Public credential identifier (base64)
    pub credential_id: String,
    /// Public key (base64)
    pub public_key: String,
}

/// A successful assertion
#[derive(Debug, Clone)]
pub struct Assertion {
    /// Which stored credential satisfied the challenge
    pub credential_id: String,
    /// Signature counter reported by the authenticator
    pub counter: i64,
}

/// Seam to the platform's credential facility
pub trait PlatformAuthenticator: Send + Sync {
    /// Presence check; implementations must not error
    fn is_available(&self) -> bool;

    /// Create a platform credential bound to the installation's stable
    /// user identifier
    fn create_credential(
        &self,
        challenge: &[u8],
        user_id: &str,
    ) -> Result<CreatedCredential, AuthenticatorError>;

    /// Request an assertion against any of the allowed credential ids
    fn get_assertion(
        &self,
        challenge: &[u8],
        allowed_credential_ids: &[String],
    ) -> Result<Assertion, AuthenticatorError>;
}

/// Quick-unlock failures
#[derive(Debug, Error)]
pub enum QuickUnlockError {
    #[error(transparent)]
    Authenticator(#[from] AuthenticatorError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("storage error: {0}")]
    Storage(#[from] fieldnote_common::Error),
}

/// Manages platform credentials and the quick-unlock flow
pub struct QuickUnlock<A: PlatformAuthenticator> {
    pool: SqlitePool,
    authenticator: A,
}

impl<A: PlatformAuthenticator> QuickUnlock<A> {
    pub fn new(pool: SqlitePool, authenticator: A) -> Self {
        Self {
            pool,
            authenticator,
        }
    }

    /// Whether a platform authenticator is present
    pub fn is_available(&self) -> bool {
        self.authenticator.is_available()
    }

    /// Access the underlying authenticator
    pub fn authenticator(&self) -> &A {
        &self.authenticator
    }

    /// Register a new platform credential for this installation
    ///
    /// One device may hold multiple credentials (several browser profiles
    /// registering independently). Returns `Ok(false)` when no
    /// authenticator is available.
    pub async fn register(&self, user_id: &str) -> Result<bool, QuickUnlockError> {
        if !self.authenticator.is_available() {
            return Ok(false);
        }

        let challenge = crypto::generate_challenge();
        let created = self.authenticator.create_credential(&challenge, user_id)?;

        webauthn::insert(&self.pool, &created.credential_id, &created.public_key).await?;
        info!("Registered quick-unlock credential {}", created.credential_id);
        Ok(true)
    }

    /// Attempt quick-unlock: assert against all stored credentials, then
    /// restore the session snapshot
    ///
    /// A fresh random challenge is generated per attempt. Returns
    /// `Ok(false)` when nothing is registered, the assertion names an
    /// unknown credential, or no valid snapshot exists to restore; the
    /// caller falls back to the password prompt.
    pub async fn authenticate(
        &self,
        session: &SessionManager,
    ) -> Result<bool, QuickUnlockError> {
        let stored = webauthn::all(&self.pool).await?;
        if stored.is_empty() {
            return Ok(false);
        }

        let allowed: Vec<String> = stored.iter().map(|c| c.credential_id.clone()).collect();
        let challenge = crypto::generate_challenge();

        let assertion = self.authenticator.get_assertion(&challenge, &allowed)?;

        if !allowed.contains(&assertion.credential_id) {
            warn!("Assertion named an unregistered credential; rejecting");
            return Ok(false);
        }

        // Counter is informational bookkeeping: no server-side signature
        // verification exists in this design
        webauthn::update_counter(&self.pool, &assertion.credential_id, assertion.counter).await?;

        let restored = session.restore_from_snapshot().await?;
        if restored {
            info!("Quick-unlock succeeded via {}", assertion.credential_id);
        } else {
            warn!("Quick-unlock assertion OK but no restorable snapshot");
        }
        Ok(restored)
    }

    /// Remove a registered credential
    pub async fn revoke(&self, credential_id: &str) -> Result<(), QuickUnlockError> {
        webauthn::delete(&self.pool, credential_id).await?;
        info!("Revoked quick-unlock credential {credential_id}");
        Ok(())
    }

    /// List registered credentials
    pub async fn list(&self) -> Result<Vec<webauthn::WebAuthnCredential>, QuickUnlockError> {
        Ok(webauthn::all(&self.pool).await?)
    }
}
