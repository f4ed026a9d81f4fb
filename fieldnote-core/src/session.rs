//! Session manager
//!
//! In-memory authentication state plus an optional persisted snapshot for
//! reload survival and biometric re-entry. The state machine:
//!
//! ```text
//! LoggedOut → Authenticating → Authenticated ─┬→ LoggedOut  (explicit logout)
//!                                             ├→ Locked     (auto-lock timeout)
//!                                             └→ LoggedOut  (restore failure)
//! ```
//!
//! `Locked` requires full password re-entry (or biometric quick-unlock into
//! the snapshot-restore path) to return to `Authenticated`.
//!
//! `Authenticated` carries a `secrets_locked` sub-state: a restore that
//! recovered identity but not secrets leaves the session authenticated with
//! token reads failing fast, rather than silently operating with empty
//! tokens.
//!
//! The decrypted-token cache is mutated only here (login, logout, unlock,
//! rotate); every other component reads it through [`SessionManager::token`].
//!
//! ## Snapshot policy
//!
//! By default the persisted snapshot carries identity only: no secrets at
//! rest beyond the vault's own ciphertexts. When the
//! `persist_unlocked_session` setting is on, the snapshot additionally
//! embeds the token cache encrypted under a random device-local key stored
//! in the same row. That mode survives reloads without password re-entry
//! but co-locates key and ciphertext, so it is off by default.

use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use zeroize::Zeroizing;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use fieldnote_common::{time, AppEvent, EventBus};

use crate::crypto::{self, DerivedKey};
use crate::store::{settings, snapshot};
use crate::vault::{CredentialVault, TokenSet, VaultError};

/// Maximum age of a persisted snapshot before restore refuses it
const MAX_SNAPSHOT_AGE_DAYS: i64 = 7;

/// Minimum interval between snapshot re-persists driven by activity ticks
const ACTIVITY_PERSIST_THROTTLE_MS: i64 = 60_000;

/// Authentication state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    Authenticating,
    /// Logged in; `secrets_locked` is true when identity was restored
    /// without the decrypted token cache
    Authenticated { secrets_locked: bool },
    /// Auto-locked after idle timeout; password or quick-unlock required
    Locked,
}

/// Session operation failures
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not authenticated")]
    NotAuthenticated,

    /// Identity restored but secrets are locked; the user must re-enter
    /// the password before token-requiring operations can proceed
    #[error("secrets locked, password re-entry required")]
    SecretsLocked,

    #[error("no token named '{0}' in the vault")]
    MissingToken(String),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("storage error: {0}")]
    Storage(#[from] fieldnote_common::Error),
}

struct SessionInner {
    state: SessionState,
    user_name: Option<String>,
    session_token: Option<String>,
    last_activity_ms: i64,
    last_persisted_ms: i64,
    tokens: TokenSet,
    /// Current password, held while unlocked so single-token rotation can
    /// re-derive the vault key without prompting
    password: Option<Zeroizing<String>>,
}

impl SessionInner {
    fn logged_out() -> Self {
        Self {
            state: SessionState::LoggedOut,
            user_name: None,
            session_token: None,
            last_activity_ms: 0,
            last_persisted_ms: 0,
            tokens: TokenSet::new(),
            password: None,
        }
    }

    fn clear_secrets(&mut self) {
        self.tokens.clear();
        self.password = None;
    }
}

/// Owns authentication state and the decrypted-token cache
pub struct SessionManager {
    pool: SqlitePool,
    vault: CredentialVault,
    events: EventBus,
    inner: RwLock<SessionInner>,
}

impl SessionManager {
    pub fn new(pool: SqlitePool, vault: CredentialVault, events: EventBus) -> Self {
        Self {
            pool,
            vault,
            events,
            inner: RwLock::new(SessionInner::logged_out()),
        }
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state
    }

    pub async fn is_authenticated(&self) -> bool {
        matches!(
            self.inner.read().await.state,
            SessionState::Authenticated { .. }
        )
    }

    pub async fn user_name(&self) -> Option<String> {
        self.inner.read().await.user_name.clone()
    }

    pub async fn session_token(&self) -> Option<String> {
        self.inner.read().await.session_token.clone()
    }

    /// Log in with the vault password
    ///
    /// Returns `Ok(false)` on wrong password, leaving the state unchanged
    /// at `LoggedOut` (or `Locked` if called from there).
    pub async fn login(&self, password: &str) -> Result<bool, SessionError> {
        let previous = {
            let mut inner = self.inner.write().await;
            let previous = inner.state;
            inner.state = SessionState::Authenticating;
            previous
        };

        let tokens = match self.vault.unlock(password).await {
            Ok(tokens) => tokens,
            Err(VaultError::WrongPassword) => {
                self.inner.write().await.state = previous;
                return Ok(false);
            }
            Err(e) => {
                self.inner.write().await.state = previous;
                return Err(e.into());
            }
        };

        let user_name = self
            .vault
            .user_name()
            .await?
            .unwrap_or_else(|| "unknown".to_string());

        {
            let mut inner = self.inner.write().await;
            inner.state = SessionState::Authenticated {
                secrets_locked: false,
            };
            inner.user_name = Some(user_name.clone());
            inner.session_token = Some(crypto::generate_session_token());
            inner.last_activity_ms = time::now_unix_ms();
            inner.tokens = tokens;
            inner.password = Some(Zeroizing::new(password.to_string()));
        }

        self.persist_snapshot(true).await?;

        info!("Session authenticated for {user_name}");
        self.events.emit_lossy(AppEvent::SessionAuthenticated {
            user_name,
            timestamp: time::now(),
        });
        Ok(true)
    }

    /// End the session and remove the persisted snapshot
    ///
    /// Safe to call repeatedly; a second call is a no-op.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let was_active = {
            let mut inner = self.inner.write().await;
            let was_active = inner.state != SessionState::LoggedOut;
            *inner = SessionInner::logged_out();
            was_active
        };

        snapshot::delete(&self.pool).await?;

        if was_active {
            info!("Session logged out");
            self.events.emit_lossy(AppEvent::SessionLoggedOut {
                timestamp: time::now(),
            });
        }
        Ok(())
    }

    /// Record meaningful user activity at the current instant
    ///
    /// Callers invoke this at a throttled granularity (navigation,
    /// pointer/key activity); the snapshot re-persist is additionally
    /// throttled here so a busy pointer does not hammer storage.
    pub async fn touch_activity(&self) -> Result<(), SessionError> {
        self.touch_activity_at(time::now_unix_ms()).await
    }

    /// Record user activity with the event's own timestamp
    ///
    /// Hosts that batch input events report the latest event time rather
    /// than the processing time.
    pub async fn touch_activity_at(&self, unix_ms: i64) -> Result<(), SessionError> {
        let should_persist = {
            let mut inner = self.inner.write().await;
            if !matches!(inner.state, SessionState::Authenticated { .. }) {
                return Ok(());
            }
            inner.last_activity_ms = unix_ms;
            unix_ms - inner.last_persisted_ms >= ACTIVITY_PERSIST_THROTTLE_MS
        };

        if should_persist {
            self.persist_snapshot(false).await?;
        }
        Ok(())
    }

    /// Lock the session if the idle timeout has elapsed
    ///
    /// `timeout_minutes == 0` disables auto-lock. This does not
    /// self-schedule; drive it from a recurring timer and on
    /// visibility-regain.
    pub async fn check_auto_lock(&self, timeout_minutes: i64) -> Result<(), SessionError> {
        if timeout_minutes == 0 {
            return Ok(());
        }

        let idle_minutes = {
            let mut inner = self.inner.write().await;
            if !matches!(inner.state, SessionState::Authenticated { .. }) {
                return Ok(());
            }
            let idle = time::minutes_since(inner.last_activity_ms);
            if idle < timeout_minutes {
                return Ok(());
            }
            inner.state = SessionState::Locked;
            inner.clear_secrets();
            idle
        };

        warn!("Session auto-locked after {idle_minutes} idle minutes");
        self.events.emit_lossy(AppEvent::SessionLocked {
            idle_minutes,
            timestamp: time::now(),
        });
        Ok(())
    }

    /// Restore a session from the persisted snapshot (page reload, biometric
    /// quick-unlock)
    ///
    /// Returns `Ok(false)` (and destroys the snapshot) when none exists,
    /// it is older than the maximum age, or an embedded token cache fails
    /// to decrypt. An identity-only snapshot restores into
    /// `Authenticated { secrets_locked: true }`.
    pub async fn restore_from_snapshot(&self) -> Result<bool, SessionError> {
        let Some(snap) = snapshot::load(&self.pool).await? else {
            return Ok(false);
        };

        let age_days = (time::now() - snap.created_at).num_days();
        if age_days >= MAX_SNAPSHOT_AGE_DAYS {
            warn!("Rejecting session snapshot aged {age_days} days");
            snapshot::delete(&self.pool).await?;
            return Ok(false);
        }

        let tokens = match decrypt_embedded_cache(&snap) {
            Ok(tokens) => tokens,
            Err(()) => {
                warn!("Session snapshot cache failed to decrypt; discarding");
                snapshot::delete(&self.pool).await?;
                return Ok(false);
            }
        };
        let secrets_locked = tokens.is_none();

        let user_name = snap.user_name.clone();
        {
            let mut inner = self.inner.write().await;
            inner.state = SessionState::Authenticated { secrets_locked };
            inner.user_name = Some(snap.user_name);
            inner.session_token = Some(snap.session_token);
            inner.last_activity_ms = time::now_unix_ms();
            inner.tokens = tokens.unwrap_or_default();
            inner.password = None;
        }

        info!("Session restored for {user_name} (secrets_locked: {secrets_locked})");
        self.events.emit_lossy(AppEvent::SessionRestored {
            user_name,
            secrets_locked,
            timestamp: time::now(),
        });
        Ok(true)
    }

    /// Re-enter the password to unlock secrets from `Locked` or
    /// `Authenticated { secrets_locked: true }`
    ///
    /// Returns `Ok(false)` on wrong password.
    pub async fn unlock_secrets(&self, password: &str) -> Result<bool, SessionError> {
        {
            let inner = self.inner.read().await;
            match inner.state {
                SessionState::Locked
                | SessionState::Authenticated {
                    secrets_locked: true,
                } => {}
                SessionState::Authenticated {
                    secrets_locked: false,
                } => return Ok(true),
                _ => return Err(SessionError::NotAuthenticated),
            }
        }

        let tokens = match self.vault.unlock(password).await {
            Ok(tokens) => tokens,
            Err(VaultError::WrongPassword) => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let user_name = {
            let mut inner = self.inner.write().await;
            inner.state = SessionState::Authenticated {
                secrets_locked: false,
            };
            inner.tokens = tokens;
            inner.password = Some(Zeroizing::new(password.to_string()));
            inner.last_activity_ms = time::now_unix_ms();
            if inner.session_token.is_none() {
                inner.session_token = Some(crypto::generate_session_token());
            }
            inner.user_name.clone().unwrap_or_else(|| "unknown".into())
        };

        self.persist_snapshot(true).await?;

        info!("Session secrets unlocked for {user_name}");
        self.events.emit_lossy(AppEvent::SessionAuthenticated {
            user_name,
            timestamp: time::now(),
        });
        Ok(true)
    }

    /// Read a decrypted token from the cache
    ///
    /// Fails fast with [`SessionError::SecretsLocked`] when identity was
    /// restored without secrets, so callers surface a password prompt
    /// instead of operating with empty credentials.
    pub async fn token(&self, name: &str) -> Result<String, SessionError> {
        let inner = self.inner.read().await;
        match inner.state {
            SessionState::Authenticated { secrets_locked } => {
                if secrets_locked {
                    return Err(SessionError::SecretsLocked);
                }
                inner
                    .tokens
                    .get(name)
                    .cloned()
                    .ok_or_else(|| SessionError::MissingToken(name.to_string()))
            }
            _ => Err(SessionError::NotAuthenticated),
        }
    }

    /// Rotate a single vault token, updating the in-memory cache
    ///
    /// Requires an unlocked session (the current password is held in
    /// memory).
    pub async fn rotate_token(&self, name: &str, value: &str) -> Result<(), SessionError> {
        let password = {
            let inner = self.inner.read().await;
            match inner.state {
                SessionState::Authenticated {
                    secrets_locked: false,
                } => {}
                SessionState::Authenticated {
                    secrets_locked: true,
                } => return Err(SessionError::SecretsLocked),
                _ => return Err(SessionError::NotAuthenticated),
            }
            inner
                .password
                .as_ref()
                .map(|p| p.as_str().to_string())
                .ok_or(SessionError::SecretsLocked)?
        };

        self.vault.rotate_token(&password, name, value).await?;

        self.inner
            .write()
            .await
            .tokens
            .insert(name.to_string(), value.to_string());

        self.persist_snapshot(false).await?;
        Ok(())
    }

    /// Change the vault password, keeping the unlocked session coherent
    pub async fn change_password(&self, old: &str, new: &str) -> Result<bool, SessionError> {
        if !self.vault.change_password(old, new).await? {
            return Ok(false);
        }

        let mut inner = self.inner.write().await;
        if matches!(
            inner.state,
            SessionState::Authenticated {
                secrets_locked: false
            }
        ) {
            inner.password = Some(Zeroizing::new(new.to_string()));
        }
        Ok(true)
    }

    /// Write the current session to the snapshot row
    ///
    /// `reset_created_at` restarts the 7-day validity window (login and
    /// explicit unlock do; activity ticks keep the original window).
    async fn persist_snapshot(&self, reset_created_at: bool) -> Result<(), SessionError> {
        let embed_secrets = settings::persist_unlocked_session(&self.pool).await?;

        let row = {
            let mut inner = self.inner.write().await;
            let (Some(user_name), Some(session_token)) =
                (inner.user_name.clone(), inner.session_token.clone())
            else {
                return Ok(());
            };

            let created_at = if reset_created_at {
                time::now()
            } else {
                match snapshot::load(&self.pool).await? {
                    Some(existing) => existing.created_at,
                    None => time::now(),
                }
            };

            let (snapshot_key, encrypted_cache) = if embed_secrets && !inner.tokens.is_empty() {
                match encrypt_cache_for_snapshot(&inner.tokens) {
                    Some(pair) => (Some(pair.0), Some(pair.1)),
                    None => (None, None),
                }
            } else {
                (None, None)
            };

            inner.last_persisted_ms = time::now_unix_ms();

            snapshot::SessionSnapshot {
                user_name,
                session_token,
                last_activity: inner.last_activity_ms,
                created_at,
                snapshot_key,
                encrypted_cache,
            }
        };

        snapshot::save(&self.pool, &row).await?;
        Ok(())
    }
}

/// Encrypt the token cache under a fresh device-local key
///
/// Returns `(key_b64, ciphertext)`. Only used in the opt-in
/// persisted-secrets mode.
fn encrypt_cache_for_snapshot(tokens: &TokenSet) -> Option<(String, String)> {
    let json = serde_json::to_string(tokens).ok()?;
    let key = DerivedKey::generate();
    let ciphertext = crypto::encrypt(&json, &key).ok()?;
    Some((BASE64.encode(key.as_bytes()), ciphertext))
}

/// Decrypt an embedded token cache, if the snapshot carries one
///
/// `Ok(None)` means identity-only snapshot; `Err(())` means the cache was
/// present but undecryptable (corrupt row) and the snapshot must be
/// discarded.
fn decrypt_embedded_cache(
    snap: &snapshot::SessionSnapshot,
) -> Result<Option<TokenSet>, ()> {
    let (Some(key_b64), Some(ciphertext)) = (&snap.snapshot_key, &snap.encrypted_cache) else {
        return Ok(None);
    };

    let key_bytes = BASE64.decode(key_b64).map_err(|_| ())?;
    let key_bytes: [u8; 32] = key_bytes.try_into().map_err(|_| ())?;
    let key = DerivedKey::from_bytes(key_bytes);

    let json = crypto::decrypt(ciphertext, &key).map_err(|_| ())?;
    serde_json::from_str(&json).map(Some).map_err(|_| ())
}
