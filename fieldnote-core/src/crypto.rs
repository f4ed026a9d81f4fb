//! Key derivation and symmetric cipher primitives for the credential vault
//!
//! - PBKDF2-HMAC-SHA256 with a deliberately slow iteration count turns the
//!   user password plus a random salt into a 256-bit key.
//! - AES-256-GCM provides authenticated encryption; decrypting with the
//!   wrong key fails with a typed error, never silently returns garbage.
//! - The password hash and the token-encryption key are derived from
//!   domain-separated salts, so a leaked hash does not equal the key.
//!
//! Key material lives in [`DerivedKey`], which zeroizes on drop.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

use fieldnote_common::api::auth::constant_time_eq;

/// PBKDF2 rounds for key derivation and password hashing
pub const PBKDF2_ITERATIONS: u32 = 100_000;

const KEY_LEN: usize = 32;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const SESSION_TOKEN_LEN: usize = 32;
const CHALLENGE_LEN: usize = 32;

/// Cipher and derivation failures
///
/// `DecryptionFailed` is deliberately opaque: wrong key, truncated input,
/// and tampered ciphertext are indistinguishable to callers, all of which
/// must treat it as a wrong-password condition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("decryption failed")]
    DecryptionFailed,

    #[error("invalid salt encoding")]
    InvalidSalt,

    #[error("encryption failed")]
    EncryptionFailed,
}

/// A 256-bit symmetric key, zeroized on drop
pub struct DerivedKey(Zeroizing<[u8; KEY_LEN]>);

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DerivedKey").field(&"<redacted>").finish()
    }
}

impl DerivedKey {
    /// Wrap raw key bytes (used for the device-local snapshot key)
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Generate a random key
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut *bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Derive the token-encryption key from a password and a hex-encoded salt
///
/// Deterministic: the same inputs always yield the same key. The PBKDF2
/// round count makes each guess expensive; callers on an async runtime
/// should wrap this in `spawn_blocking`.
pub fn derive_key(password: &str, salt_hex: &str) -> Result<DerivedKey, CryptoError> {
    derive_key_with_iterations(password, salt_hex, PBKDF2_ITERATIONS)
}

fn derive_key_with_iterations(
    password: &str,
    salt_hex: &str,
    iterations: u32,
) -> Result<DerivedKey, CryptoError> {
    let salt = hex::decode(salt_hex).map_err(|_| CryptoError::InvalidSalt)?;
    if salt.is_empty() {
        return Err(CryptoError::InvalidSalt);
    }
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut *key);
    Ok(DerivedKey(key))
}

/// Generate a random 128-bit salt, hex encoded
pub fn generate_salt() -> String {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    hex::encode(salt)
}

/// Generate a random 256-bit session token, hex encoded
pub fn generate_session_token() -> String {
    let mut token = [0u8; SESSION_TOKEN_LEN];
    OsRng.fill_bytes(&mut token);
    hex::encode(token)
}

/// Generate a random 256-bit authenticator challenge
pub fn generate_challenge() -> [u8; CHALLENGE_LEN] {
    let mut challenge = [0u8; CHALLENGE_LEN];
    OsRng.fill_bytes(&mut challenge);
    challenge
}

/// Domain-separated salt for password hashing
///
/// `sha256(salt_bytes || ":auth")`, hex encoded. Keeps the stored hash on a
/// different derivation path than the encryption key.
pub fn auth_salt(salt_hex: &str) -> Result<String, CryptoError> {
    let salt = hex::decode(salt_hex).map_err(|_| CryptoError::InvalidSalt)?;
    let mut hasher = Sha256::new();
    hasher.update(&salt);
    hasher.update(b":auth");
    Ok(hex::encode(hasher.finalize()))
}

/// Hash a password for storage
pub fn hash_password(password: &str, salt_hex: &str) -> Result<String, CryptoError> {
    let domain_salt = auth_salt(salt_hex)?;
    let key = derive_key(password, &domain_salt)?;
    Ok(hex::encode(key.as_bytes()))
}

/// Verify a password against a stored hash
///
/// Full-length comparison; no short-circuit on the first mismatching byte.
pub fn verify_password(
    password: &str,
    salt_hex: &str,
    expected_hash_hex: &str,
) -> Result<bool, CryptoError> {
    let computed = hash_password(password, salt_hex)?;
    Ok(constant_time_eq(
        computed.as_bytes(),
        expected_hash_hex.as_bytes(),
    ))
}

/// Encrypt a plaintext string under the given key
///
/// Output is `base64(nonce || ciphertext)` with a fresh random 96-bit nonce
/// per call.
pub fn encrypt(plaintext: &str, key: &DerivedKey) -> Result<String, CryptoError> {
    let cipher =
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::EncryptionFailed)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut packed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    packed.extend_from_slice(&nonce_bytes);
    packed.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(packed))
}

/// Decrypt a `base64(nonce || ciphertext)` string
pub fn decrypt(ciphertext_b64: &str, key: &DerivedKey) -> Result<String, CryptoError> {
    let packed = BASE64
        .decode(ciphertext_b64)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    if packed.len() < NONCE_LEN {
        return Err(CryptoError::DecryptionFailed);
    }

    let cipher =
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::DecryptionFailed)?;
    let nonce = Nonce::from_slice(&packed[..NONCE_LEN]);

    let plaintext = cipher
        .decrypt(nonce, &packed[NONCE_LEN..])
        .map_err(|_| CryptoError::DecryptionFailed)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
}
