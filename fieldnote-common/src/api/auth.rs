//! Bearer-token minting and validation for the proxy API
//!
//! Tokens are a base64url JSON payload joined to a SHA-256 signature over
//! the payload and a server-side secret:
//!
//! ```text
//! token   = base64url(payload_json) "." hex(sha256(payload_b64 ":" secret))
//! payload = {"sub": user_name, "name": display_name, "exp": unix_seconds}
//! ```
//!
//! The signature check runs over the full hash regardless of where a
//! mismatch occurs, and expiry is validated after the signature so a forged
//! token learns nothing from response timing.
//!
//! This module contains only pure functions, no HTTP framework
//! dependencies. Route middleware lives with the proxy.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ========================================
// Error Types
// ========================================

/// Token validation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Token is not two dot-separated parts of the expected encodings
    Malformed,

    /// Signature does not match the payload under the server secret
    InvalidSignature,

    /// Signature is valid but the expiry has passed
    Expired,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Malformed => write!(f, "Malformed token"),
            TokenError::InvalidSignature => write!(f, "Invalid token signature"),
            TokenError::Expired => write!(f, "Token expired"),
        }
    }
}

impl std::error::Error for TokenError {}

// ========================================
// Claims
// ========================================

/// Signed token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Authenticated user name
    pub sub: String,
    /// Display name shown in issue footers and logs
    pub name: String,
    /// Expiry as Unix seconds
    pub exp: i64,
}

// ========================================
// Mint / Validate
// ========================================

/// Mint a signed bearer token for an authenticated user
pub fn mint_token(
    user_name: &str,
    display_name: &str,
    secret: &str,
    expiry_hours: i64,
) -> String {
    let claims = TokenClaims {
        sub: user_name.to_string(),
        name: display_name.to_string(),
        exp: chrono::Utc::now().timestamp() + expiry_hours * 3600,
    };
    // Serialization of a plain struct with string/int fields cannot fail
    let payload = serde_json::to_vec(&claims).expect("token claims serialize");
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload);
    let signature = sign(&payload_b64, secret);
    format!("{payload_b64}.{signature}")
}

/// Validate a bearer token and return its claims
pub fn validate_token(token: &str, secret: &str) -> Result<TokenClaims, TokenError> {
    let (payload_b64, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;

    let expected = sign(payload_b64, secret);
    if !constant_time_eq(signature.as_bytes(), expected.as_bytes()) {
        return Err(TokenError::InvalidSignature);
    }

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| TokenError::Malformed)?;
    let claims: TokenClaims =
        serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;

    if claims.exp < chrono::Utc::now().timestamp() {
        return Err(TokenError::Expired);
    }

    Ok(claims)
}

fn sign(payload_b64: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload_b64.as_bytes());
    hasher.update(b":");
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Full-length comparison with no early exit on mismatch
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-signing-secret";

    #[test]
    fn minted_token_validates_and_carries_claims() {
        let token = mint_token("jana", "Jana Berg", SECRET, 24);
        let claims = validate_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, "jana");
        assert_eq!(claims.name, "Jana Berg");
        assert!(claims.exp > chrono::Utc::now().timestamp());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = mint_token("jana", "Jana Berg", SECRET, 24);
        assert_eq!(
            validate_token(&token, "other-secret"),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let token = mint_token("jana", "Jana Berg", SECRET, 24);
        let (_, sig) = token.split_once('.').unwrap();
        let forged_payload =
            URL_SAFE_NO_PAD.encode(r#"{"sub":"admin","name":"Admin","exp":9999999999}"#);
        let forged = format!("{forged_payload}.{sig}");
        assert_eq!(
            validate_token(&forged, SECRET),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = mint_token("jana", "Jana Berg", SECRET, -1);
        assert_eq!(validate_token(&token, SECRET), Err(TokenError::Expired));
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(
            validate_token("not-a-token", SECRET),
            Err(TokenError::Malformed)
        );
        assert_eq!(
            validate_token("!!!.deadbeef", SECRET),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }
}
