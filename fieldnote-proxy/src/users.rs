//! Login user registry
//!
//! Users for the alternative (non-local-first) login path live in a TOML
//! file of `[[users]]` tables. Password hashes use PBKDF2-HMAC-SHA256 in a
//! self-describing format:
//!
//! ```text
//! pbkdf2-sha256$<iterations>$<salt-hex>$<hash-hex>
//! ```

use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Deserialize;
use sha2::Sha256;
use tracing::warn;

use fieldnote_common::api::auth::constant_time_eq;
use fieldnote_common::{Error, Result};

const HASH_SCHEME: &str = "pbkdf2-sha256";
const HASH_ITERATIONS: u32 = 100_000;
const HASH_LEN: usize = 32;

/// One registered user
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub user_name: String,
    pub display_name: String,
    pub password_hash: String,
}

#[derive(Debug, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: Vec<UserRecord>,
}

/// Load the user registry from a TOML file
///
/// A missing file yields an empty registry (login always fails) with a
/// warning; a present but malformed file is a hard error.
pub fn load_users(path: Option<&str>) -> Result<Vec<UserRecord>> {
    let Some(path) = path else {
        warn!("No users file configured; login is disabled");
        return Ok(Vec::new());
    };

    if !std::path::Path::new(path).exists() {
        warn!("Users file {path} does not exist; login is disabled");
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)?;
    let parsed: UsersFile = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse users file {path}: {e}")))?;
    Ok(parsed.users)
}

/// Find a user by name
pub fn find_user<'a>(users: &'a [UserRecord], user_name: &str) -> Option<&'a UserRecord> {
    users.iter().find(|u| u.user_name == user_name)
}

/// Hash a password into the stored format
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);

    let mut hash = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, HASH_ITERATIONS, &mut hash);

    format!(
        "{HASH_SCHEME}${HASH_ITERATIONS}${}${}",
        hex::encode(salt),
        hex::encode(hash)
    )
}

/// Verify a password against a stored hash
///
/// Unknown schemes and malformed hashes verify as false rather than error:
/// a bad registry entry must read as "wrong password", not take the
/// service down.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(iterations), Some(salt_hex), Some(hash_hex), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    if scheme != HASH_SCHEME {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(expected) = hex::decode(hash_hex) else {
        return false;
    };
    if expected.len() != HASH_LEN {
        return false;
    }

    let mut computed = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut computed);
    constant_time_eq(&computed, &expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let stored = hash_password("correcthorse1");
        assert!(stored.starts_with("pbkdf2-sha256$100000$"));
        assert!(verify_password("correcthorse1", &stored));
        assert!(!verify_password("wrong", &stored));
    }

    #[test]
    fn hashes_are_salted() {
        assert_ne!(hash_password("same"), hash_password("same"));
    }

    #[test]
    fn malformed_hashes_verify_false() {
        assert!(!verify_password("pw", ""));
        assert!(!verify_password("pw", "bcrypt$whatever"));
        assert!(!verify_password("pw", "pbkdf2-sha256$abc$00$00"));
        assert!(!verify_password("pw", "pbkdf2-sha256$1000$nothex$00"));
        assert!(!verify_password("pw", "pbkdf2-sha256$1000$00$tooshort"));
    }

    #[test]
    fn users_file_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.toml");
        std::fs::write(
            &path,
            r#"
[[users]]
user_name = "sam"
display_name = "Sam Field"
password_hash = "pbkdf2-sha256$1000$00$00"
"#,
        )
        .unwrap();

        let users = load_users(path.to_str()).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(find_user(&users, "sam").unwrap().display_name, "Sam Field");
        assert!(find_user(&users, "nobody").is_none());
    }

    #[test]
    fn missing_users_file_yields_empty_registry() {
        assert!(load_users(None).unwrap().is_empty());
        assert!(load_users(Some("/nonexistent/users.toml")).unwrap().is_empty());
    }
}
