//! Configuration loading and data directory resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "FIELDNOTE_DATA_DIR";

/// File name of the client database inside the data directory
pub const DATABASE_FILE: &str = "fieldnote.db";

/// Client configuration from `fieldnote.toml`
///
/// Every field is optional; absent values fall back to compiled defaults so
/// a missing or partial config file never prevents startup.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ClientConfig {
    /// Base URL of the proxy backend
    pub backend_url: Option<String>,
    /// Idle minutes before auto-lock; 0 disables
    pub auto_lock_minutes: Option<i64>,
    /// Override for the data directory
    pub data_dir: Option<String>,
}

impl ClientConfig {
    pub fn backend_url_or_default(&self) -> String {
        self.backend_url
            .clone()
            .unwrap_or_else(|| "http://localhost:3001".to_string())
    }

    pub fn auto_lock_minutes_or_default(&self) -> i64 {
        self.auto_lock_minutes.unwrap_or(15)
    }
}

/// Resolve the data directory with the standard priority order:
/// 1. Explicit argument (highest priority)
/// 2. `FIELDNOTE_DATA_DIR` environment variable
/// 3. `data_dir` from the TOML config, if one was loaded
/// 4. OS-dependent compiled default
pub fn resolve_data_dir(explicit: Option<&str>, config: Option<&ClientConfig>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var(DATA_DIR_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(dir) = config.and_then(|c| c.data_dir.as_deref()) {
        return PathBuf::from(dir);
    }

    default_data_dir()
}

/// OS-dependent default data directory
pub fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("fieldnote"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/fieldnote"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("fieldnote"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/fieldnote"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("fieldnote"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\fieldnote"))
    } else {
        PathBuf::from("./fieldnote_data")
    }
}

/// Load `fieldnote.toml` from the platform config directory
///
/// A missing file is not an error: it yields the compiled defaults. A file
/// that exists but fails to parse is a hard error, since silently ignoring
/// a present config hides misconfiguration.
pub fn load_client_config() -> Result<ClientConfig> {
    let Some(path) = config_file_path() else {
        return Ok(ClientConfig::default());
    };
    if !path.exists() {
        return Ok(ClientConfig::default());
    }
    let content = std::fs::read_to_string(&path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Platform config file path (`<config_dir>/fieldnote/fieldnote.toml`)
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("fieldnote").join("fieldnote.toml"))
}

/// Database path inside the resolved data directory
pub fn database_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join(DATABASE_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn explicit_argument_wins() {
        std::env::set_var(DATA_DIR_ENV, "/tmp/from-env");
        let dir = resolve_data_dir(Some("/tmp/explicit"), None);
        assert_eq!(dir, PathBuf::from("/tmp/explicit"));
        std::env::remove_var(DATA_DIR_ENV);
    }

    #[test]
    #[serial]
    fn env_var_beats_config_and_default() {
        std::env::set_var(DATA_DIR_ENV, "/tmp/from-env");
        let config = ClientConfig {
            data_dir: Some("/tmp/from-config".into()),
            ..Default::default()
        };
        let dir = resolve_data_dir(None, Some(&config));
        assert_eq!(dir, PathBuf::from("/tmp/from-env"));
        std::env::remove_var(DATA_DIR_ENV);
    }

    #[test]
    #[serial]
    fn config_beats_default() {
        std::env::remove_var(DATA_DIR_ENV);
        let config = ClientConfig {
            data_dir: Some("/tmp/from-config".into()),
            ..Default::default()
        };
        let dir = resolve_data_dir(None, Some(&config));
        assert_eq!(dir, PathBuf::from("/tmp/from-config"));
    }

    #[test]
    #[serial]
    fn falls_back_to_platform_default() {
        std::env::remove_var(DATA_DIR_ENV);
        let dir = resolve_data_dir(None, None);
        assert!(!dir.as_os_str().is_empty());
        assert_eq!(dir, default_data_dir());
    }

    #[test]
    fn defaults_apply_when_config_is_empty() {
        let config = ClientConfig::default();
        assert_eq!(config.backend_url_or_default(), "http://localhost:3001");
        assert_eq!(config.auto_lock_minutes_or_default(), 15);
    }

    #[test]
    fn parses_partial_toml() {
        let config: ClientConfig = toml::from_str("auto_lock_minutes = 5").unwrap();
        assert_eq!(config.auto_lock_minutes_or_default(), 5);
        assert_eq!(config.backend_url_or_default(), "http://localhost:3001");
    }
}
