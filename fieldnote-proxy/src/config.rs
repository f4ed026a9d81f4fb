//! Proxy configuration from environment variables
//!
//! Missing third-party credentials produce a startup warning but never halt
//! the process; routes that need them fail per-request instead, which
//! keeps a partially configured instance useful for the rest.

use tracing::warn;

/// AI vendor settings
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub base_url: String,
    pub api_key: String,
    pub transcription_model: String,
    pub chat_model: String,
    /// Language hint forwarded with transcription requests
    pub language: String,
}

/// Source-control host settings
#[derive(Debug, Clone)]
pub struct RepoConfig {
    pub base_url: String,
    pub token: String,
    pub owner: String,
    pub name: String,
    pub companies_path: String,
}

/// Full proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    /// CORS-allowed frontend origin
    pub frontend_origin: String,
    /// Bearer-token signing secret
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    /// TOML file with the login user registry
    pub users_file: Option<String>,
    pub ai: AiConfig,
    pub repo: RepoConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

impl ProxyConfig {
    /// Read configuration from the environment
    pub fn from_env() -> Self {
        let config = Self {
            port: env_or("FIELDNOTE_PORT", "3001").parse().unwrap_or(3001),
            frontend_origin: env_or("FIELDNOTE_FRONTEND_URL", "http://localhost:5173"),
            jwt_secret: env_or(
                "FIELDNOTE_JWT_SECRET",
                "fallback-secret-change-in-production",
            ),
            jwt_expiry_hours: env_or("FIELDNOTE_JWT_EXPIRY_HOURS", "24")
                .parse()
                .unwrap_or(24),
            users_file: std::env::var("FIELDNOTE_USERS_FILE")
                .ok()
                .filter(|v| !v.is_empty()),
            ai: AiConfig {
                base_url: env_or("FIELDNOTE_AI_BASE_URL", "https://api.openai.com/v1"),
                api_key: env_or("FIELDNOTE_AI_API_KEY", ""),
                transcription_model: env_or("FIELDNOTE_AI_TRANSCRIPTION_MODEL", "whisper-1"),
                chat_model: env_or("FIELDNOTE_AI_CHAT_MODEL", "gpt-4o-mini"),
                language: env_or("FIELDNOTE_AI_LANGUAGE", "de"),
            },
            repo: RepoConfig {
                base_url: env_or("FIELDNOTE_REPO_BASE_URL", "https://api.github.com"),
                token: env_or("FIELDNOTE_REPO_TOKEN", ""),
                owner: env_or("FIELDNOTE_REPO_OWNER", ""),
                name: env_or("FIELDNOTE_REPO_NAME", ""),
                companies_path: env_or("FIELDNOTE_COMPANIES_PATH", "companies.json"),
            },
        };

        config.warn_missing();
        config
    }

    /// Log a warning per missing required-at-boot credential
    fn warn_missing(&self) {
        if self.jwt_secret == "fallback-secret-change-in-production" {
            warn!("FIELDNOTE_JWT_SECRET is not set; using the insecure fallback secret");
        }
        if self.ai.api_key.is_empty() {
            warn!("FIELDNOTE_AI_API_KEY is not set; AI routes will fail");
        }
        if self.repo.token.is_empty() {
            warn!("FIELDNOTE_REPO_TOKEN is not set; repository routes will fail");
        }
        if self.repo.owner.is_empty() || self.repo.name.is_empty() {
            warn!("FIELDNOTE_REPO_OWNER / FIELDNOTE_REPO_NAME are not set");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_apply_without_environment() {
        for key in [
            "FIELDNOTE_PORT",
            "FIELDNOTE_FRONTEND_URL",
            "FIELDNOTE_JWT_SECRET",
            "FIELDNOTE_JWT_EXPIRY_HOURS",
            "FIELDNOTE_AI_BASE_URL",
            "FIELDNOTE_AI_CHAT_MODEL",
        ] {
            std::env::remove_var(key);
        }

        let config = ProxyConfig::from_env();
        assert_eq!(config.port, 3001);
        assert_eq!(config.frontend_origin, "http://localhost:5173");
        assert_eq!(config.jwt_expiry_hours, 24);
        assert_eq!(config.ai.chat_model, "gpt-4o-mini");
        assert_eq!(config.ai.transcription_model, "whisper-1");
    }

    #[test]
    #[serial]
    fn environment_overrides_defaults() {
        std::env::set_var("FIELDNOTE_PORT", "8080");
        std::env::set_var("FIELDNOTE_AI_CHAT_MODEL", "gpt-4o");

        let config = ProxyConfig::from_env();
        assert_eq!(config.port, 8080);
        assert_eq!(config.ai.chat_model, "gpt-4o");

        std::env::remove_var("FIELDNOTE_PORT");
        std::env::remove_var("FIELDNOTE_AI_CHAT_MODEL");
    }

    #[test]
    #[serial]
    fn unparseable_port_falls_back() {
        std::env::set_var("FIELDNOTE_PORT", "not-a-port");
        let config = ProxyConfig::from_env();
        assert_eq!(config.port, 3001);
        std::env::remove_var("FIELDNOTE_PORT");
    }
}
