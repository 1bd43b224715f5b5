use std::time::Duration;

use serde::Deserialize;

use crate::models::detection::ExportCapabilities;

/// Client configuration, read from `VISION_*` environment variables (and `.env`).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the versioned API (e.g., "http://localhost:8000/api/v1")
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Account used for password login
    pub username: Option<String>,

    pub password: Option<String>,

    /// Pre-issued bearer token; skips login when set
    pub token: Option<String>,

    /// Seconds between status polls of an active job
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Per-request timeout applied by the HTTP transport
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Session lifetime assumed when the token carries no expiry of its own
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: i64,

    /// Whether the backend can render annotated video exports
    #[serde(default)]
    pub video_export_enabled: bool,
}

fn default_api_url() -> String {
    "http://localhost:8000/api/v1".to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Longest session lifetime accepted from configuration (30 days).
const MAX_TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;

fn default_token_ttl_secs() -> i64 {
    3600
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            username: None,
            password: None,
            token: None,
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            token_ttl_secs: default_token_ttl_secs(),
            video_export_enabled: false,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::prefixed("VISION_").from_env()?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "VISION_POLL_INTERVAL_SECS must be at least 1".to_string(),
            ));
        }
        if !(1..=MAX_TOKEN_TTL_SECS).contains(&self.token_ttl_secs) {
            return Err(ConfigError::Invalid(format!(
                "VISION_TOKEN_TTL_SECS must be between 1 and {MAX_TOKEN_TTL_SECS}"
            )));
        }
        reqwest::Url::parse(&self.api_url)
            .map_err(|e| ConfigError::Invalid(format!("VISION_API_URL: {e}")))?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_ttl_secs.clamp(1, MAX_TOKEN_TTL_SECS))
    }

    pub fn export_capabilities(&self) -> ExportCapabilities {
        ExportCapabilities {
            video: self.video_export_enabled,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
