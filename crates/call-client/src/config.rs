//! Call client configuration.
//!
//! Configuration is loaded from environment variables. The app id is
//! redacted in Debug output.

use crate::views::ViewProfile;
use common::config::ObservabilityConfig;
use common::retry::RetryPolicy;
use common::secret::SecretString;
use common::token_client::{TokenClientConfig, DEFAULT_TOKEN_SERVER_URL};
use common::types::ParticipantId;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default token server HTTP timeout in seconds.
pub const DEFAULT_TOKEN_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// Default number of attempts for token fetch and engine join (no retry).
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 1;

/// Default delay before the first retry in milliseconds.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1000;

/// Call client configuration.
#[derive(Clone)]
pub struct Config {
    /// Project/tenant the channel belongs to.
    /// Protected by `SecretString` to prevent accidental logging.
    pub app_id: SecretString,

    /// Channel (room) to join.
    pub channel_name: String,

    /// Base URL of the token server (default: `http://localhost:8080`).
    pub token_server_url: String,

    /// Requested local participant id; `None` lets the engine assign one.
    pub local_uid: Option<ParticipantId>,

    /// Page flavor to render into (default: room).
    pub view_profile: ViewProfile,

    /// Token server request timeout in seconds (default: 10).
    pub token_http_timeout_seconds: u64,

    /// Attempts for token fetch and engine join (default: 1).
    pub retry_max_attempts: u32,

    /// Delay before the first retry in milliseconds (default: 1000).
    pub retry_backoff_ms: u64,

    /// Logging configuration.
    pub observability: ObservabilityConfig,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("app_id", &"[REDACTED]")
            .field("channel_name", &self.channel_name)
            .field("token_server_url", &self.token_server_url)
            .field("local_uid", &self.local_uid)
            .field("view_profile", &self.view_profile)
            .field(
                "token_http_timeout_seconds",
                &self.token_http_timeout_seconds,
            )
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("observability", &self.observability)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let app_id = SecretString::from(
            vars.get("CALL_APP_ID")
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar("CALL_APP_ID".to_string()))?
                .clone(),
        );

        // A missing channel sends the user back to the lobby
        let channel_name = vars
            .get("CALL_CHANNEL_NAME")
            .ok_or_else(|| ConfigError::MissingEnvVar("CALL_CHANNEL_NAME".to_string()))?
            .trim()
            .to_string();
        if channel_name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "CALL_CHANNEL_NAME must not be empty".to_string(),
            ));
        }

        let token_server_url = vars
            .get("TOKEN_SERVER_URL")
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_TOKEN_SERVER_URL.to_string());

        let local_uid = vars
            .get("CALL_LOCAL_UID")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(ParticipantId::from);

        let view_profile = match vars.get("CALL_VIEW_PROFILE") {
            Some(s) => s
                .parse::<ViewProfile>()
                .map_err(|e| ConfigError::InvalidValue(format!("CALL_VIEW_PROFILE: {e}")))?,
            None => ViewProfile::default(),
        };

        let token_http_timeout_seconds = vars
            .get("TOKEN_HTTP_TIMEOUT_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TOKEN_HTTP_TIMEOUT_SECONDS);

        let retry_max_attempts = match vars.get("CALL_RETRY_MAX_ATTEMPTS") {
            Some(s) => match s.parse::<u32>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    return Err(ConfigError::InvalidValue(format!(
                        "CALL_RETRY_MAX_ATTEMPTS must be a positive integer, got '{s}'"
                    )))
                }
            },
            None => DEFAULT_RETRY_MAX_ATTEMPTS,
        };

        let retry_backoff_ms = vars
            .get("CALL_RETRY_BACKOFF_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RETRY_BACKOFF_MS);

        let observability = ObservabilityConfig::from_vars(vars);

        Ok(Config {
            app_id,
            channel_name,
            token_server_url,
            local_uid,
            view_profile,
            token_http_timeout_seconds,
            retry_max_attempts,
            retry_backoff_ms,
            observability,
        })
    }

    /// Retry policy for token fetch and engine join.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_retries(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }

    /// Token client configuration.
    #[must_use]
    pub fn token_client_config(&self) -> TokenClientConfig {
        TokenClientConfig::new(self.token_server_url.clone())
            .with_http_timeout(Duration::from_secs(self.token_http_timeout_seconds))
    }
}
