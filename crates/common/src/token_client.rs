//! Join token retrieval from the token server.
//!
//! The token server issues a short-lived credential authorizing one participant
//! to join one channel:
//!
//! ```text
//! GET {server_url}/get-token?channelName=<channel>
//! 200 {"token": "<string>"}
//! ```
//!
//! Any transport failure, non-2xx status, or a body whose `token` is missing or
//! empty is reported as a [`TokenError`]. The provider never retries on its own;
//! the session layer decides whether to retry.
//!
//! # Security
//!
//! - Tokens are returned as `SecretString` and never logged
//! - HTTP timeouts prevent hanging joins

use crate::secret::SecretString;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

// =============================================================================
// Constants
// =============================================================================

/// Local development token server used when no URL is configured.
pub const DEFAULT_TOKEN_SERVER_URL: &str = "http://localhost:8080";

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Path of the token endpoint relative to the server URL.
const TOKEN_PATH: &str = "/get-token";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while fetching a join token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Channel name was empty; no request was sent.
    #[error("Channel name must not be empty")]
    InvalidChannel,

    /// Request could not be sent or the connection failed.
    #[error("HTTP client error: {0}")]
    Http(String),

    /// Token server answered with a non-success status.
    #[error("Token server returned status {status}")]
    Status { status: u16 },

    /// Body was not JSON, or the token was missing or empty.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// HTTP client could not be built.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

// =============================================================================
// Provider Trait
// =============================================================================

/// Source of join tokens (enables mocking).
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fetch a token for `channel_name`.
    async fn fetch_token(&self, channel_name: &str) -> Result<SecretString, TokenError>;
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for [`HttpTokenProvider`].
#[derive(Debug, Clone)]
pub struct TokenClientConfig {
    /// Base URL of the token server (e.g., `http://localhost:8080`).
    pub server_url: String,

    /// HTTP request timeout.
    pub http_timeout: Duration,
}

impl TokenClientConfig {
    /// Create a configuration with the default timeout.
    ///
    /// A trailing `/` on the URL is ignored.
    #[must_use]
    pub fn new(server_url: impl Into<String>) -> Self {
        let server_url: String = server_url.into();
        Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Full URL of the token endpoint (without query string).
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}{TOKEN_PATH}", self.server_url)
    }
}

impl Default for TokenClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_SERVER_URL)
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Token server response body.
#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// =============================================================================
// HTTP Provider
// =============================================================================

/// [`TokenProvider`] backed by the token server's HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenProvider {
    config: TokenClientConfig,
    http_client: reqwest::Client,
}

impl HttpTokenProvider {
    /// Build the provider and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Configuration` if the HTTP client cannot be built.
    pub fn new(config: TokenClientConfig) -> Result<Self, TokenError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TokenError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// The configuration this provider was built with.
    #[must_use]
    pub fn config(&self) -> &TokenClientConfig {
        &self.config
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    #[instrument(skip_all, fields(channel = %channel_name))]
    async fn fetch_token(&self, channel_name: &str) -> Result<SecretString, TokenError> {
        if channel_name.is_empty() {
            return Err(TokenError::InvalidChannel);
        }

        let url = self.config.token_url();

        debug!(
            target: "common.token_client",
            url = %url,
            channel = %channel_name,
            "Requesting join token"
        );

        let response = self
            .http_client
            .get(&url)
            .query(&[("channelName", channel_name)])
            .send()
            .await
            .map_err(|e| {
                debug!(target: "common.token_client", error = %e, "HTTP request failed");
                TokenError::Http(e.to_string())
            })?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|e| {
                trace!(target: "common.token_client", error = %e, "Failed to read error response body");
                "<failed to read body>".to_string()
            });
            warn!(
                target: "common.token_client",
                status = %status,
                "Token server rejected token request"
            );
            trace!(
                target: "common.token_client",
                body = %body,
                "Token rejection response body"
            );
            return Err(TokenError::Status {
                status: status.as_u16(),
            });
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            warn!(target: "common.token_client", error = %e, "Failed to parse token response");
            TokenError::InvalidResponse(e.to_string())
        })?;

        match token_response.token {
            Some(token) if !token.is_empty() => {
                debug!(target: "common.token_client", "Join token acquired");
                Ok(SecretString::from(token))
            }
            _ => {
                warn!(target: "common.token_client", "Token server returned an empty token");
                Err(TokenError::InvalidResponse(
                    "token was empty or missing".to_string(),
                ))
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
