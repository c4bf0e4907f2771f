//! Call Client token check
//!
//! Loads the client configuration from the environment, fetches one join token
//! for the configured channel and reports the outcome. Useful for checking a
//! token server deployment before pointing a front end at it.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing (`RUST_LOG` overrides `CALL_LOG_LEVEL`)
//! 3. Build the HTTP token provider
//! 4. Fetch a token for `CALL_CHANNEL_NAME` under the configured retry policy

#![warn(clippy::pedantic)]

use std::time::Instant;

use anyhow::Context;
use call_client::config::Config;
use common::retry::RetryPolicy;
use common::secret::ExposeSecret;
use common::token_client::{HttpTokenProvider, TokenProvider};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.observability.log_level.as_str().into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    info!(
        channel = %config.channel_name,
        token_server_url = %config.token_server_url,
        view_profile = ?config.view_profile,
        token_http_timeout_seconds = config.token_http_timeout_seconds,
        retry_max_attempts = config.retry_max_attempts,
        "Configuration loaded successfully"
    );

    let provider = HttpTokenProvider::new(config.token_client_config())
        .context("Failed to build token client")?;
    let policy: RetryPolicy = config.retry_policy();

    let started = Instant::now();
    let result = policy
        .run("token_fetch", || provider.fetch_token(&config.channel_name))
        .await;

    match result {
        Ok(token) => {
            info!(
                channel = %config.channel_name,
                token_len = token.expose_secret().len(),
                elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Token fetched successfully"
            );
            Ok(())
        }
        Err(e) => {
            error!(channel = %config.channel_name, error = %e, "Token fetch failed");
            Err(e).context("Token check failed")
        }
    }
}
