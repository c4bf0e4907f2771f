//! Mock token provider for session controller testing.
//!
//! Provides a `TokenProvider` that can be configured to:
//! - Return a fixed token
//! - Fail every fetch, or only the first few
//! - Hold fetches at a [`Gate`] so a test can act while the join is suspended

use crate::gate::Gate;
use async_trait::async_trait;
use common::secret::SecretString;
use common::token_client::{TokenError, TokenProvider};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Token handed out by [`MockTokenProvider::succeeding`].
pub const TEST_TOKEN: &str = "test-join-token";

/// Mock token provider.
#[derive(Debug)]
pub struct MockTokenProvider {
    token: String,
    failure: Option<TokenError>,
    failures_remaining: AtomicU32,
    gate: Gate,
    call_count: AtomicUsize,
    channels: Mutex<Vec<String>>,
}

impl MockTokenProvider {
    fn with(token: &str, failure: Option<(TokenError, u32)>, gate: Gate) -> Self {
        let (failure, remaining) = match failure {
            Some((error, times)) => (Some(error), times),
            None => (None, 0),
        };
        Self {
            token: token.to_string(),
            failure,
            failures_remaining: AtomicU32::new(remaining),
            gate,
            call_count: AtomicUsize::new(0),
            channels: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always returns [`TEST_TOKEN`].
    pub fn succeeding() -> Self {
        Self::with(TEST_TOKEN, None, Gate::open())
    }

    /// Create a mock that always returns `token`.
    pub fn with_token(token: &str) -> Self {
        Self::with(token, None, Gate::open())
    }

    /// Create a mock that always fails with `error`.
    pub fn failing(error: TokenError) -> Self {
        Self::with(TEST_TOKEN, Some((error, u32::MAX)), Gate::open())
    }

    /// Create a mock that fails `times` times, then succeeds.
    pub fn failing_times(times: u32, error: TokenError) -> Self {
        Self::with(TEST_TOKEN, Some((error, times)), Gate::open())
    }

    /// Create a mock whose fetches wait until the gate is released.
    pub fn held() -> Self {
        Self::with(TEST_TOKEN, None, Gate::held())
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Channels tokens were requested for, in order.
    pub fn channels(&self) -> Vec<String> {
        self.channels.lock().unwrap().clone()
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }
}

#[async_trait]
impl TokenProvider for MockTokenProvider {
    async fn fetch_token(&self, channel_name: &str) -> Result<SecretString, TokenError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.channels.lock().unwrap().push(channel_name.to_string());
        self.gate.pass().await;

        if channel_name.is_empty() {
            return Err(TokenError::InvalidChannel);
        }

        if let Some(error) = &self.failure {
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining
                    .store(remaining.saturating_sub(1), Ordering::SeqCst);
                return Err(error.clone());
            }
        }

        Ok(SecretString::from(self.token.clone()))
    }
}
