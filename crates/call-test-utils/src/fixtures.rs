//! Pre-wired controller fixtures.

use crate::mock_engine::MockMediaEngine;
use crate::mock_surface::RecordingSurface;
use crate::mock_tokens::MockTokenProvider;
use call_client::session::{SessionConfig, SessionController};
use call_client::views::ViewProfile;
use std::sync::Arc;

pub const TEST_APP_ID: &str = "test-app-id";
pub const TEST_CHANNEL: &str = "test-channel";

/// Session config for [`TEST_APP_ID`] / [`TEST_CHANNEL`], room profile.
pub fn test_session_config() -> SessionConfig {
    SessionConfig::new(TEST_APP_ID, TEST_CHANNEL)
}

/// A controller and handles to the mocks behind it.
pub struct TestSession {
    pub controller: Arc<SessionController>,
    pub engine: Arc<MockMediaEngine>,
    pub tokens: Arc<MockTokenProvider>,
    pub surface: Arc<RecordingSurface>,
}

impl TestSession {
    /// Controller with succeeding mocks and the default test config.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TestSessionBuilder {
        TestSessionBuilder::default()
    }
}

impl Default for TestSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`TestSession`].
pub struct TestSessionBuilder {
    config: SessionConfig,
    engine: MockMediaEngine,
    tokens: MockTokenProvider,
    surface: RecordingSurface,
}

impl Default for TestSessionBuilder {
    fn default() -> Self {
        Self {
            config: test_session_config(),
            engine: MockMediaEngine::succeeding(),
            tokens: MockTokenProvider::succeeding(),
            surface: RecordingSurface::new(),
        }
    }
}

impl TestSessionBuilder {
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn profile(mut self, profile: ViewProfile) -> Self {
        self.config = self.config.with_profile(profile);
        self
    }

    pub fn engine(mut self, engine: MockMediaEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn tokens(mut self, tokens: MockTokenProvider) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn surface(mut self, surface: RecordingSurface) -> Self {
        self.surface = surface;
        self
    }

    pub fn build(self) -> TestSession {
        let engine = Arc::new(self.engine);
        let tokens = Arc::new(self.tokens);
        let surface = Arc::new(self.surface);

        let controller = Arc::new(SessionController::new(
            self.config,
            Arc::clone(&tokens) as Arc<dyn common::token_client::TokenProvider>,
            Arc::clone(&engine) as Arc<dyn call_client::engine::MediaEngine>,
            Arc::clone(&surface) as Arc<dyn call_client::views::ViewSurface>,
        ));

        TestSession {
            controller,
            engine,
            tokens,
            surface,
        }
    }
}
