//! Session lifecycle: join, publish, react to remote events, leave.
//!
//! ```text
//! Idle --join()--> Joining --tracks published--> Joined --leave()--> Leaving --> Idle
//!   ^                 |                                                  |
//!   +---- failure ----+------------------- leave() (abort) --------------+
//! ```

mod controller;
mod events;
mod participant;

pub use controller::SessionController;
pub use events::spawn_event_pump;
pub use participant::{MediaSet, Participant, Role};

use crate::config::Config;
use crate::layout::LayoutMode;
use crate::views::ViewProfile;
use common::retry::RetryPolicy;
use common::secret::SecretString;
use common::types::{ParticipantId, SessionId};
use serde::Serialize;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Joining,
    Joined,
    Leaving,
}

impl SessionState {
    /// Lowercase name, used as a metric label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Joining => "joining",
            SessionState::Joined => "joined",
            SessionState::Leaving => "leaving",
        }
    }
}

/// Per-session parameters of the controller.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Project/tenant the channel belongs to.
    pub app_id: SecretString,
    /// Channel to join.
    pub channel: String,
    /// Requested local id; `None` lets the engine assign one.
    pub local_id: Option<ParticipantId>,
    /// Page flavor targets are named for.
    pub profile: ViewProfile,
    /// Retry policy for token fetch and engine join.
    pub retry: RetryPolicy,
}

impl SessionConfig {
    /// Room profile, engine-assigned id, no retry.
    #[must_use]
    pub fn new(app_id: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            app_id: SecretString::from(app_id.into()),
            channel: channel.into(),
            local_id: None,
            profile: ViewProfile::default(),
            retry: RetryPolicy::none(),
        }
    }

    #[must_use]
    pub fn with_local_id(mut self, local_id: impl Into<ParticipantId>) -> Self {
        self.local_id = Some(local_id.into());
        self
    }

    #[must_use]
    pub fn with_profile(mut self, profile: ViewProfile) -> Self {
        self.profile = profile;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            app_id: config.app_id.clone(),
            channel: config.channel_name.clone(),
            local_id: config.local_uid.clone(),
            profile: config.view_profile,
            retry: config.retry_policy(),
        }
    }
}

/// Point-in-time copy of the controller's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session_id: Option<SessionId>,
    pub local: Option<Participant>,
    /// Remote participants in arrival order.
    pub remotes: Vec<Participant>,
    /// Participants that currently own a render target, in registration order.
    pub rendered: Vec<ParticipantId>,
    pub layout: Option<LayoutMode>,
}

impl SessionSnapshot {
    /// Whether nothing of a previous session is left.
    #[must_use]
    pub fn is_pristine(&self) -> bool {
        self.state == SessionState::Idle
            && self.session_id.is_none()
            && self.local.is_none()
            && self.remotes.is_empty()
            && self.rendered.is_empty()
            && self.layout.is_none()
    }

    /// Local plus remote participants.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        usize::from(self.local.is_some()) + self.remotes.len()
    }
}
