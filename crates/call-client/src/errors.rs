//! Session controller error types.
//!
//! Every error is recovered at the controller boundary: the controller is back
//! in `Idle` (failed join) or still `Joined` (failed event handling or toggle)
//! when one of these is returned. Internal details are logged but not shown to
//! the user; use [`SessionError::client_message`] for UI text.

use crate::engine::EngineError;
use crate::session::SessionState;
use common::token_client::TokenError;
use common::types::{MediaKind, ParticipantId};
use thiserror::Error;

/// Session controller error type.
///
/// Error codes:
/// - `Token`: 1
/// - `Join`: 2
/// - `Capture`: 3
/// - `Publish`: 4
/// - `Subscribe`: 5
/// - `Toggle`: 6
/// - `AlreadyInSession`: 7
/// - `Cancelled`: 8
#[derive(Debug, Error)]
pub enum SessionError {
    /// Token could not be fetched from the token server.
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// The media engine refused to join the channel.
    #[error("Join failed: {0}")]
    Join(EngineError),

    /// Camera or microphone could not be captured.
    #[error("Capture failed: {0}")]
    Capture(EngineError),

    /// Local tracks could not be published.
    #[error("Publish failed: {0}")]
    Publish(EngineError),

    /// A remote participant's track could not be subscribed.
    #[error("Subscribe to {participant} ({kind}) failed: {source}")]
    Subscribe {
        participant: ParticipantId,
        kind: MediaKind,
        source: EngineError,
    },

    /// A local device could not be enabled or disabled.
    #[error("Toggling {kind} failed: {source}")]
    Toggle { kind: MediaKind, source: EngineError },

    /// `join` was called while a session is already in progress.
    #[error("Already in session (state: {state:?})")]
    AlreadyInSession { state: SessionState },

    /// The join was aborted by `leave`.
    #[error("Join cancelled")]
    Cancelled,
}

impl SessionError {
    /// Stable numeric code for the error kind.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            SessionError::Token(_) => 1,
            SessionError::Join(_) => 2,
            SessionError::Capture(_) => 3,
            SessionError::Publish(_) => 4,
            SessionError::Subscribe { .. } => 5,
            SessionError::Toggle { .. } => 6,
            SessionError::AlreadyInSession { .. } => 7,
            SessionError::Cancelled => 8,
        }
    }

    /// Returns a user-facing message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SessionError::Token(_) => {
                "Failed to get a token from the server. Please try again.".to_string()
            }
            SessionError::Join(_) => "Could not join the call.".to_string(),
            SessionError::Capture(EngineError::PermissionDenied(_)) => {
                "Camera or microphone access was denied.".to_string()
            }
            SessionError::Capture(_) => "Camera or microphone is unavailable.".to_string(),
            SessionError::Publish(_) => "Could not share your camera and microphone.".to_string(),
            SessionError::Subscribe { .. } => "A participant's media could not be loaded.".to_string(),
            SessionError::Toggle { kind, .. } => format!("Could not switch the {kind} device."),
            SessionError::AlreadyInSession { .. } => "You are already in this call.".to_string(),
            SessionError::Cancelled => "Joining was cancelled.".to_string(),
        }
    }

    /// Whether the user should be sent back to the lobby view.
    #[must_use]
    pub fn returns_to_lobby(&self) -> bool {
        matches!(
            self,
            SessionError::Token(_)
                | SessionError::Join(_)
                | SessionError::Capture(_)
                | SessionError::Publish(_)
                | SessionError::Cancelled
        )
    }
}
