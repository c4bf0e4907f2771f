//! Media engine abstraction.
//!
//! The engine is the real-time audio/video SDK: it joins channels, captures
//! local devices, publishes and subscribes tracks. Everything behind these
//! traits (codecs, transport, SFU routing) is out of this crate's hands; the
//! session controller only sequences calls and reacts to [`EngineEvent`]s.

use crate::views::RenderTarget;
use async_trait::async_trait;
use common::types::{MediaKind, ParticipantId};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Errors reported by a media engine or one of its tracks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The engine refused the request (bad token, bad app id, ...).
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The runtime denied access to a capture device.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The capture device is missing or busy.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Network or signaling failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The engine or track has already been closed.
    #[error("Engine closed")]
    Closed,
}

/// Asynchronous notifications emitted by the engine about remote participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A remote participant published a track of the given kind.
    UserPublished {
        participant: ParticipantId,
        kind: MediaKind,
    },
    /// A remote participant stopped publishing.
    UserUnpublished { participant: ParticipantId },
    /// A remote participant left the channel or dropped.
    UserLeft { participant: ParticipantId },
}

impl EngineEvent {
    /// Participant the event is about.
    #[must_use]
    pub fn participant(&self) -> &ParticipantId {
        match self {
            EngineEvent::UserPublished { participant, .. }
            | EngineEvent::UserUnpublished { participant }
            | EngineEvent::UserLeft { participant } => participant,
        }
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            EngineEvent::UserPublished { .. } => "user_published",
            EngineEvent::UserUnpublished { .. } => "user_unpublished",
            EngineEvent::UserLeft { .. } => "user_left",
        }
    }
}

/// A locally captured track (microphone or camera).
#[async_trait]
pub trait LocalTrack: Send + Sync {
    /// Media kind of the track.
    fn kind(&self) -> MediaKind;

    /// Whether the track currently sends media.
    fn is_enabled(&self) -> bool;

    /// Enable or disable sending without releasing the device.
    async fn set_enabled(&self, enabled: bool) -> Result<(), EngineError>;

    /// Render the track into a target (video only; audio tracks ignore this).
    fn play(&self, target: &RenderTarget) -> Result<(), EngineError>;

    /// Stop capture and release the device.
    fn close(&self);
}

/// Microphone and camera tracks captured for a session.
#[derive(Clone)]
pub struct LocalTracks {
    pub audio: Arc<dyn LocalTrack>,
    pub video: Arc<dyn LocalTrack>,
}

impl LocalTracks {
    /// Both tracks in publish order (audio first).
    #[must_use]
    pub fn to_vec(&self) -> Vec<Arc<dyn LocalTrack>> {
        vec![Arc::clone(&self.audio), Arc::clone(&self.video)]
    }

    /// Close both tracks.
    pub fn close(&self) {
        self.audio.close();
        self.video.close();
    }
}

impl std::fmt::Debug for LocalTracks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTracks")
            .field("audio_enabled", &self.audio.is_enabled())
            .field("video_enabled", &self.video.is_enabled())
            .finish()
    }
}

/// Capabilities the session controller consumes from the SDK.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Join `channel` with `token`.
    ///
    /// `local_id` requests a specific participant id; `None` lets the engine
    /// assign one. Returns the id the local participant ended up with.
    async fn join(
        &self,
        app_id: &str,
        channel: &str,
        token: &str,
        local_id: Option<&ParticipantId>,
    ) -> Result<ParticipantId, EngineError>;

    /// Capture the microphone.
    async fn create_microphone_track(&self) -> Result<Arc<dyn LocalTrack>, EngineError>;

    /// Capture the camera.
    async fn create_camera_track(&self) -> Result<Arc<dyn LocalTrack>, EngineError>;

    /// Capture microphone then camera.
    ///
    /// If the camera fails the already captured microphone is closed, so a
    /// failure never leaves a device handle behind.
    async fn create_local_tracks(&self) -> Result<LocalTracks, EngineError> {
        let audio = self.create_microphone_track().await?;
        match self.create_camera_track().await {
            Ok(video) => Ok(LocalTracks { audio, video }),
            Err(e) => {
                warn!(
                    target: "call.engine",
                    error = %e,
                    "Camera capture failed, releasing microphone"
                );
                audio.close();
                Err(e)
            }
        }
    }

    /// Publish local tracks to the channel.
    async fn publish(&self, tracks: &[Arc<dyn LocalTrack>]) -> Result<(), EngineError>;

    /// Subscribe to a remote participant's track.
    async fn subscribe(
        &self,
        participant: &ParticipantId,
        kind: MediaKind,
    ) -> Result<(), EngineError>;

    /// Render a subscribed remote video track into a target.
    fn play_remote_video(
        &self,
        participant: &ParticipantId,
        target: &RenderTarget,
    ) -> Result<(), EngineError>;

    /// Start playback of a subscribed remote audio track.
    fn play_remote_audio(&self, participant: &ParticipantId) -> Result<(), EngineError>;

    /// Remote participants the engine currently knows about.
    fn remote_participants(&self) -> Vec<ParticipantId>;

    /// Leave the channel.
    async fn leave(&self) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let event = EngineEvent::UserPublished {
            participant: ParticipantId::from(42u32),
            kind: MediaKind::Video,
        };
        assert_eq!(event.participant(), &ParticipantId::from("42"));
        assert_eq!(event.label(), "user_published");

        let left = EngineEvent::UserLeft {
            participant: ParticipantId::from("bob"),
        };
        assert_eq!(left.label(), "user_left");
    }

    #[test]
    fn test_engine_error_display() {
        assert_eq!(
            EngineError::PermissionDenied("camera".to_string()).to_string(),
            "Permission denied: camera"
        );
        assert_eq!(EngineError::Closed.to_string(), "Engine closed");
    }
}
