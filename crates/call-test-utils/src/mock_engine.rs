//! Mock media engine for session controller testing.
//!
//! Provides a `MediaEngine` that can be configured to:
//! - Assign a local participant id, or echo the requested one
//! - Fail join, capture, publish, subscribe or leave
//! - Hold join, camera capture, publish, subscribe or track toggles at a [`Gate`]
//! - Report remote participants the engine knows about
//!
//! Every call is recorded as an [`EngineCall`] and every captured track is
//! kept so tests can check it was closed.
//!
//! # Example
//!
//! ```rust,ignore
//! use call_test_utils::MockMediaEngine;
//!
//! let engine = MockMediaEngine::builder()
//!     .assign_id(42u32)
//!     .fail_camera(EngineError::PermissionDenied("camera".into()))
//!     .build();
//! ```

use crate::gate::Gate;
use async_trait::async_trait;
use call_client::engine::{EngineError, LocalTrack, MediaEngine};
use call_client::views::RenderTarget;
use common::types::{MediaKind, ParticipantId};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// A call made on the mock engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Join {
        app_id: String,
        channel: String,
        token: String,
        local_id: Option<ParticipantId>,
    },
    CreateMicrophone,
    CreateCamera,
    Publish {
        kinds: Vec<MediaKind>,
    },
    Subscribe {
        participant: ParticipantId,
        kind: MediaKind,
    },
    PlayRemoteVideo {
        participant: ParticipantId,
        element_id: String,
    },
    PlayRemoteAudio {
        participant: ParticipantId,
    },
    Leave,
}

// =============================================================================
// MockLocalTrack
// =============================================================================

/// Captured track that records its lifecycle.
#[derive(Debug)]
pub struct MockLocalTrack {
    kind: MediaKind,
    enabled: AtomicBool,
    closed: AtomicBool,
    fail_toggle: AtomicBool,
    toggle_gate: Arc<Gate>,
    played_into: Mutex<Vec<String>>,
}

impl MockLocalTrack {
    pub fn new(kind: MediaKind) -> Self {
        Self::with_toggle_gate(kind, Arc::new(Gate::open()))
    }

    /// Track whose `set_enabled` passes `gate` before applying the change.
    pub fn with_toggle_gate(kind: MediaKind, toggle_gate: Arc<Gate>) -> Self {
        Self {
            kind,
            enabled: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            fail_toggle: AtomicBool::new(false),
            toggle_gate,
            played_into: Mutex::new(Vec::new()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Make `set_enabled` fail from now on.
    pub fn set_fail_toggle(&self, fail: bool) {
        self.fail_toggle.store(fail, Ordering::SeqCst);
    }

    /// Element ids this track was played into.
    pub fn played_into(&self) -> Vec<String> {
        self.played_into.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalTrack for MockLocalTrack {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn set_enabled(&self, enabled: bool) -> Result<(), EngineError> {
        self.toggle_gate.pass().await;
        if self.fail_toggle.load(Ordering::SeqCst) {
            return Err(EngineError::DeviceUnavailable(format!(
                "{} device busy",
                self.kind
            )));
        }
        self.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn play(&self, target: &RenderTarget) -> Result<(), EngineError> {
        self.played_into
            .lock()
            .unwrap()
            .push(target.element_id.clone());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// =============================================================================
// MockMediaEngine
// =============================================================================

/// Scriptable media engine.
#[derive(Debug)]
pub struct MockMediaEngine {
    assigned_id: ParticipantId,
    join_failure: Option<EngineError>,
    join_failures_remaining: AtomicU32,
    microphone_failure: Option<EngineError>,
    camera_failure: Option<EngineError>,
    publish_failure: Option<EngineError>,
    subscribe_failure: Option<EngineError>,
    leave_failure: Option<EngineError>,
    fail_toggle: bool,
    join_gate: Gate,
    camera_gate: Gate,
    publish_gate: Gate,
    subscribe_gate: Gate,
    toggle_gate: Arc<Gate>,
    in_channel: AtomicBool,
    calls: Mutex<Vec<EngineCall>>,
    tracks: Mutex<Vec<Arc<MockLocalTrack>>>,
    remote_participants: Mutex<Vec<ParticipantId>>,
}

impl Default for MockMediaEngine {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl MockMediaEngine {
    /// Create a new MockMediaEngine builder.
    pub fn builder() -> MockMediaEngineBuilder {
        MockMediaEngineBuilder::default()
    }

    /// Create an engine where every call succeeds.
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    pub fn join_count(&self) -> usize {
        self.count(|c| matches!(c, EngineCall::Join { .. }))
    }

    pub fn leave_count(&self) -> usize {
        self.count(|c| matches!(c, EngineCall::Leave))
    }

    pub fn publish_count(&self) -> usize {
        self.count(|c| matches!(c, EngineCall::Publish { .. }))
    }

    pub fn subscribe_count(&self) -> usize {
        self.count(|c| matches!(c, EngineCall::Subscribe { .. }))
    }

    /// Whether a join succeeded and no leave followed.
    pub fn in_channel(&self) -> bool {
        self.in_channel.load(Ordering::SeqCst)
    }

    /// Every track captured so far, in capture order.
    pub fn tracks(&self) -> Vec<Arc<MockLocalTrack>> {
        self.tracks.lock().unwrap().clone()
    }

    /// Captured track of `kind`, most recent first.
    pub fn track(&self, kind: MediaKind) -> Option<Arc<MockLocalTrack>> {
        self.tracks
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|t| t.kind == kind)
            .cloned()
    }

    /// Whether every captured track has been closed.
    pub fn all_tracks_closed(&self) -> bool {
        self.tracks.lock().unwrap().iter().all(|t| t.is_closed())
    }

    pub fn set_remote_participants(&self, participants: Vec<ParticipantId>) {
        *self.remote_participants.lock().unwrap() = participants;
    }

    pub fn join_gate(&self) -> &Gate {
        &self.join_gate
    }

    pub fn camera_gate(&self) -> &Gate {
        &self.camera_gate
    }

    pub fn publish_gate(&self) -> &Gate {
        &self.publish_gate
    }

    pub fn subscribe_gate(&self) -> &Gate {
        &self.subscribe_gate
    }

    /// Gate shared by every captured track's `set_enabled`.
    pub fn toggle_gate(&self) -> &Gate {
        &self.toggle_gate
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn capture(&self, kind: MediaKind) -> Arc<dyn LocalTrack> {
        let track = Arc::new(MockLocalTrack::with_toggle_gate(
            kind,
            Arc::clone(&self.toggle_gate),
        ));
        track.set_fail_toggle(self.fail_toggle);
        self.tracks.lock().unwrap().push(Arc::clone(&track));
        track
    }
}

#[async_trait]
impl MediaEngine for MockMediaEngine {
    async fn join(
        &self,
        app_id: &str,
        channel: &str,
        token: &str,
        local_id: Option<&ParticipantId>,
    ) -> Result<ParticipantId, EngineError> {
        self.record(EngineCall::Join {
            app_id: app_id.to_string(),
            channel: channel.to_string(),
            token: token.to_string(),
            local_id: local_id.cloned(),
        });
        self.join_gate.pass().await;

        if let Some(error) = &self.join_failure {
            let remaining = self.join_failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.join_failures_remaining
                    .store(remaining.saturating_sub(1), Ordering::SeqCst);
                return Err(error.clone());
            }
        }

        self.in_channel.store(true, Ordering::SeqCst);
        Ok(local_id.cloned().unwrap_or_else(|| self.assigned_id.clone()))
    }

    async fn create_microphone_track(&self) -> Result<Arc<dyn LocalTrack>, EngineError> {
        self.record(EngineCall::CreateMicrophone);
        if let Some(error) = &self.microphone_failure {
            return Err(error.clone());
        }
        Ok(self.capture(MediaKind::Audio))
    }

    async fn create_camera_track(&self) -> Result<Arc<dyn LocalTrack>, EngineError> {
        self.record(EngineCall::CreateCamera);
        self.camera_gate.pass().await;
        if let Some(error) = &self.camera_failure {
            return Err(error.clone());
        }
        Ok(self.capture(MediaKind::Video))
    }

    async fn publish(&self, tracks: &[Arc<dyn LocalTrack>]) -> Result<(), EngineError> {
        self.record(EngineCall::Publish {
            kinds: tracks.iter().map(|t| t.kind()).collect(),
        });
        self.publish_gate.pass().await;
        match &self.publish_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn subscribe(
        &self,
        participant: &ParticipantId,
        kind: MediaKind,
    ) -> Result<(), EngineError> {
        self.record(EngineCall::Subscribe {
            participant: participant.clone(),
            kind,
        });
        self.subscribe_gate.pass().await;
        match &self.subscribe_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn play_remote_video(
        &self,
        participant: &ParticipantId,
        target: &RenderTarget,
    ) -> Result<(), EngineError> {
        self.record(EngineCall::PlayRemoteVideo {
            participant: participant.clone(),
            element_id: target.element_id.clone(),
        });
        Ok(())
    }

    fn play_remote_audio(&self, participant: &ParticipantId) -> Result<(), EngineError> {
        self.record(EngineCall::PlayRemoteAudio {
            participant: participant.clone(),
        });
        Ok(())
    }

    fn remote_participants(&self) -> Vec<ParticipantId> {
        self.remote_participants.lock().unwrap().clone()
    }

    async fn leave(&self) -> Result<(), EngineError> {
        self.record(EngineCall::Leave);
        self.in_channel.store(false, Ordering::SeqCst);
        match &self.leave_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Builder for MockMediaEngine configuration.
#[derive(Debug)]
pub struct MockMediaEngineBuilder {
    assigned_id: ParticipantId,
    join_failure: Option<(EngineError, u32)>,
    microphone_failure: Option<EngineError>,
    camera_failure: Option<EngineError>,
    publish_failure: Option<EngineError>,
    subscribe_failure: Option<EngineError>,
    leave_failure: Option<EngineError>,
    fail_toggle: bool,
    hold_join: bool,
    hold_camera: bool,
    hold_publish: bool,
    hold_subscribe: bool,
    hold_toggle: bool,
    remote_participants: Vec<ParticipantId>,
}

impl Default for MockMediaEngineBuilder {
    fn default() -> Self {
        Self {
            assigned_id: ParticipantId::from(1000u32),
            join_failure: None,
            microphone_failure: None,
            camera_failure: None,
            publish_failure: None,
            subscribe_failure: None,
            leave_failure: None,
            fail_toggle: false,
            hold_join: false,
            hold_camera: false,
            hold_publish: false,
            hold_subscribe: false,
            hold_toggle: false,
            remote_participants: Vec::new(),
        }
    }
}

impl MockMediaEngineBuilder {
    /// Id returned by `join` when the caller requests none.
    pub fn assign_id(mut self, id: impl Into<ParticipantId>) -> Self {
        self.assigned_id = id.into();
        self
    }

    /// Fail every join.
    pub fn fail_join(mut self, error: EngineError) -> Self {
        self.join_failure = Some((error, u32::MAX));
        self
    }

    /// Fail the first `times` joins, then succeed.
    pub fn fail_join_times(mut self, times: u32, error: EngineError) -> Self {
        self.join_failure = Some((error, times));
        self
    }

    pub fn fail_microphone(mut self, error: EngineError) -> Self {
        self.microphone_failure = Some(error);
        self
    }

    pub fn fail_camera(mut self, error: EngineError) -> Self {
        self.camera_failure = Some(error);
        self
    }

    pub fn fail_publish(mut self, error: EngineError) -> Self {
        self.publish_failure = Some(error);
        self
    }

    pub fn fail_subscribe(mut self, error: EngineError) -> Self {
        self.subscribe_failure = Some(error);
        self
    }

    pub fn fail_leave(mut self, error: EngineError) -> Self {
        self.leave_failure = Some(error);
        self
    }

    /// Captured tracks refuse to be toggled.
    pub fn fail_toggle(mut self) -> Self {
        self.fail_toggle = true;
        self
    }

    pub fn hold_join(mut self) -> Self {
        self.hold_join = true;
        self
    }

    pub fn hold_camera(mut self) -> Self {
        self.hold_camera = true;
        self
    }

    pub fn hold_publish(mut self) -> Self {
        self.hold_publish = true;
        self
    }

    pub fn hold_subscribe(mut self) -> Self {
        self.hold_subscribe = true;
        self
    }

    /// Hold `set_enabled` on captured tracks.
    pub fn hold_toggle(mut self) -> Self {
        self.hold_toggle = true;
        self
    }

    pub fn with_remote_participants(mut self, participants: Vec<ParticipantId>) -> Self {
        self.remote_participants = participants;
        self
    }

    /// Build the MockMediaEngine.
    pub fn build(self) -> MockMediaEngine {
        let gate = |held: bool| if held { Gate::held() } else { Gate::open() };
        let (join_failure, join_failures_remaining) = match self.join_failure {
            Some((error, times)) => (Some(error), times),
            None => (None, 0),
        };

        MockMediaEngine {
            assigned_id: self.assigned_id,
            join_failure,
            join_failures_remaining: AtomicU32::new(join_failures_remaining),
            microphone_failure: self.microphone_failure,
            camera_failure: self.camera_failure,
            publish_failure: self.publish_failure,
            subscribe_failure: self.subscribe_failure,
            leave_failure: self.leave_failure,
            fail_toggle: self.fail_toggle,
            join_gate: gate(self.hold_join),
            camera_gate: gate(self.hold_camera),
            publish_gate: gate(self.hold_publish),
            subscribe_gate: gate(self.hold_subscribe),
            toggle_gate: Arc::new(gate(self.hold_toggle)),
            in_channel: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            tracks: Mutex::new(Vec::new()),
            remote_participants: Mutex::new(self.remote_participants),
        }
    }
}
