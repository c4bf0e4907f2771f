//! `SessionController` - owns one session's local participant, remote roster
//! and render targets, and sequences the media engine through the lifecycle.
//!
//! # Concurrency
//!
//! All operations take `&self` so a front end can hold the controller in an
//! `Arc` and call `leave`, `toggle_*` and `handle_event` while a `join` is
//! suspended. Mutable state sits behind one `std::sync::Mutex` that is only
//! held for synchronous sections, never across an engine or network await, so
//! a join future dropped mid-flight can always take it and clean up. Device
//! toggles are serialized per kind by their own async locks.
//!
//! # Cancellation
//!
//! Each join attempt carries a `CancellationToken`. `leave()` during `Joining`
//! cancels it and waits for the join to unwind: the join stops at its next
//! suspension point, releases whatever it acquired (tracks, targets, the
//! engine channel) and moves the session back to `Idle`.

use super::participant::{MediaSet, Participant, RemoteRoster};
use super::{SessionConfig, SessionSnapshot, SessionState};
use crate::engine::{EngineEvent, LocalTrack, LocalTracks, MediaEngine};
use crate::errors::SessionError;
use crate::layout::{compute_layout, LayoutMode};
use crate::metrics;
use crate::views::{DeviceState, Slot, ViewRegistry, ViewSurface};

use common::secret::ExposeSecret;
use common::token_client::TokenProvider;
use common::types::{MediaKind, ParticipantId, SessionId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// In-flight or established join attempt.
#[derive(Debug)]
struct JoinAttempt {
    session_id: SessionId,
    cancel: CancellationToken,
    /// Set while `MediaEngine::join` is in flight or after it succeeded; the
    /// engine must then be left during teardown.
    engine_joined: bool,
}

/// Everything a teardown has to release outside the state lock.
struct Teardown {
    session_id: Option<SessionId>,
    tracks: Option<LocalTracks>,
    engine_joined: bool,
    released_targets: usize,
}

/// Mutable session state, guarded by the controller's mutex.
struct SessionInner {
    state: SessionState,
    attempt: Option<JoinAttempt>,
    local: Option<Participant>,
    local_tracks: Option<LocalTracks>,
    remotes: RemoteRoster,
    views: ViewRegistry,
    layout: Option<LayoutMode>,
}

impl SessionInner {
    fn is_current(&self, session_id: SessionId) -> bool {
        self.attempt
            .as_ref()
            .is_some_and(|a| a.session_id == session_id && !a.cancel.is_cancelled())
    }

    /// Session id if remote events should be applied right now.
    ///
    /// Events are applied once the engine is in the channel: while `Joined`,
    /// and while `Joining` after the engine join completed.
    fn accepting_events(&self) -> Option<SessionId> {
        let attempt = self.attempt.as_ref()?;
        match self.state {
            SessionState::Joined => Some(attempt.session_id),
            SessionState::Joining if self.local.is_some() => Some(attempt.session_id),
            _ => None,
        }
    }

    /// Detach every session resource, releasing render targets in place.
    fn take_session(&mut self, engine_remotes: &[ParticipantId]) -> Teardown {
        let attempt = self.attempt.take();
        if let Some(attempt) = &attempt {
            attempt.cancel.cancel();
        }

        let mut released_targets = 0;
        for participant in engine_remotes {
            if self.views.release(participant) {
                released_targets += 1;
            }
        }
        released_targets += self.views.release_all();

        self.remotes.clear();
        self.local = None;
        self.layout = None;

        Teardown {
            session_id: attempt.as_ref().map(|a| a.session_id),
            tracks: self.local_tracks.take(),
            engine_joined: attempt.is_some_and(|a| a.engine_joined),
            released_targets,
        }
    }
}

/// Disarmed when `join` finishes; otherwise cleans up an abandoned attempt.
struct JoinGuard<'a> {
    controller: &'a SessionController,
    session_id: SessionId,
    armed: bool,
}

impl JoinGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for JoinGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.controller.abandon_attempt(self.session_id);
        }
    }
}

/// Client-side session controller.
pub struct SessionController {
    config: SessionConfig,
    tokens: Arc<dyn TokenProvider>,
    engine: Arc<dyn MediaEngine>,
    surface: Arc<dyn ViewSurface>,
    state_tx: watch::Sender<SessionState>,
    inner: Mutex<SessionInner>,
    camera_toggle: AsyncMutex<()>,
    mic_toggle: AsyncMutex<()>,
}

impl SessionController {
    /// Create an idle controller for one channel.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        tokens: Arc<dyn TokenProvider>,
        engine: Arc<dyn MediaEngine>,
        surface: Arc<dyn ViewSurface>,
    ) -> Self {
        let views = ViewRegistry::new(Arc::clone(&surface), config.profile);
        let (state_tx, _) = watch::channel(SessionState::Idle);

        Self {
            config,
            tokens,
            engine,
            surface,
            state_tx,
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                attempt: None,
                local: None,
                local_tracks: None,
                remotes: RemoteRoster::default(),
                views,
                layout: None,
            }),
            camera_toggle: AsyncMutex::new(()),
            mic_toggle: AsyncMutex::new(()),
        }
    }

    /// The configuration this controller was built with.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Receiver notified on every state transition.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Copy of the current session state.
    #[allow(clippy::unused_async)]
    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.lock();
        SessionSnapshot {
            state: inner.state,
            session_id: inner.attempt.as_ref().map(|a| a.session_id),
            local: inner.local.clone(),
            remotes: inner.remotes.participants().to_vec(),
            rendered: inner.views.participants(),
            layout: inner.layout,
        }
    }

    // =========================================================================
    // Join
    // =========================================================================

    /// Fetch a token, join the channel, capture and publish local tracks.
    ///
    /// Returns the local participant id.
    ///
    /// # Errors
    ///
    /// - `AlreadyInSession` if a session is joining, joined or leaving
    /// - `Token`, `Join`, `Capture`, `Publish` when the corresponding step fails
    /// - `Cancelled` when `leave()` aborted the join
    ///
    /// On any error the controller is back in `Idle` with nothing acquired.
    #[instrument(skip_all, fields(channel = %self.config.channel))]
    pub async fn join(&self) -> Result<ParticipantId, SessionError> {
        let (session_id, cancel) = self.begin_join()?;
        let guard = JoinGuard {
            controller: self,
            session_id,
            armed: true,
        };

        let result = self.run_join(session_id, &cancel).await;

        match &result {
            Ok(local_id) => {
                metrics::record_join_attempt("success");
                info!(
                    target: "call.session",
                    session_id = %session_id,
                    local_id = %local_id,
                    channel = %self.config.channel,
                    "Joined channel and published local tracks"
                );
            }
            Err(e) => {
                let outcome = if matches!(e, SessionError::Cancelled) {
                    "cancelled"
                } else {
                    "error"
                };
                metrics::record_join_attempt(outcome);
                warn!(
                    target: "call.session",
                    session_id = %session_id,
                    error = %e,
                    "Join failed, unwinding"
                );
                self.unwind_attempt(session_id).await;
            }
        }

        guard.disarm();
        result
    }

    fn begin_join(&self) -> Result<(SessionId, CancellationToken), SessionError> {
        let mut inner = self.lock();
        if inner.state != SessionState::Idle {
            warn!(
                target: "call.session",
                state = ?inner.state,
                "Join rejected, already in session"
            );
            return Err(SessionError::AlreadyInSession { state: inner.state });
        }

        let session_id = SessionId::new();
        let cancel = CancellationToken::new();
        inner.attempt = Some(JoinAttempt {
            session_id,
            cancel: cancel.clone(),
            engine_joined: false,
        });
        self.transition(&mut inner, SessionState::Joining);
        Ok((session_id, cancel))
    }

    async fn run_join(
        &self,
        session_id: SessionId,
        cancel: &CancellationToken,
    ) -> Result<ParticipantId, SessionError> {
        let policy = self.config.retry;
        let channel = self.config.channel.as_str();

        // Token
        let tokens = &self.tokens;
        let started = Instant::now();
        let token = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SessionError::Cancelled),
            result = policy.run("token_fetch", move || tokens.fetch_token(channel)) => result,
        };
        match &token {
            Ok(_) => metrics::record_token_fetch("success", started.elapsed()),
            Err(_) => metrics::record_token_fetch("error", started.elapsed()),
        }
        let token = token?;
        debug!(target: "call.session", session_id = %session_id, "Token fetched, joining channel");

        // Engine join. From here on teardown must leave the engine, even if
        // the join is interrupted before it reports back.
        {
            let mut inner = self.lock();
            match inner
                .attempt
                .as_mut()
                .filter(|a| a.session_id == session_id && !a.cancel.is_cancelled())
            {
                Some(attempt) => attempt.engine_joined = true,
                None => return Err(SessionError::Cancelled),
            }
        }

        let engine = &self.engine;
        let app_id = self.config.app_id.expose_secret();
        let token_str = token.expose_secret();
        let requested = self.config.local_id.as_ref();
        let joined = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = policy.run("engine_join", move || engine.join(app_id, channel, token_str, requested)) => Some(result),
        };

        let local_id = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let Some(attempt) = inner
                .attempt
                .as_mut()
                .filter(|a| a.session_id == session_id)
            else {
                return Err(SessionError::Cancelled);
            };

            match joined {
                None => return Err(SessionError::Cancelled),
                Some(Err(e)) => {
                    attempt.engine_joined = false;
                    return Err(SessionError::Join(e));
                }
                Some(Ok(local_id)) => {
                    if attempt.cancel.is_cancelled() {
                        return Err(SessionError::Cancelled);
                    }
                    inner.local = Some(Participant::local(local_id.clone()));
                    local_id
                }
            }
        };
        debug!(target: "call.session", session_id = %session_id, local_id = %local_id, "Engine joined, capturing devices");

        // Capture. Not raced against cancellation so the tracks are always
        // seen, and therefore closed, by this join.
        let tracks = self
            .engine
            .create_local_tracks()
            .await
            .map_err(SessionError::Capture)?;

        let local_target = {
            let mut inner = self.lock();
            if !inner.is_current(session_id) {
                tracks.close();
                return Err(SessionError::Cancelled);
            }
            inner.local_tracks = Some(tracks.clone());
            inner.views.register(&local_id, Slot::Local)
        };
        if let Err(e) = tracks.video.play(&local_target) {
            warn!(target: "call.session", error = %e, "Failed to render local video");
        }

        // Publish
        let to_publish = tracks.to_vec();
        let published = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SessionError::Cancelled),
            result = self.engine.publish(&to_publish) => result,
        };
        published.map_err(SessionError::Publish)?;

        let mut inner = self.lock();
        if !inner.is_current(session_id) {
            return Err(SessionError::Cancelled);
        }
        if let Some(local) = inner.local.as_mut() {
            local.media = MediaSet::all();
        }
        self.transition(&mut inner, SessionState::Joined);
        self.recompute_layout(&mut inner);

        Ok(local_id)
    }

    /// Release everything a failed or cancelled attempt acquired.
    ///
    /// Goes through `Leaving` only when the engine has to be left; an attempt
    /// that never reached the engine returns to `Idle` directly.
    async fn unwind_attempt(&self, session_id: SessionId) {
        let teardown = {
            let mut inner = self.lock();
            let Some(engine_joined) = inner
                .attempt
                .as_ref()
                .filter(|a| a.session_id == session_id)
                .map(|a| a.engine_joined)
            else {
                return;
            };
            if engine_joined {
                self.transition(&mut inner, SessionState::Leaving);
            }
            let teardown = inner.take_session(&self.engine.remote_participants());
            if !teardown.engine_joined {
                self.transition(&mut inner, SessionState::Idle);
            }
            teardown
        };

        let left_engine = teardown.engine_joined;
        self.finish_teardown(teardown).await;

        if left_engine {
            let mut inner = self.lock();
            self.transition(&mut inner, SessionState::Idle);
        }
    }

    /// Synchronous cleanup for a join future dropped before completion.
    ///
    /// Blocks on the state lock, which is only ever held for short
    /// synchronous sections.
    fn abandon_attempt(&self, session_id: SessionId) {
        let mut inner = self.lock();
        if inner.attempt.as_ref().map(|a| a.session_id) != Some(session_id) {
            // Dropped mid-unwind: resources are already detached
            if inner.attempt.is_none() && inner.state == SessionState::Leaving {
                self.transition(&mut inner, SessionState::Idle);
            }
            return;
        }

        let teardown = inner.take_session(&self.engine.remote_participants());
        self.transition(&mut inner, SessionState::Idle);
        drop(inner);

        if let Some(tracks) = &teardown.tracks {
            tracks.close();
        }
        if teardown.engine_joined {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let engine = Arc::clone(&self.engine);
                handle.spawn(async move {
                    if let Err(e) = engine.leave().await {
                        warn!(target: "call.session", error = %e, "Engine leave failed");
                    }
                });
            }
        }
        warn!(
            target: "call.session",
            session_id = %session_id,
            "Join abandoned before completion, session reset"
        );
    }

    // =========================================================================
    // Leave
    // =========================================================================

    /// Leave the channel and release every session resource.
    ///
    /// Safe in any state: a no-op when idle, an abort while joining. Teardown
    /// errors are logged and never returned. Completes once the session is
    /// back in `Idle`.
    #[instrument(skip_all, fields(channel = %self.config.channel))]
    pub async fn leave(&self) {
        let mut state_rx = self.state_tx.subscribe();

        let teardown = {
            let mut inner = self.lock();
            match inner.state {
                SessionState::Idle => {
                    debug!(target: "call.session", "Leave while idle, nothing to do");
                    return;
                }
                SessionState::Leaving => None,
                SessionState::Joining => {
                    // The suspended join unwinds its own resources
                    self.transition(&mut inner, SessionState::Leaving);
                    if let Some(attempt) = &inner.attempt {
                        attempt.cancel.cancel();
                    }
                    None
                }
                SessionState::Joined => {
                    self.transition(&mut inner, SessionState::Leaving);
                    Some(inner.take_session(&self.engine.remote_participants()))
                }
            }
        };

        match teardown {
            Some(teardown) => {
                self.finish_teardown(teardown).await;
                let mut inner = self.lock();
                self.transition(&mut inner, SessionState::Idle);
                drop(inner);
                info!(target: "call.session", channel = %self.config.channel, "Left channel");
            }
            None => {
                let _ = state_rx.wait_for(|s| *s == SessionState::Idle).await;
                debug!(target: "call.session", "Leave completed after join unwound");
            }
        }
    }

    async fn finish_teardown(&self, teardown: Teardown) {
        if let Some(tracks) = &teardown.tracks {
            tracks.close();
        }

        if teardown.engine_joined {
            if let Err(e) = self.engine.leave().await {
                warn!(
                    target: "call.session",
                    error = %e,
                    "Engine leave failed, continuing teardown"
                );
            }
        }

        debug!(
            target: "call.session",
            session_id = ?teardown.session_id,
            released_targets = teardown.released_targets,
            closed_tracks = teardown.tracks.is_some(),
            left_engine = teardown.engine_joined,
            "Session resources released"
        );
    }

    // =========================================================================
    // Remote events
    // =========================================================================

    /// Apply one engine event to the session.
    ///
    /// Events arriving while no channel is joined are ignored.
    ///
    /// # Errors
    ///
    /// Returns `Subscribe` if the engine fails to subscribe to a published
    /// track; the session stays as it was.
    #[instrument(skip_all, fields(event = event.label(), participant = %event.participant()))]
    pub async fn handle_event(&self, event: EngineEvent) -> Result<(), SessionError> {
        metrics::record_engine_event(event.label());
        match event {
            EngineEvent::UserPublished { participant, kind } => {
                self.on_user_published(participant, kind).await
            }
            EngineEvent::UserUnpublished { participant } | EngineEvent::UserLeft { participant } => {
                self.on_user_gone(&participant);
                Ok(())
            }
        }
    }

    async fn on_user_published(
        &self,
        participant: ParticipantId,
        kind: MediaKind,
    ) -> Result<(), SessionError> {
        let (session_id, epoch) = {
            let mut inner = self.lock();
            let Some(session_id) = inner.accepting_events() else {
                debug!(target: "call.session", state = ?inner.state, "Ignoring publish outside a session");
                return Ok(());
            };
            (session_id, inner.remotes.begin_publish(&participant))
        };

        let subscribed = self.engine.subscribe(&participant, kind).await;

        let mut inner = self.lock();
        // A session change already cleared the roster this publish was counted in
        let current = inner.accepting_events() == Some(session_id);
        let stale = !current || inner.remotes.end_publish(&participant, epoch);

        if let Err(source) = subscribed {
            warn!(
                target: "call.session",
                participant = %participant,
                kind = %kind,
                error = %source,
                "Subscribe failed"
            );
            return Err(SessionError::Subscribe {
                participant,
                kind,
                source,
            });
        }

        if stale {
            debug!(
                target: "call.session",
                participant = %participant,
                "Participant left or session changed during subscribe, dropping publish"
            );
            return Ok(());
        }

        let is_new = inner.remotes.add_media(&participant, kind);
        match kind {
            MediaKind::Video => {
                let target = inner.views.register(&participant, Slot::Remote);
                if let Err(e) = self.engine.play_remote_video(&participant, &target) {
                    warn!(target: "call.session", participant = %participant, error = %e, "Failed to render remote video");
                }
            }
            MediaKind::Audio => {
                if let Err(e) = self.engine.play_remote_audio(&participant) {
                    warn!(target: "call.session", participant = %participant, error = %e, "Failed to play remote audio");
                }
            }
        }

        debug!(
            target: "call.session",
            participant = %participant,
            kind = %kind,
            new_participant = is_new,
            "Remote track subscribed"
        );
        self.recompute_layout(&mut inner);
        Ok(())
    }

    fn on_user_gone(&self, participant: &ParticipantId) {
        let mut inner = self.lock();
        if inner.accepting_events().is_none() {
            debug!(target: "call.session", state = ?inner.state, "Ignoring unpublish outside a session");
            return;
        }

        let removed = inner.remotes.remove(participant).is_some();
        let released = inner.views.release(participant);
        debug!(
            target: "call.session",
            participant = %participant,
            removed,
            released,
            "Remote participant gone"
        );
        self.recompute_layout(&mut inner);
    }

    // =========================================================================
    // Device toggles
    // =========================================================================

    /// Enable or disable the local camera.
    ///
    /// Returns `Ok(None)` without touching the engine if there is no camera
    /// track.
    ///
    /// # Errors
    ///
    /// Returns `Toggle` if the track refuses the change; its state is unchanged.
    pub async fn toggle_camera(&self) -> Result<Option<DeviceState>, SessionError> {
        self.toggle(MediaKind::Video).await
    }

    /// Enable or disable the local microphone.
    ///
    /// Returns `Ok(None)` without touching the engine if there is no
    /// microphone track.
    ///
    /// # Errors
    ///
    /// Returns `Toggle` if the track refuses the change; its state is unchanged.
    pub async fn toggle_mic(&self) -> Result<Option<DeviceState>, SessionError> {
        self.toggle(MediaKind::Audio).await
    }

    async fn toggle(&self, kind: MediaKind) -> Result<Option<DeviceState>, SessionError> {
        // Serializes read and write per device
        let _serialized = match kind {
            MediaKind::Audio => self.mic_toggle.lock().await,
            MediaKind::Video => self.camera_toggle.lock().await,
        };

        let track: Option<Arc<dyn LocalTrack>> = {
            let inner = self.lock();
            inner.local_tracks.as_ref().map(|tracks| match kind {
                MediaKind::Audio => Arc::clone(&tracks.audio),
                MediaKind::Video => Arc::clone(&tracks.video),
            })
        };

        let Some(track) = track else {
            debug!(target: "call.session", kind = %kind, "No local track to toggle");
            return Ok(None);
        };

        let enable = !track.is_enabled();
        track.set_enabled(enable).await.map_err(|source| {
            warn!(target: "call.session", kind = %kind, error = %source, "Device toggle failed");
            SessionError::Toggle { kind, source }
        })?;

        let state = DeviceState::from_enabled(enable);
        self.surface.show_control(kind, state);
        metrics::record_device_toggle(kind, enable);
        debug!(target: "call.session", kind = %kind, state = ?state, "Device toggled");
        Ok(Some(state))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, inner: &mut SessionInner, next: SessionState) {
        let previous = inner.state;
        inner.state = next;
        self.state_tx.send_replace(next);
        metrics::record_state_transition(next);
        debug!(target: "call.session", from = ?previous, to = ?next, "Session state changed");
    }

    fn recompute_layout(&self, inner: &mut SessionInner) {
        let count = 1 + inner.remotes.len();
        let mode = compute_layout(count);
        inner.layout = Some(mode);
        self.surface.apply_layout(mode);
        metrics::set_remote_participants(inner.remotes.len());
        debug!(target: "call.session", participants = count, layout = ?mode, "Layout recomputed");
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
