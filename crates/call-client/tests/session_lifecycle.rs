//! Integration tests for the session lifecycle.
//!
//! Drives `SessionController` through join, leave, failures and cancellation
//! against the mock engine, token provider and surface.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use call_client::engine::{EngineError, EngineEvent, LocalTrack};
use call_client::errors::SessionError;
use call_client::layout::LayoutMode;
use call_client::session::{Role, SessionState};
use call_client::views::{elements, ViewProfile};
use call_test_utils::*;
use common::retry::RetryPolicy;
use common::token_client::TokenError;
use common::types::{MediaKind, ParticipantId};

// ============================================================================
// Join / Leave
// ============================================================================

#[tokio::test]
async fn test_join_publishes_local_tracks() {
    let session = TestSession::builder()
        .engine(MockMediaEngine::builder().assign_id(1000u32).build())
        .build();

    let local_id = session.controller.join().await.unwrap();

    assert_eq!(local_id, ParticipantId::from(1000u32));
    assert_eq!(session.controller.state(), SessionState::Joined);
    assert_eq!(session.tokens.channels(), vec![TEST_CHANNEL.to_string()]);

    let calls = session.engine.calls();
    assert_eq!(
        calls.first(),
        Some(&EngineCall::Join {
            app_id: TEST_APP_ID.to_string(),
            channel: TEST_CHANNEL.to_string(),
            token: TEST_TOKEN.to_string(),
            local_id: None,
        })
    );
    assert!(calls.contains(&EngineCall::Publish {
        kinds: vec![MediaKind::Audio, MediaKind::Video],
    }));

    let snapshot = session.controller.snapshot().await;
    let local = snapshot.local.expect("local participant");
    assert_eq!(local.id, local_id);
    assert_eq!(local.role, Role::Local);
    assert!(local.media.contains(MediaKind::Audio));
    assert!(local.media.contains(MediaKind::Video));
    assert!(snapshot.remotes.is_empty());
    assert_eq!(snapshot.rendered, vec![local_id]);
    assert_eq!(snapshot.layout, Some(LayoutMode::SingleOrPairView));

    // Local video plays into the room page's local player
    assert_eq!(session.surface.mounted_elements(), vec![elements::LOCAL_PLAYER]);
    let camera = session.engine.track(MediaKind::Video).unwrap();
    assert_eq!(camera.played_into(), vec![elements::LOCAL_PLAYER.to_string()]);
}

#[tokio::test]
async fn test_join_passes_requested_local_id() {
    let session = TestSession::builder()
        .config(test_session_config().with_local_id(77u32))
        .profile(ViewProfile::Basic)
        .build();

    let local_id = session.controller.join().await.unwrap();

    assert_eq!(local_id, ParticipantId::from(77u32));
    assert!(session.engine.calls().contains(&EngineCall::Join {
        app_id: TEST_APP_ID.to_string(),
        channel: TEST_CHANNEL.to_string(),
        token: TEST_TOKEN.to_string(),
        local_id: Some(ParticipantId::from(77u32)),
    }));
    // Basic profile names the container after the uid
    assert_eq!(session.surface.mounted_elements(), vec!["77".to_string()]);
}

#[tokio::test]
async fn test_leave_from_idle_makes_no_engine_calls() {
    let session = TestSession::new();

    session.controller.leave().await;

    assert_eq!(session.controller.state(), SessionState::Idle);
    assert!(session.engine.calls().is_empty());
    assert!(session.surface.events().is_empty());
    assert_eq!(session.tokens.call_count(), 0);
}

#[tokio::test]
async fn test_join_then_leave_restores_pristine_state() {
    let session = TestSession::new();

    session.controller.join().await.unwrap();
    session.controller.leave().await;

    assert_eq!(session.controller.state(), SessionState::Idle);
    assert!(session.controller.snapshot().await.is_pristine());
    assert!(session.engine.all_tracks_closed());
    assert_eq!(session.engine.leave_count(), 1);
    assert!(!session.engine.in_channel());
    assert!(session.surface.mounted().is_empty());

    // Second leave is a no-op
    session.controller.leave().await;
    assert_eq!(session.engine.leave_count(), 1);
}

#[tokio::test]
async fn test_leave_releases_engine_known_remotes() {
    let session = TestSession::builder()
        .engine(
            MockMediaEngine::builder()
                .with_remote_participants(vec![ParticipantId::from(42u32)])
                .build(),
        )
        .build();

    session.controller.join().await.unwrap();
    session
        .controller
        .handle_event(call_client::engine::EngineEvent::UserPublished {
            participant: ParticipantId::from(42u32),
            kind: MediaKind::Video,
        })
        .await
        .unwrap();
    assert_eq!(session.surface.mounted().len(), 2);

    session.controller.leave().await;

    assert!(session.surface.mounted().is_empty());
    assert!(session.controller.snapshot().await.is_pristine());
}

#[tokio::test]
async fn test_rejoin_after_leave_starts_new_session() {
    let session = TestSession::new();

    session.controller.join().await.unwrap();
    let first = session.controller.snapshot().await.session_id.unwrap();
    session.controller.leave().await;

    session.controller.join().await.unwrap();
    let second = session.controller.snapshot().await.session_id.unwrap();

    assert_ne!(first, second);
    assert_eq!(session.engine.join_count(), 2);
    assert_eq!(session.controller.state(), SessionState::Joined);
}

#[tokio::test]
async fn test_leave_succeeds_even_if_engine_leave_fails() {
    let session = TestSession::builder()
        .engine(
            MockMediaEngine::builder()
                .fail_leave(EngineError::Transport("socket closed".into()))
                .build(),
        )
        .build();

    session.controller.join().await.unwrap();
    session.controller.leave().await;

    assert_eq!(session.controller.state(), SessionState::Idle);
    assert!(session.controller.snapshot().await.is_pristine());
    assert!(session.engine.all_tracks_closed());
}

#[tokio::test]
async fn test_state_changes_are_broadcast() {
    let session = TestSession::new();
    let mut state_rx = session.controller.subscribe_state();
    assert_eq!(*state_rx.borrow_and_update(), SessionState::Idle);

    session.controller.join().await.unwrap();
    assert!(state_rx.has_changed().unwrap());
    assert_eq!(*state_rx.borrow_and_update(), SessionState::Joined);

    session.controller.leave().await;
    assert_eq!(*state_rx.borrow_and_update(), SessionState::Idle);
}

// ============================================================================
// Re-entrancy
// ============================================================================

#[tokio::test]
async fn test_join_while_joined_is_rejected() {
    let session = TestSession::new();
    session.controller.join().await.unwrap();

    let err = session.controller.join().await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::AlreadyInSession {
            state: SessionState::Joined
        }
    ));
    assert_eq!(session.engine.join_count(), 1);
    assert_eq!(session.tokens.call_count(), 1);
    assert_eq!(session.controller.state(), SessionState::Joined);
}

#[tokio::test]
async fn test_join_while_joining_is_rejected() {
    let session = TestSession::builder()
        .tokens(MockTokenProvider::held())
        .build();

    let controller = Arc::clone(&session.controller);
    let first = tokio::spawn(async move { controller.join().await });
    session.tokens.gate().entered().await;

    let err = session.controller.join().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::AlreadyInSession {
            state: SessionState::Joining
        }
    ));
    assert_eq!(session.tokens.call_count(), 1);

    session.tokens.gate().release();
    first.await.unwrap().unwrap();
    assert_eq!(session.controller.state(), SessionState::Joined);
    assert_eq!(session.engine.join_count(), 1);
}

// ============================================================================
// Join Failures
// ============================================================================

#[tokio::test]
async fn test_token_failure_skips_engine() {
    let session = TestSession::builder()
        .tokens(MockTokenProvider::failing(TokenError::Status { status: 500 }))
        .build();

    let err = session.controller.join().await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Token(TokenError::Status { status: 500 })
    ));
    assert!(err.returns_to_lobby());
    assert!(session.engine.calls().is_empty());
    assert_eq!(session.controller.state(), SessionState::Idle);
    assert!(session.controller.snapshot().await.is_pristine());
}

#[tokio::test]
async fn test_engine_join_failure_returns_to_idle() {
    let session = TestSession::builder()
        .engine(
            MockMediaEngine::builder()
                .fail_join(EngineError::Rejected("invalid token".into()))
                .build(),
        )
        .build();

    let err = session.controller.join().await.unwrap_err();

    assert!(matches!(err, SessionError::Join(EngineError::Rejected(_))));
    assert_eq!(session.controller.state(), SessionState::Idle);
    assert!(session.engine.tracks().is_empty());
    assert_eq!(session.engine.leave_count(), 0);
    assert!(session.controller.snapshot().await.is_pristine());
}

#[tokio::test]
async fn test_camera_failure_releases_microphone_and_leaves() {
    let session = TestSession::builder()
        .engine(
            MockMediaEngine::builder()
                .fail_camera(EngineError::PermissionDenied("camera".into()))
                .build(),
        )
        .build();

    let err = session.controller.join().await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Capture(EngineError::PermissionDenied(_))
    ));
    assert_eq!(
        err.client_message(),
        "Camera or microphone access was denied."
    );

    let microphone = session.engine.track(MediaKind::Audio).unwrap();
    assert!(microphone.is_closed());
    assert!(session.engine.track(MediaKind::Video).is_none());
    assert_eq!(session.engine.leave_count(), 1);
    assert_eq!(session.engine.publish_count(), 0);
    assert_eq!(session.controller.state(), SessionState::Idle);
    assert!(session.controller.snapshot().await.is_pristine());
}

#[tokio::test]
async fn test_microphone_failure_leaves_engine() {
    let session = TestSession::builder()
        .engine(
            MockMediaEngine::builder()
                .fail_microphone(EngineError::DeviceUnavailable("no microphone".into()))
                .build(),
        )
        .build();

    let err = session.controller.join().await.unwrap_err();

    assert!(matches!(err, SessionError::Capture(_)));
    assert!(session.engine.tracks().is_empty());
    assert_eq!(
        session.engine.count(|c| matches!(c, EngineCall::CreateCamera)),
        0
    );
    assert_eq!(session.engine.leave_count(), 1);
    assert!(session.controller.snapshot().await.is_pristine());
}

#[tokio::test]
async fn test_publish_failure_releases_everything() {
    let session = TestSession::builder()
        .engine(
            MockMediaEngine::builder()
                .fail_publish(EngineError::Transport("publish timeout".into()))
                .build(),
        )
        .build();

    let err = session.controller.join().await.unwrap_err();

    assert!(matches!(err, SessionError::Publish(_)));
    assert!(session.engine.all_tracks_closed());
    assert_eq!(session.engine.leave_count(), 1);
    assert!(session.surface.mounted().is_empty());
    assert_eq!(session.surface.mount_count(), session.surface.unmount_count());
    assert!(session.controller.snapshot().await.is_pristine());
}

// ============================================================================
// Leave While Joining
// ============================================================================

#[tokio::test]
async fn test_leave_during_token_fetch_cancels_join() {
    let session = TestSession::builder()
        .tokens(MockTokenProvider::held())
        .build();

    let controller = Arc::clone(&session.controller);
    let join = tokio::spawn(async move { controller.join().await });
    session.tokens.gate().entered().await;

    session.controller.leave().await;

    let err = join.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::Cancelled));
    assert!(session.engine.calls().is_empty());
    assert_eq!(session.controller.state(), SessionState::Idle);
    assert!(session.controller.snapshot().await.is_pristine());
}

#[tokio::test]
async fn test_leave_during_engine_join_leaves_engine() {
    let session = TestSession::builder()
        .engine(MockMediaEngine::builder().hold_join().build())
        .build();

    let controller = Arc::clone(&session.controller);
    let join = tokio::spawn(async move { controller.join().await });
    session.engine.join_gate().entered().await;

    session.controller.leave().await;

    let err = join.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::Cancelled));
    assert_eq!(session.engine.leave_count(), 1);
    assert!(session.engine.tracks().is_empty());
    assert!(session.controller.snapshot().await.is_pristine());
}

#[tokio::test]
async fn test_leave_during_capture_closes_captured_tracks() {
    let session = TestSession::builder()
        .engine(MockMediaEngine::builder().hold_camera().build())
        .build();

    let controller = Arc::clone(&session.controller);
    let join = tokio::spawn(async move { controller.join().await });
    session.engine.camera_gate().entered().await;

    let mut state_rx = session.controller.subscribe_state();
    let controller = Arc::clone(&session.controller);
    let leave = tokio::spawn(async move { controller.leave().await });
    state_rx
        .wait_for(|s| *s == SessionState::Leaving)
        .await
        .unwrap();

    // Capture completes after the leave; the join must still release it
    session.engine.camera_gate().release();

    let err = join.await.unwrap().unwrap_err();
    leave.await.unwrap();

    assert!(matches!(err, SessionError::Cancelled));
    assert_eq!(session.engine.tracks().len(), 2);
    assert!(session.engine.all_tracks_closed());
    assert_eq!(session.engine.publish_count(), 0);
    assert_eq!(session.engine.leave_count(), 1);
    assert!(session.surface.mounted().is_empty());
    assert!(session.controller.snapshot().await.is_pristine());
}

#[tokio::test]
async fn test_leave_during_publish_releases_local_target() {
    let session = TestSession::builder()
        .engine(MockMediaEngine::builder().hold_publish().build())
        .build();

    let controller = Arc::clone(&session.controller);
    let join = tokio::spawn(async move { controller.join().await });
    session.engine.publish_gate().entered().await;
    assert_eq!(session.surface.mounted_elements(), vec![elements::LOCAL_PLAYER]);

    session.controller.leave().await;

    let err = join.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::Cancelled));
    assert!(session.engine.all_tracks_closed());
    assert_eq!(session.engine.leave_count(), 1);
    assert!(session.surface.mounted().is_empty());
    assert!(session.controller.snapshot().await.is_pristine());
}

#[tokio::test]
async fn test_aborted_join_task_resets_session() {
    let session = TestSession::builder()
        .engine(MockMediaEngine::builder().hold_join().build())
        .build();

    let controller = Arc::clone(&session.controller);
    let join = tokio::spawn(async move { controller.join().await });
    session.engine.join_gate().entered().await;

    join.abort();
    assert!(join.await.unwrap_err().is_cancelled());

    assert_eq!(session.controller.state(), SessionState::Idle);
    assert!(session.controller.snapshot().await.is_pristine());

    // Engine leave runs on a spawned task
    for _ in 0..10 {
        if session.engine.leave_count() == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(session.engine.leave_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_aborted_join_cleans_up_while_state_is_locked() {
    let session = TestSession::builder()
        .engine(MockMediaEngine::builder().hold_publish().build())
        .surface(RecordingSurface::with_layout_delay(Duration::from_millis(200)))
        .build();

    let controller = Arc::clone(&session.controller);
    let join = tokio::spawn(async move { controller.join().await });
    session.engine.publish_gate().entered().await;

    // A remote publish lands mid-join; its layout pass holds the state lock
    let controller = Arc::clone(&session.controller);
    let event = tokio::spawn(async move {
        controller
            .handle_event(EngineEvent::UserPublished {
                participant: ParticipantId::from(42u32),
                kind: MediaKind::Audio,
            })
            .await
    });
    while session.surface.layouts().is_empty() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    join.abort();
    assert!(join.await.unwrap_err().is_cancelled());
    event.await.unwrap().unwrap();

    assert_eq!(session.controller.state(), SessionState::Idle);
    assert!(session.engine.all_tracks_closed());
    assert!(session.surface.mounted().is_empty());
    tokio::time::timeout(Duration::from_secs(2), session.controller.leave())
        .await
        .expect("leave does not hang");
    assert!(session.controller.snapshot().await.is_pristine());

    for _ in 0..100 {
        if session.engine.leave_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(session.engine.leave_count(), 1);

    session.engine.publish_gate().release();
    session.controller.join().await.unwrap();
    assert_eq!(session.controller.state(), SessionState::Joined);
}

// ============================================================================
// Retry
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_engine_join_retried_under_policy() {
    let session = TestSession::builder()
        .config(
            test_session_config()
                .with_retry(RetryPolicy::with_retries(3, Duration::from_millis(100))),
        )
        .engine(
            MockMediaEngine::builder()
                .fail_join_times(2, EngineError::Transport("connection reset".into()))
                .build(),
        )
        .build();

    let started = tokio::time::Instant::now();
    session.controller.join().await.unwrap();

    assert_eq!(session.engine.join_count(), 3);
    assert_eq!(session.tokens.call_count(), 1);
    // 100ms + 200ms of backoff
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(session.controller.state(), SessionState::Joined);
}

#[tokio::test(start_paused = true)]
async fn test_token_fetch_retry_exhausted() {
    let session = TestSession::builder()
        .config(
            test_session_config()
                .with_retry(RetryPolicy::with_retries(2, Duration::from_millis(50))),
        )
        .tokens(MockTokenProvider::failing(TokenError::Http(
            "connection refused".into(),
        )))
        .build();

    let err = session.controller.join().await.unwrap_err();

    assert!(matches!(err, SessionError::Token(TokenError::Http(_))));
    assert_eq!(session.tokens.call_count(), 2);
    assert_eq!(session.engine.join_count(), 0);
    assert!(session.controller.snapshot().await.is_pristine());
}

#[tokio::test]
async fn test_default_policy_does_not_retry() {
    let session = TestSession::builder()
        .tokens(MockTokenProvider::failing_times(
            1,
            TokenError::Status { status: 503 },
        ))
        .build();

    assert!(session.controller.join().await.is_err());
    assert_eq!(session.tokens.call_count(), 1);

    // The provider recovers; a fresh join succeeds
    session.controller.join().await.unwrap();
    assert_eq!(session.tokens.call_count(), 2);
}

// ============================================================================
// Device Toggles
// ============================================================================

#[tokio::test]
async fn test_toggle_without_tracks_is_noop() {
    let session = TestSession::new();

    assert_eq!(session.controller.toggle_camera().await.unwrap(), None);
    assert_eq!(session.controller.toggle_mic().await.unwrap(), None);

    assert!(session.engine.calls().is_empty());
    assert!(session.surface.controls().is_empty());
}

#[tokio::test]
async fn test_toggle_camera_flips_state() {
    let session = TestSession::new();
    session.controller.join().await.unwrap();

    let state = session.controller.toggle_camera().await.unwrap();
    assert_eq!(state, Some(call_client::views::DeviceState::Off));
    assert!(!session.engine.track(MediaKind::Video).unwrap().is_enabled());

    let state = session.controller.toggle_camera().await.unwrap();
    assert_eq!(state, Some(call_client::views::DeviceState::On));
    assert!(session.engine.track(MediaKind::Video).unwrap().is_enabled());

    assert_eq!(
        session.surface.controls(),
        vec![
            (MediaKind::Video, call_client::views::DeviceState::Off),
            (MediaKind::Video, call_client::views::DeviceState::On),
        ]
    );
    // Mic untouched
    assert!(session.engine.track(MediaKind::Audio).unwrap().is_enabled());
}

#[tokio::test]
async fn test_toggle_failure_leaves_device_unchanged() {
    let session = TestSession::builder()
        .engine(MockMediaEngine::builder().fail_toggle().build())
        .build();
    session.controller.join().await.unwrap();

    let err = session.controller.toggle_mic().await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Toggle {
            kind: MediaKind::Audio,
            ..
        }
    ));
    assert!(session.engine.track(MediaKind::Audio).unwrap().is_enabled());
    assert!(session.surface.controls().is_empty());
    assert_eq!(session.controller.state(), SessionState::Joined);
}

#[tokio::test]
async fn test_toggle_after_leave_is_noop() {
    let session = TestSession::new();
    session.controller.join().await.unwrap();
    session.controller.leave().await;

    assert_eq!(session.controller.toggle_camera().await.unwrap(), None);
    assert!(session.surface.controls().is_empty());
}

#[tokio::test]
async fn test_concurrent_camera_toggles_both_apply() {
    let session = TestSession::builder()
        .engine(MockMediaEngine::builder().hold_toggle().build())
        .build();
    session.controller.join().await.unwrap();

    let controller = Arc::clone(&session.controller);
    let first = tokio::spawn(async move { controller.toggle_camera().await });
    session.engine.toggle_gate().entered().await;

    let controller = Arc::clone(&session.controller);
    let second = tokio::spawn(async move { controller.toggle_camera().await });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    session.engine.toggle_gate().release();

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert_eq!(first, Some(call_client::views::DeviceState::Off));
    assert_eq!(second, Some(call_client::views::DeviceState::On));
    assert!(session.engine.track(MediaKind::Video).unwrap().is_enabled());
    assert_eq!(
        session.surface.controls(),
        vec![
            (MediaKind::Video, call_client::views::DeviceState::Off),
            (MediaKind::Video, call_client::views::DeviceState::On),
        ]
    );
}
