//! Client-side metrics.
//!
//! Recorded through the `metrics` facade; the embedding application decides
//! whether to install a recorder. Without one every call is a no-op.
//!
//! Naming follows Prometheus conventions:
//! - `call_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! Labels are bounded: `outcome` (success/error/cancelled), `kind`
//! (audio/video), `event` (three engine event types), `enabled` (true/false),
//! `state` (four lifecycle states).

use crate::session::SessionState;
use common::types::MediaKind;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record the outcome of a join attempt.
///
/// Metric: `call_join_attempts_total`
/// Labels: `outcome`
pub fn record_join_attempt(outcome: &'static str) {
    counter!("call_join_attempts_total", "outcome" => outcome).increment(1);
}

/// Record a token fetch and its duration.
///
/// Metrics: `call_token_fetch_total`, `call_token_fetch_duration_seconds`
/// Labels: `outcome`
pub fn record_token_fetch(outcome: &'static str, duration: Duration) {
    counter!("call_token_fetch_total", "outcome" => outcome).increment(1);
    histogram!("call_token_fetch_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
}

/// Set the number of remote participants in the roster.
///
/// Metric: `call_remote_participants`
pub fn set_remote_participants(count: usize) {
    // usize to f64 is exact for realistic participant counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("call_remote_participants").set(count as f64);
}

/// Record a handled engine event.
///
/// Metric: `call_engine_events_total`
/// Labels: `event`
pub fn record_engine_event(event: &'static str) {
    counter!("call_engine_events_total", "event" => event).increment(1);
}

/// Record a local device toggle.
///
/// Metric: `call_device_toggles_total`
/// Labels: `kind`, `enabled`
pub fn record_device_toggle(kind: MediaKind, enabled: bool) {
    let enabled = if enabled { "true" } else { "false" };
    counter!("call_device_toggles_total", "kind" => kind.as_str(), "enabled" => enabled)
        .increment(1);
}

/// Record a session state transition.
///
/// Metric: `call_session_transitions_total`
/// Labels: `state` (the state entered)
pub fn record_state_transition(state: SessionState) {
    counter!("call_session_transitions_total", "state" => state.as_str()).increment(1);
}
