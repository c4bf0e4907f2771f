//! Event pump feeding engine callbacks into the controller.

use super::SessionController;
use crate::engine::EngineEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Spawn a task that applies engine events to `controller` one at a time.
///
/// Events are handled in arrival order; a publish that is still subscribing
/// finishes before the next event for anyone is applied. The task exits when
/// `cancel` fires or the sender side is dropped.
pub fn spawn_event_pump(
    controller: Arc<SessionController>,
    mut events: mpsc::Receiver<EngineEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(target: "call.events", "Event pump started");
        let mut handled: u64 = 0;

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!(target: "call.events", "Event pump cancelled");
                    break;
                }

                event = events.recv() => {
                    let Some(event) = event else {
                        debug!(target: "call.events", "Engine event channel closed");
                        break;
                    };

                    let label = event.label();
                    if let Err(e) = controller.handle_event(event).await {
                        warn!(
                            target: "call.events",
                            event = label,
                            error = %e,
                            "Failed to apply engine event"
                        );
                    }
                    handled += 1;
                }
            }
        }

        info!(target: "call.events", handled, "Event pump stopped");
    })
}
