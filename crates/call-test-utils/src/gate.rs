//! Gates for holding a mocked async call at its suspension point.
//!
//! ```rust,ignore
//! let engine = MockMediaEngine::builder().hold_join().build();
//! let join = tokio::spawn(async move { controller.join().await });
//!
//! engine.join_gate().entered().await; // join is now suspended in the engine
//! controller.leave().await;
//! ```

use tokio::sync::{watch, Notify};

/// A suspension point that is either open or held until released.
#[derive(Debug)]
pub struct Gate {
    entered: Notify,
    open: watch::Sender<bool>,
}

impl Gate {
    /// A gate that lets every caller through.
    pub fn open() -> Self {
        Self::new(true)
    }

    /// A gate that holds callers until [`Gate::release`].
    pub fn held() -> Self {
        Self::new(false)
    }

    fn new(open: bool) -> Self {
        let (tx, _) = watch::channel(open);
        Self {
            entered: Notify::new(),
            open: tx,
        }
    }

    /// Called by the mock: signal arrival, then wait until the gate is open.
    pub async fn pass(&self) {
        self.entered.notify_one();
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }

    /// Wait until a caller reached the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let current and future callers through.
    pub fn release(&self) {
        self.open.send_replace(true);
    }

    pub fn is_open(&self) -> bool {
        *self.open.borrow()
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::open()
    }
}
