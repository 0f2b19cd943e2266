//! Cooperative pause/cancel state shared between a run and its caller.
//!
//! [`RunControl`] is the writing half and is handed out by the run
//! controller; every long-running component only ever sees a [`RunSignal`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::info;

#[derive(Default)]
struct SignalState {
    cancel_requested: AtomicBool,
    paused: AtomicBool,
    changed: Notify,
}

/// Read-only view of the run's pause/cancel flags.
#[derive(Clone, Default)]
pub struct RunSignal {
    state: Arc<SignalState>,
}

impl RunSignal {
    pub fn is_cancelled(&self) -> bool {
        self.state.cancel_requested.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }

    /// Blocks while the run is paused, polling every `poll`.
    ///
    /// Returns early as soon as a stop is requested; callers check
    /// [`is_cancelled`](Self::is_cancelled) afterwards.
    pub async fn wait_if_paused(&self, poll: Duration) {
        while self.is_paused() && !self.is_cancelled() {
            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                _ = self.state.changed.notified() => {}
            }
        }
    }

    /// Resolves once a stop has been requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.changed.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Writing half of the signal: pause, resume and stop requests.
///
/// All requests are fire-and-forget and idempotent. A stop is permanent for
/// the remainder of the run.
#[derive(Clone)]
pub struct RunControl {
    signal: RunSignal,
}

impl RunControl {
    pub(crate) fn new() -> Self {
        Self {
            signal: RunSignal::default(),
        }
    }

    pub fn signal(&self) -> RunSignal {
        self.signal.clone()
    }

    pub fn request_pause(&self) {
        if !self.signal.state.paused.swap(true, Ordering::SeqCst) {
            info!("Pause requested");
            self.signal.state.changed.notify_waiters();
        }
    }

    pub fn request_resume(&self) {
        if self.signal.state.paused.swap(false, Ordering::SeqCst) {
            info!("Resume requested");
            self.signal.state.changed.notify_waiters();
        }
    }

    pub fn request_stop(&self) {
        if !self.signal.state.cancel_requested.swap(true, Ordering::SeqCst) {
            info!("Stop requested, finishing in-flight work...");
            self.signal.state.changed.notify_waiters();
        }
    }
}
