//! Log and progress events flowing from a run to whoever presents it.
//!
//! The reporter never blocks the pipeline: events are pushed onto a bounded
//! channel with `try_send` and the presenter drains it on its own schedule.

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::models::{RunOutcome, RunState};

pub const EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum RunEvent {
    Log(String),
    Progress {
        current: usize,
        total: usize,
        status: String,
    },
    StateChanged(RunState),
    Finished(RunOutcome),
}

#[derive(Clone, Default)]
pub struct Reporter {
    tx: Option<mpsc::Sender<RunEvent>>,
}

impl Reporter {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RunEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// A reporter that only traces.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.emit(RunEvent::Log(message));
    }

    pub fn progress(&self, current: usize, total: usize, status: impl Into<String>) {
        self.emit(RunEvent::Progress {
            current,
            total,
            status: status.into(),
        });
    }

    pub(crate) fn state_changed(&self, state: &RunState) {
        self.emit(RunEvent::StateChanged(state.clone()));
    }

    pub(crate) fn finished(&self, outcome: &RunOutcome) {
        self.emit(RunEvent::Finished(outcome.clone()));
    }

    fn emit(&self, event: RunEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                debug!("Event queue full, dropping {:?}", event);
            }
            // Nobody is listening any more; the run carries on regardless.
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
