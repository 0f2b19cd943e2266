use std::time::Duration;

use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::events::RunEvent;
use crate::models::{RunOutcome, RunState};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn format_log_line(at: DateTime<Local>, message: &str) -> String {
    format!("[{}] {}", at.format("%H:%M:%S"), message)
}

/// Renders run events on the terminal.
pub struct ProgressTracker {
    pb: ProgressBar,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let pb = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner} [{elapsed_precise}] [{bar:30}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.set_message("Starting...");
        pb.enable_steady_tick(POLL_INTERVAL);

        Self { pb }
    }

    /// Drains `events` every 100 ms until the run finishes or every
    /// sender is gone.
    pub async fn run(self, mut events: mpsc::Receiver<RunEvent>) -> Option<RunOutcome> {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        loop {
            ticker.tick().await;
            loop {
                match events.try_recv() {
                    Ok(RunEvent::Finished(outcome)) => {
                        self.complete(&outcome);
                        return Some(outcome);
                    }
                    Ok(event) => self.handle(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.pb.abandon();
                        return None;
                    }
                }
            }
        }
    }

    fn handle(&self, event: RunEvent) {
        match event {
            RunEvent::Log(line) => self.pb.println(format_log_line(Local::now(), &line)),
            RunEvent::Progress {
                current,
                total,
                status,
            } => {
                self.pb.set_length(total as u64);
                self.pb.set_position(current as u64);
                self.pb.set_message(status);
            }
            RunEvent::StateChanged(state) => self.pb.set_message(state.to_string()),
            RunEvent::Finished(outcome) => self.complete(&outcome),
        }
    }

    fn complete(&self, outcome: &RunOutcome) {
        self.pb.finish_with_message(format!(
            "{} in {:.2} seconds",
            RunState::Terminal(outcome.state.clone()),
            outcome.elapsed.as_secs_f32()
        ));
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
