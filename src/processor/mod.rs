pub mod progress_tracker;
pub mod summary;


pub use progress_tracker::ProgressTracker;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::config::RunConfig;
use crate::download::{BatchReport, DownloadEngine, MediaFetcher};
use crate::error::AppError;
use crate::events::Reporter;
use crate::models::{FailureReason, PostIdentifier, ResolvedMedia, RunOutcome, RunState, Terminal};
use crate::scraping::{PageDriver, Scraper};
use crate::signal::{RunControl, RunSignal};

/// Tracks the current phase and announces every change.
struct Phase {
    state: RunState,
    reporter: Reporter,
}

impl Phase {
    fn advance(&mut self, next: RunState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(&next) {
            warn!("Ignoring transition {} -> {}", self.state, next);
            return;
        }
        debug!("Run state: {} -> {}", self.state, next);
        self.state = next;
        self.reporter.state_changed(&self.state);
    }
}

/// Counters accumulated batch by batch.
#[derive(Default)]
struct Tally {
    total_found: usize,
    succeeded: usize,
    failed: Vec<PostIdentifier>,
    abandoned: Vec<PostIdentifier>,
}

impl Tally {
    fn absorb(&mut self, report: &BatchReport, posts: &[PostIdentifier]) {
        self.succeeded += report.succeeded.len();
        self.failed
            .extend(report.failed.iter().map(|&index| posts[index - 1].clone()));
        self.abandoned
            .extend(report.abandoned.iter().map(|&index| posts[index - 1].clone()));
    }
}

/// Drives one run from login to summary.
pub struct RunController<'a, P: PageDriver + ?Sized, F: MediaFetcher + ?Sized> {
    page: &'a P,
    fetcher: Arc<F>,
    config: RunConfig,
    reporter: Reporter,
    control: RunControl,
}

impl<'a, P, F> RunController<'a, P, F>
where
    P: PageDriver + ?Sized,
    F: MediaFetcher + ?Sized + 'static,
{
    pub fn new(page: &'a P, fetcher: Arc<F>, config: RunConfig, reporter: Reporter) -> Self {
        Self {
            page,
            fetcher,
            config,
            reporter,
            control: RunControl::new(),
        }
    }

    /// Handle for pausing, resuming or stopping this run from elsewhere.
    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    /// Runs to a terminal state. Errors and panics end the run as failures
    /// instead of propagating.
    pub async fn run(self) -> RunOutcome {
        let started = Instant::now();
        let mut phase = Phase {
            state: RunState::Idle,
            reporter: self.reporter.clone(),
        };
        let mut tally = Tally::default();

        let result = AssertUnwindSafe(self.execute(&mut phase, &mut tally))
            .catch_unwind()
            .await;

        let terminal = match result {
            Ok(Ok(terminal)) => terminal,
            Ok(Err(e)) => {
                error!("Run failed: {}", e);
                self.reporter.log(format!("Error: {e}"));
                Terminal::Failure(FailureReason::Unexpected(e.to_string()))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Run panicked: {}", message);
                self.reporter.log(format!("Error: {message}"));
                Terminal::Failure(FailureReason::Unexpected(message))
            }
        };

        let summarized = phase.state == RunState::Summarizing;
        phase.advance(RunState::Terminal(terminal.clone()));

        let outcome = RunOutcome {
            run_id: self.config.run_id.clone(),
            state: terminal,
            total_found: tally.total_found,
            total_succeeded: tally.succeeded,
            total_failed: tally.failed.len(),
            failed_identifiers: tally.failed,
            abandoned_identifiers: tally.abandoned,
            elapsed: started.elapsed(),
            output_dir: self.config.output_dir.clone(),
        };

        if summarized {
            for line in summary::summary_lines(&outcome) {
                self.reporter.log(line);
            }
        }
        self.reporter.finished(&outcome);
        outcome
    }

    async fn execute(&self, phase: &mut Phase, tally: &mut Tally) -> Result<Terminal, AppError> {
        let signal = self.control.signal();
        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        phase.advance(RunState::Authenticating);
        let scraper = Scraper::new(self.page, &self.config, signal.clone(), self.reporter.clone());
        match scraper.login().await {
            Ok(true) => {}
            Ok(false) => {
                self.reporter.log("Login failed");
                return Ok(Terminal::Failure(FailureReason::LoginRejected));
            }
            Err(AppError::LoginFormNotFound) => {
                self.reporter.log("Login form not found");
                return Ok(Terminal::Failure(FailureReason::LoginFormNotFound));
            }
            Err(e) => return Err(e),
        }
        if signal.is_cancelled() {
            return Ok(Terminal::Cancelled);
        }

        phase.advance(RunState::Collecting);
        let posts = scraper.collect_links().await?;
        tally.total_found = posts.len();
        if posts.is_empty() {
            if signal.is_cancelled() {
                return Ok(Terminal::Cancelled);
            }
            self.reporter.log("No reels found");
            return Ok(Terminal::Failure(FailureReason::NoPostsFound));
        }
        self.reporter
            .log(format!("Found {} reels to download", posts.len()));

        let engine = DownloadEngine::new(
            Arc::clone(&self.fetcher),
            &self.config.output_dir,
            self.config.max_parallel,
            self.config.retry.clone(),
        )
        .with_signal(signal.clone())
        .with_reporter(self.reporter.clone())
        .with_pause_poll(self.config.timings.pause_poll);

        let batch_size = self.config.batch_size.max(1);
        for (batch_no, batch) in posts.chunks(batch_size).enumerate() {
            let offset = batch_no * batch_size;
            phase.advance(RunState::Resolving);
            let resolved = self.resolve_batch(&scraper, &signal, batch, offset, posts.len(), tally).await;

            if !resolved.is_empty() {
                phase.advance(RunState::Downloading);
                let report = engine.download_all(resolved).await;
                tally.absorb(&report, &posts);
            }

            if signal.is_cancelled() {
                tally
                    .abandoned
                    .extend(posts[offset + batch.len()..].iter().cloned());
                break;
            }
        }

        phase.advance(RunState::Summarizing);
        Ok(if signal.is_cancelled() {
            Terminal::Cancelled
        } else {
            Terminal::Success
        })
    }

    /// Resolves one batch; index `offset + 1` is the first post's rank.
    async fn resolve_batch(
        &self,
        scraper: &Scraper<'_, P>,
        signal: &RunSignal,
        batch: &[PostIdentifier],
        offset: usize,
        total: usize,
        tally: &mut Tally,
    ) -> Vec<ResolvedMedia> {
        let mut resolved = Vec::with_capacity(batch.len());

        for (i, post) in batch.iter().enumerate() {
            signal.wait_if_paused(self.config.timings.pause_poll).await;
            if signal.is_cancelled() {
                tally.abandoned.extend(batch[i..].iter().cloned());
                break;
            }

            let index = offset + i + 1;
            self.reporter
                .progress(index, total, format!("Processing reel {index}/{total}"));
            match scraper.resolve(post).await {
                Some(url) => resolved.push(ResolvedMedia::new(index, url)),
                None if signal.is_cancelled() => tally.abandoned.push(post.clone()),
                None => tally.failed.push(post.clone()),
            }
        }
        resolved
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}
