//! Bounded-parallel streaming downloads of resolved media.

pub mod fetcher;


use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::events::Reporter;
use crate::models::ResolvedMedia;
use crate::signal::RunSignal;

pub use fetcher::{FetchError, HttpFetcher, MediaFetcher, MediaStream};

const DEFAULT_PAUSE_POLL: Duration = Duration::from_millis(500);

/// Per-batch tally, keyed by media index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: Vec<usize>,
    pub failed: Vec<usize>,
    /// Never dispatched, or cut short by a stop. Counted as neither.
    pub abandoned: Vec<usize>,
}

impl BatchReport {
    pub fn counts(&self) -> (usize, usize) {
        (self.succeeded.len(), self.failed.len())
    }
}

enum ItemResult {
    Succeeded,
    Failed(FetchError),
    Abandoned,
}

pub struct DownloadEngine<F: MediaFetcher + ?Sized> {
    fetcher: Arc<F>,
    output_dir: PathBuf,
    max_parallel: usize,
    retry: RetryPolicy,
    signal: RunSignal,
    reporter: Reporter,
    pause_poll: Duration,
}

impl<F: MediaFetcher + ?Sized + 'static> DownloadEngine<F> {
    pub fn new(
        fetcher: Arc<F>,
        output_dir: impl Into<PathBuf>,
        max_parallel: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            fetcher,
            output_dir: output_dir.into(),
            max_parallel: max_parallel.max(1),
            retry,
            signal: RunSignal::default(),
            reporter: Reporter::silent(),
            pause_poll: DEFAULT_PAUSE_POLL,
        }
    }

    pub fn with_signal(mut self, signal: RunSignal) -> Self {
        self.signal = signal;
        self
    }

    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_pause_poll(mut self, poll: Duration) -> Self {
        self.pause_poll = poll;
        self
    }

    /// Downloads a batch with at most `max_parallel` transfers in flight.
    ///
    /// Returns once every dispatched transfer has finished.
    pub async fn download_all(&self, batch: Vec<ResolvedMedia>) -> BatchReport {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut tasks = JoinSet::new();
        let mut report = BatchReport::default();

        let mut dispatched = HashMap::new();

        for media in batch {
            if self.signal.is_cancelled() {
                report.abandoned.push(media.index);
                continue;
            }

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    report.abandoned.push(media.index);
                    continue;
                }
            };
            // A pause or stop may have arrived while waiting for a free slot.
            self.signal.wait_if_paused(self.pause_poll).await;
            if self.signal.is_cancelled() {
                report.abandoned.push(media.index);
                continue;
            }

            let job = DownloadJob {
                fetcher: Arc::clone(&self.fetcher),
                output_dir: self.output_dir.clone(),
                retry: self.retry.clone(),
                signal: self.signal.clone(),
            };
            let index = media.index;
            let handle = tasks.spawn(async move {
                let _permit = permit;
                let result = AssertUnwindSafe(job.run(&media))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        ItemResult::Failed(FetchError::Transport("download task panicked".into()))
                    });
                (media, result)
            });
            dispatched.insert(handle.id(), index);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (media, result) = match joined {
                Ok((id, done)) => {
                    dispatched.remove(&id);
                    done
                }
                Err(e) => {
                    warn!("Download task did not finish: {}", e);
                    if let Some(index) = dispatched.remove(&e.id()) {
                        if e.is_panic() {
                            report.failed.push(index);
                        } else {
                            report.abandoned.push(index);
                        }
                    }
                    continue;
                }
            };
            let (index, file_name) = (media.index, media.file_name());
            match result {
                ItemResult::Succeeded => {
                    self.reporter.log(format!("Downloaded: {file_name}"));
                    report.succeeded.push(index);
                }
                ItemResult::Failed(e) => {
                    self.reporter
                        .log(format!("Failed to download {file_name}: {e}"));
                    report.failed.push(index);
                }
                ItemResult::Abandoned => {
                    debug!("Abandoned {} after stop request", file_name);
                    report.abandoned.push(index);
                }
            }
        }

        report
    }
}

struct DownloadJob<F: ?Sized> {
    fetcher: Arc<F>,
    output_dir: PathBuf,
    retry: RetryPolicy,
    signal: RunSignal,
}

impl<F: MediaFetcher + ?Sized> DownloadJob<F> {
    async fn run(&self, media: &ResolvedMedia) -> ItemResult {
        let file_name = media.file_name();
        let target = self.output_dir.join(&file_name);
        let partial = self.output_dir.join(format!("{file_name}.part"));
        let attempts = self.retry.max_retries.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if self.signal.is_cancelled() {
                return ItemResult::Abandoned;
            }

            match self.attempt(&media.media_url, &partial).await {
                Ok(true) => {
                    return match tokio::fs::rename(&partial, &target).await {
                        Ok(()) => ItemResult::Succeeded,
                        Err(e) => {
                            discard(&partial).await;
                            ItemResult::Failed(e.into())
                        }
                    };
                }
                Ok(false) => {
                    discard(&partial).await;
                    return ItemResult::Abandoned;
                }
                Err(e) => {
                    discard(&partial).await;
                    warn!(
                        "Download attempt {}/{} for {} failed: {}",
                        attempt, attempts, file_name, e
                    );
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                tokio::select! {
                    _ = tokio::time::sleep(self.retry.retry_delay) => {}
                    _ = self.signal.cancelled() => {}
                }
            }
        }

        ItemResult::Failed(last_error.unwrap_or(FetchError::Timeout))
    }

    /// One transfer into `partial`. `Ok(false)` means a stop cut it short.
    async fn attempt(&self, url: &str, partial: &Path) -> Result<bool, FetchError> {
        let mut stream = tokio::time::timeout(self.retry.chunk_timeout, self.fetcher.open(url))
            .await
            .map_err(|_| FetchError::Timeout)??;
        if !stream.is_success() {
            return Err(FetchError::Status(stream.status));
        }

        let mut file = tokio::fs::File::create(partial).await?;
        loop {
            if self.signal.is_cancelled() {
                return Ok(false);
            }
            let next = tokio::time::timeout(self.retry.chunk_timeout, stream.body.next())
                .await
                .map_err(|_| FetchError::Timeout)?;
            match next {
                Some(chunk) => file.write_all(&chunk?).await?,
                None => break,
            }
        }
        file.flush().await?;
        Ok(true)
    }
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!("Could not remove {}: {}", path.display(), e);
        }
    }
}
