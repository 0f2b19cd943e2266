use std::sync::Arc;

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::download::HttpFetcher;
use crate::error::AppError;
use crate::events::{Reporter, EVENT_QUEUE_CAPACITY};
use crate::models::{RunId, RunOutcome};
use crate::processor::{ProgressTracker, RunController};
use crate::scraping::BrowserController;
use crate::shutdown::{setup_shutdown_handler, spawn_console_controls};

pub struct App {
    config: AppConfig,
}

impl App {
    pub fn new_with_config(config: AppConfig) -> Self {
        Self { config }
    }

    /// Runs one harvest against a live browser and returns its outcome.
    pub async fn run(self, run_id: RunId) -> Result<RunOutcome, AppError> {
        let browser_config = self.config.browser.clone();
        let run_config = self.config.into_run_config(run_id);

        let fetcher = Arc::new(HttpFetcher::new(
            &run_config.user_agent,
            run_config.retry.connect_timeout,
        )?);

        info!("Connecting to WebDriver at {}", browser_config.webdriver_url);
        let browser = BrowserController::connect(&browser_config).await?;

        let (reporter, events) = Reporter::channel(EVENT_QUEUE_CAPACITY);
        let controller = RunController::new(&browser, fetcher, run_config, reporter);
        let control = controller.control();
        setup_shutdown_handler(control.clone());
        spawn_console_controls(control);
        info!("Type 'pause', 'resume' or 'stop' and press Enter to control the run");

        let tracker = ProgressTracker::new();
        let (outcome, _) = tokio::join!(controller.run(), tracker.run(events));

        if let Err(e) = browser.shutdown().await {
            warn!("Browser did not close cleanly: {}", e);
        }
        Ok(outcome)
    }
}
