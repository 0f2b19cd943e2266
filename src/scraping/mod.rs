pub mod browser;
pub mod collector;
pub mod driver;
pub mod login;
pub mod overlays;
pub mod resolver;

#[cfg(test)]
pub(crate) mod fake;

use collector::LinkCollector;
use login::establish_session;
use resolver::MediaResolver;

use crate::config::RunConfig;
use crate::error::AppError;
use crate::events::Reporter;
use crate::models::PostIdentifier;
use crate::signal::RunSignal;

pub use browser::BrowserController;
pub use driver::{DriverError, PageDriver, Query};

/// Everything that needs the page driver, used one step at a time.
pub struct Scraper<'a, P: PageDriver + ?Sized> {
    page: &'a P,
    config: &'a RunConfig,
    signal: RunSignal,
    reporter: Reporter,
}

impl<'a, P: PageDriver + ?Sized> Scraper<'a, P> {
    pub fn new(page: &'a P, config: &'a RunConfig, signal: RunSignal, reporter: Reporter) -> Self {
        Self {
            page,
            config,
            signal,
            reporter,
        }
    }

    pub async fn login(&self) -> Result<bool, AppError> {
        establish_session(
            self.page,
            &self.config.credentials,
            &self.config.site,
            &self.signal,
            &self.config.timings,
        )
        .await
    }

    pub async fn collect_links(&self) -> Result<Vec<PostIdentifier>, AppError> {
        self.reporter.log(format!(
            "Collecting reels from profile: {}",
            self.config.target_profile
        ));
        LinkCollector::new(
            self.page,
            &self.config.site,
            &self.signal,
            &self.reporter,
            &self.config.timings,
        )
        .collect(&self.config.target_profile, self.config.video_limit)
        .await
    }

    pub async fn resolve(&self, post: &PostIdentifier) -> Option<String> {
        MediaResolver::new(
            self.page,
            &self.signal,
            &self.reporter,
            &self.config.timings,
            self.config.retry.max_retries,
        )
        .resolve(post)
        .await
    }
}
