use std::collections::HashSet;

use tracing::{debug, warn};
use url::Url;

use crate::config::{SiteUrls, Timings};
use crate::error::AppError;
use crate::events::Reporter;
use crate::models::PostIdentifier;
use crate::scraping::driver::{navigate_within, settle, PageDriver, Query};
use crate::signal::RunSignal;

pub const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight);";
pub const PAGE_HEIGHT: &str = "return document.body.scrollHeight";
pub const POST_LINK_MARKER: &str = "/reel/";

/// Why collection stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    LimitReached,
    NoGrowth,
    ScrollExhausted,
    Cancelled,
}

/// Ordered set of identifiers: first-seen order, no repeats.
#[derive(Debug, Default)]
struct Discovered {
    order: Vec<PostIdentifier>,
    seen: HashSet<PostIdentifier>,
}

impl Discovered {
    fn insert(&mut self, id: PostIdentifier) -> bool {
        if self.seen.contains(&id) {
            return false;
        }
        self.seen.insert(id.clone());
        self.order.push(id);
        true
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

pub struct LinkCollector<'a, P: PageDriver + ?Sized> {
    page: &'a P,
    site: &'a SiteUrls,
    signal: &'a RunSignal,
    reporter: &'a Reporter,
    timings: &'a Timings,
}

impl<'a, P: PageDriver + ?Sized> LinkCollector<'a, P> {
    pub fn new(
        page: &'a P,
        site: &'a SiteUrls,
        signal: &'a RunSignal,
        reporter: &'a Reporter,
        timings: &'a Timings,
    ) -> Self {
        Self {
            page,
            site,
            signal,
            reporter,
            timings,
        }
    }

    pub async fn collect(
        &self,
        profile: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PostIdentifier>, AppError> {
        let (links, reason) = self.collect_with_reason(profile, limit).await?;
        debug!("Collection stopped: {:?}", reason);
        Ok(links)
    }

    pub async fn collect_with_reason(
        &self,
        profile: &str,
        limit: Option<usize>,
    ) -> Result<(Vec<PostIdentifier>, StopReason), AppError> {
        let profile_url = self.site.profile_reels(profile);
        navigate_within(self.page, &profile_url, self.timings.navigation_timeout)
            .await
            .map_err(|e| AppError::BrowserError(format!("could not open {profile_url}: {e}")))?;
        settle(self.timings.page_settle).await;

        let mut discovered = Discovered::default();
        let mut last_height = self.page_height().await;
        let mut passes_without_new = 0;

        let reason = loop {
            self.signal.wait_if_paused(self.timings.pause_poll).await;
            if self.signal.is_cancelled() {
                break StopReason::Cancelled;
            }

            let before = discovered.len();
            if self.scan(&mut discovered, limit).await {
                break StopReason::LimitReached;
            }

            if discovered.len() == before {
                passes_without_new += 1;
                if passes_without_new >= self.timings.stall_passes {
                    break StopReason::NoGrowth;
                }
            } else {
                passes_without_new = 0;
            }

            if self.page.run_script(SCROLL_TO_BOTTOM).await.is_err() {
                warn!("Scrolling failed, treating the feed as exhausted");
                break StopReason::ScrollExhausted;
            }
            settle(self.timings.scroll_settle).await;

            let new_height = self.page_height().await;
            if new_height == last_height {
                break StopReason::ScrollExhausted;
            }
            last_height = new_height;
        };

        let mut links = discovered.order;
        if let Some(limit) = limit {
            links.truncate(limit);
        }
        Ok((links, reason))
    }

    /// One pass over the anchors in the DOM. Returns true once `limit` is hit.
    async fn scan(&self, discovered: &mut Discovered, limit: Option<usize>) -> bool {
        let anchors = match self.page.find_elements(&Query::css("a")).await {
            Ok(anchors) => anchors,
            Err(e) => {
                debug!("Anchor scan failed: {}", e);
                return false;
            }
        };

        for anchor in &anchors {
            let Ok(Some(href)) = self.page.read_attribute(anchor, "href").await else {
                continue;
            };
            let Some(id) = self.post_identifier(&href) else {
                continue;
            };
            if discovered.insert(id) {
                let found = discovered.len();
                self.reporter.log(format!("Found {found} reels..."));
                self.reporter
                    .progress(found, limit.unwrap_or(100), "Collecting reels");
                if limit.is_some_and(|limit| found >= limit) {
                    return true;
                }
            }
        }
        false
    }

    fn post_identifier(&self, href: &str) -> Option<PostIdentifier> {
        if !href.contains(POST_LINK_MARKER) {
            return None;
        }
        let absolute = match Url::parse(href) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Url::parse(self.site.base()).ok()?.join(href).ok()?
            }
            Err(_) => return None,
        };
        Some(PostIdentifier::new(absolute.as_str()))
    }

    async fn page_height(&self) -> i64 {
        match self.page.run_script(PAGE_HEIGHT).await {
            Ok(value) => value.as_i64().unwrap_or(0),
            Err(e) => {
                debug!("Could not measure page height: {}", e);
                0
            }
        }
    }
}
