use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::Timings;
use crate::events::Reporter;
use crate::models::PostIdentifier;
use crate::scraping::driver::{navigate_within, settle, wait_for, DriverError, PageDriver, Query};
use crate::signal::RunSignal;

static MP4_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https://[^"]+\.mp4[^"]*"#).expect("valid mp4 pattern"));
static M3U8_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https://[^"]+\.m3u8[^"]*"#).expect("valid m3u8 pattern"));
static VIDEO_URL_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""video_url":"([^"]+)""#).expect("valid video_url pattern"));

/// What one look at a rendered post page captured.
#[derive(Debug, Clone, Default)]
pub struct PageState {
    pub video_src: Option<String>,
    pub markup: Option<String>,
}

pub type Strategy = fn(&PageState) -> Option<String>;

/// Extraction strategies in priority order; the first hit wins.
pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("video element", video_element_source),
    ("mp4 in markup", markup_mp4),
    ("m3u8 in markup", markup_m3u8),
    ("video_url field", markup_video_url_field),
];

pub fn video_element_source(state: &PageState) -> Option<String> {
    state
        .video_src
        .as_deref()
        .filter(|src| src.starts_with("http://") || src.starts_with("https://"))
        .map(str::to_string)
}

pub fn markup_mp4(state: &PageState) -> Option<String> {
    first_match(&MP4_URL, state.markup.as_deref()?, 0)
}

pub fn markup_m3u8(state: &PageState) -> Option<String> {
    first_match(&M3U8_URL, state.markup.as_deref()?, 0)
}

pub fn markup_video_url_field(state: &PageState) -> Option<String> {
    first_match(&VIDEO_URL_FIELD, state.markup.as_deref()?, 1).map(|url| url.replace("\\/", "/"))
}

fn first_match(pattern: &Regex, markup: &str, group: usize) -> Option<String> {
    let captures = pattern.captures(markup)?;
    Some(unescape_ampersands(captures.get(group)?.as_str()))
}

/// Undoes the ampersand escaping that embedded JSON and HTML apply to URLs.
pub fn unescape_ampersands(url: &str) -> String {
    url.replace("\\u0026", "&").replace("&amp;", "&")
}

/// Runs the strategy chain over one page state.
pub fn extract_media_url(state: &PageState) -> Option<(&'static str, String)> {
    STRATEGIES
        .iter()
        .find_map(|(name, strategy)| strategy(state).map(|url| (*name, url)))
}

pub struct MediaResolver<'a, P: PageDriver + ?Sized> {
    page: &'a P,
    signal: &'a RunSignal,
    reporter: &'a Reporter,
    timings: &'a Timings,
    max_retries: u32,
}

impl<'a, P: PageDriver + ?Sized> MediaResolver<'a, P> {
    pub fn new(
        page: &'a P,
        signal: &'a RunSignal,
        reporter: &'a Reporter,
        timings: &'a Timings,
        max_retries: u32,
    ) -> Self {
        Self {
            page,
            signal,
            reporter,
            timings,
            max_retries: max_retries.max(1),
        }
    }

    /// Finds a fetchable media URL for `post`, or `None` once retries run out
    /// or a stop is requested.
    pub async fn resolve(&self, post: &PostIdentifier) -> Option<String> {
        for attempt in 1..=self.max_retries {
            if self.signal.is_cancelled() {
                return None;
            }

            match self.attempt(post).await {
                Ok(Some(url)) => return Some(url),
                Ok(None) => debug!("No media found on {} (attempt {})", post, attempt),
                Err(e) if attempt == self.max_retries => {
                    self.reporter
                        .log(format!("Failed to extract video URL from {post}: {e}"));
                }
                Err(e) => warn!(
                    "Retry {}/{} for {}: {}",
                    attempt, self.max_retries, post, e
                ),
            }

            if attempt < self.max_retries && !self.signal.is_cancelled() {
                settle(self.backoff(attempt)).await;
            }
        }

        self.reporter.log(format!("Could not resolve {post}"));
        None
    }

    async fn attempt(&self, post: &PostIdentifier) -> Result<Option<String>, DriverError> {
        navigate_within(self.page, post.as_str(), self.timings.navigation_timeout).await?;
        settle(self.timings.post_settle).await;

        for probe in 1..=self.timings.probes_per_attempt {
            if self.signal.is_cancelled() {
                return Ok(None);
            }
            let state = self.capture().await;
            if let Some((strategy, url)) = extract_media_url(&state) {
                debug!("Resolved {} via {}", post, strategy);
                return Ok(Some(url));
            }
            if probe < self.timings.probes_per_attempt {
                settle(self.timings.probe_interval).await;
            }
        }
        Ok(None)
    }

    async fn capture(&self) -> PageState {
        let mut state = PageState::default();

        if let Some(videos) = wait_for(self.page, &Query::css("video"), self.timings.element_wait).await {
            for video in &videos {
                if let Ok(Some(src)) = self.page.read_attribute(video, "src").await {
                    state.video_src = Some(src);
                    break;
                }
            }
        }

        match self.page.raw_markup().await {
            Ok(markup) => state.markup = Some(markup),
            Err(e) => debug!("Could not read page markup: {}", e),
        }
        state
    }

    fn backoff(&self, attempt: u32) -> std::time::Duration {
        backoff_delay(self.timings.retry_backoff, attempt)
    }
}

/// `base * 2^(attempt-1)`, saturating at `Duration::MAX`.
fn backoff_delay(base: std::time::Duration, attempt: u32) -> std::time::Duration {
    base.checked_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
        .unwrap_or(std::time::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn markup(html: &str) -> PageState {
        PageState {
            video_src: None,
            markup: Some(html.to_string()),
        }
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        let base = Duration::from_secs(2);
        assert_eq!(backoff_delay(base, 1), base);
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(8));
        assert_eq!(backoff_delay(Duration::from_secs(u64::MAX / 2), 3), Duration::MAX);
        assert_eq!(backoff_delay(Duration::from_secs(u64::MAX), 2), Duration::MAX);
    }

    #[test]
    fn element_source_must_be_absolute() {
        let state = PageState {
            video_src: Some("blob:https://example.test/abc".into()),
            markup: None,
        };
        assert_eq!(video_element_source(&state), None);
    }

    #[test]
    fn mp4_outranks_an_earlier_m3u8() {
        let state = markup(r#""https://cdn.test/list.m3u8" "https://cdn.test/a.mp4?x=1""#);
        assert_eq!(
            extract_media_url(&state),
            Some(("mp4 in markup", "https://cdn.test/a.mp4?x=1".to_string()))
        );
    }

    #[test]
    fn m3u8_is_used_when_no_mp4_is_present() {
        let state = markup(r#"<source src="https://cdn.test/live/index.m3u8?token=1">"#);
        assert_eq!(
            markup_m3u8(&state).as_deref(),
            Some("https://cdn.test/live/index.m3u8?token=1")
        );
        assert_eq!(markup_mp4(&state), None);
    }

    #[test]
    fn video_url_field_is_unescaped() {
        let state = markup(r#"{"video_url":"https:\/\/cdn.test\/v?a=1\u0026b=2"}"#);
        assert_eq!(
            markup_video_url_field(&state).as_deref(),
            Some("https://cdn.test/v?a=1&b=2")
        );
        assert_eq!(
            extract_media_url(&state).map(|(name, _)| name),
            Some("video_url field")
        );
    }

    #[test]
    fn html_entities_are_unescaped() {
        assert_eq!(
            unescape_ampersands("https://cdn.test/v.mp4?a=1&amp;b=2"),
            "https://cdn.test/v.mp4?a=1&b=2"
        );
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert_eq!(extract_media_url(&PageState::default()), None);
    }
}
