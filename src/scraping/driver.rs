use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("element not found: {0}")]
    NotFound(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("script failed: {0}")]
    Script(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("browser session error: {0}")]
    Session(String),
}

/// How to locate elements on the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Css(String),
    XPath(String),
}

impl Query {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::XPath(expression.into())
    }
}

/// WebDriver key code for Enter.
pub const ENTER_KEY: &str = "\u{E007}";

/// One rendering session. Calls are strictly sequential: the session only
/// ever shows one page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    type Element: Send + Sync;

    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    async fn find_elements(&self, query: &Query) -> Result<Vec<Self::Element>, DriverError>;

    async fn read_attribute(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    async fn click(&self, element: &Self::Element) -> Result<(), DriverError>;

    async fn type_text(&self, element: &Self::Element, text: &str) -> Result<(), DriverError>;

    async fn current_location(&self) -> Result<String, DriverError>;

    async fn run_script(&self, code: &str) -> Result<serde_json::Value, DriverError>;

    async fn raw_markup(&self) -> Result<String, DriverError>;
}

const WAIT_POLL: Duration = Duration::from_millis(250);

/// Polls `query` until it matches at least one element or `timeout` passes.
///
/// A zero timeout makes exactly one attempt. Driver errors count as "not yet".
pub async fn wait_for<P: PageDriver + ?Sized>(
    page: &P,
    query: &Query,
    timeout: Duration,
) -> Option<Vec<P::Element>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(found) = page.find_elements(query).await {
            if !found.is_empty() {
                return Some(found);
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        tokio::time::sleep(WAIT_POLL.min(deadline - now)).await;
    }
}

/// Navigates with a hard upper bound on how long the page may take.
pub async fn navigate_within<P: PageDriver + ?Sized>(
    page: &P,
    url: &str,
    timeout: Duration,
) -> Result<(), DriverError> {
    match tokio::time::timeout(timeout, page.navigate(url)).await {
        Ok(result) => result,
        Err(_) => Err(DriverError::Timeout(timeout)),
    }
}

/// Pauses between page interactions so lazily rendered content can appear.
pub async fn settle(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
