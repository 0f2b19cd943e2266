use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Map, Value};

use crate::config::BrowserConfig;
use crate::error::AppError;
use crate::scraping::driver::{DriverError, PageDriver, Query};

const CHROME_ARGS: &[&str] = &[
    "--disable-gpu",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-notifications",
    "--disable-extensions",
    "--disable-popup-blocking",
    "--disable-translate",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-blink-features=AutomationControlled",
    "--log-level=3",
];

/// A WebDriver session emulating a phone-sized Chrome.
pub struct BrowserController {
    client: Client,
}

impl BrowserController {
    pub async fn connect(config: &BrowserConfig) -> Result<Self, AppError> {
        let mut builder = ClientBuilder::native();
        builder.capabilities(Self::capabilities(config));

        let client = builder
            .connect(&config.webdriver_url)
            .await
            .map_err(|e| AppError::BrowserError(e.to_string()))?;
        Ok(Self { client })
    }

    fn capabilities(config: &BrowserConfig) -> Map<String, Value> {
        let mut args: Vec<&str> = CHROME_ARGS.to_vec();
        if config.headless {
            args.push("--headless=new");
        }

        let mut caps = Map::new();
        caps.insert(
            "goog:chromeOptions".to_string(),
            json!({
                "args": args,
                "mobileEmulation": {
                    "deviceMetrics": { "width": 390, "height": 844, "pixelRatio": 3.0 },
                    "userAgent": config.user_agent,
                },
                "excludeSwitches": ["enable-logging", "enable-automation"],
            }),
        );
        caps
    }

    pub async fn shutdown(self) -> Result<(), AppError> {
        self.client
            .close()
            .await
            .map_err(|e| AppError::BrowserError(e.to_string()))
    }
}

#[async_trait]
impl PageDriver for BrowserController {
    type Element = Element;

    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.client
            .goto(url)
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))
    }

    async fn find_elements(&self, query: &Query) -> Result<Vec<Element>, DriverError> {
        let locator = match query {
            Query::Css(selector) => Locator::Css(selector),
            Query::XPath(expression) => Locator::XPath(expression),
        };
        self.client
            .find_all(locator)
            .await
            .map_err(|e| DriverError::NotFound(e.to_string()))
    }

    async fn read_attribute(
        &self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        // The DOM property carries the resolved absolute URL for href/src.
        match element.prop(name).await {
            Ok(Some(value)) if !value.is_empty() => Ok(Some(value)),
            _ => element
                .attr(name)
                .await
                .map_err(|e| DriverError::Session(e.to_string())),
        }
    }

    async fn click(&self, element: &Element) -> Result<(), DriverError> {
        element
            .click()
            .await
            .map_err(|e| DriverError::Session(e.to_string()))
    }

    async fn type_text(&self, element: &Element, text: &str) -> Result<(), DriverError> {
        element
            .send_keys(text)
            .await
            .map_err(|e| DriverError::Session(e.to_string()))
    }

    async fn current_location(&self) -> Result<String, DriverError> {
        self.client
            .current_url()
            .await
            .map(|url| url.to_string())
            .map_err(|e| DriverError::Session(e.to_string()))
    }

    async fn run_script(&self, code: &str) -> Result<Value, DriverError> {
        self.client
            .execute(code, vec![])
            .await
            .map_err(|e| DriverError::Script(e.to_string()))
    }

    async fn raw_markup(&self) -> Result<String, DriverError> {
        self.client
            .source()
            .await
            .map_err(|e| DriverError::Session(e.to_string()))
    }
}
