//! In-memory page driver that plays a scripted profile, login page and posts.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::scraping::driver::{DriverError, PageDriver, Query, ENTER_KEY};
use crate::scraping::login::{PASSWORD_FIELD, USERNAME_FIELD};
use crate::signal::RunControl;

pub const BASE: &str = "https://www.instagram.com";

pub fn reel_url(n: usize) -> String {
    format!("{BASE}/reel/{n:04}/")
}

#[derive(Debug, Clone)]
pub enum FakeElement {
    Anchor(String),
    Video(String),
    Input(&'static str),
    Button(String),
}

#[derive(Debug, Clone, Default)]
pub struct FakePost {
    pub video_src: Option<String>,
    pub markup: String,
    /// Loads that fail before the page finally renders.
    pub failing_loads: usize,
}

impl FakePost {
    pub fn with_video(src: &str) -> Self {
        Self {
            video_src: Some(src.to_string()),
            ..Self::default()
        }
    }

    pub fn with_markup(markup: &str) -> Self {
        Self {
            markup: markup.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Calls {
    pub navigations: Vec<String>,
    pub scans: usize,
    pub scrolls: usize,
    pub clicks: Vec<String>,
    pub typed: Vec<(&'static str, String)>,
}

struct FakeState {
    location: String,
    feed_len: usize,
    /// Reels visible after `n` scrolls; the last entry repeats.
    visible_after_scrolls: Vec<usize>,
    height_keeps_growing: bool,
    login_form: bool,
    accept_login: bool,
    overlays: Vec<String>,
    posts: HashMap<String, FakePost>,
    stop_after_scans: Option<(usize, RunControl)>,
    calls: Calls,
}

pub struct ScriptedPage {
    state: Mutex<FakeState>,
}

impl ScriptedPage {
    /// A profile of `feed_len` reels revealed in steps as the page scrolls.
    pub fn profile(feed_len: usize, visible_after_scrolls: &[usize]) -> Self {
        Self {
            state: Mutex::new(FakeState {
                location: "about:blank".to_string(),
                feed_len,
                visible_after_scrolls: visible_after_scrolls.to_vec(),
                height_keeps_growing: false,
                login_form: true,
                accept_login: true,
                overlays: Vec::new(),
                posts: HashMap::new(),
                stop_after_scans: None,
                calls: Calls::default(),
            }),
        }
    }

    fn with_state(self, f: impl FnOnce(&mut FakeState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn height_keeps_growing(self) -> Self {
        self.with_state(|s| s.height_keeps_growing = true)
    }

    pub fn rejecting_login(self) -> Self {
        self.with_state(|s| s.accept_login = false)
    }

    pub fn without_login_form(self) -> Self {
        self.with_state(|s| s.login_form = false)
    }

    pub fn with_overlays(self, labels: &[&str]) -> Self {
        self.with_state(|s| s.overlays = labels.iter().map(|l| l.to_string()).collect())
    }

    pub fn with_post(self, url: &str, post: FakePost) -> Self {
        self.with_state(|s| {
            s.posts.insert(url.to_string(), post);
        })
    }

    /// Every reel of the feed renders a video element.
    pub fn with_playable_feed(self) -> Self {
        self.with_state(|s| {
            for n in 1..=s.feed_len {
                s.posts.insert(
                    reel_url(n),
                    FakePost::with_video(&format!("https://cdn.test/{n:04}.mp4")),
                );
            }
        })
    }

    pub fn stop_after_scans(self, scans: usize, control: RunControl) -> Self {
        self.with_state(|s| s.stop_after_scans = Some((scans, control)))
    }

    pub fn calls(&self) -> Calls {
        self.state.lock().unwrap().calls.clone()
    }
}

impl FakeState {
    fn visible(&self) -> usize {
        let step = self
            .calls
            .scrolls
            .min(self.visible_after_scrolls.len().saturating_sub(1));
        self.visible_after_scrolls
            .get(step)
            .copied()
            .unwrap_or(0)
            .min(self.feed_len)
    }

    fn on_login_page(&self) -> bool {
        self.location.contains("/accounts/login/")
    }
}

#[async_trait]
impl PageDriver for ScriptedPage {
    type Element = FakeElement;

    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut s = self.state.lock().unwrap();
        s.calls.navigations.push(url.to_string());
        if let Some(post) = s.posts.get_mut(url) {
            if post.failing_loads > 0 {
                post.failing_loads -= 1;
                return Err(DriverError::Navigation(format!("{url} did not load")));
            }
        }
        s.location = url.to_string();
        Ok(())
    }

    async fn find_elements(&self, query: &Query) -> Result<Vec<FakeElement>, DriverError> {
        let mut s = self.state.lock().unwrap();
        match query {
            Query::Css(selector) if selector == "a" => {
                s.calls.scans += 1;
                if let Some((after, control)) = &s.stop_after_scans {
                    if s.calls.scans >= *after {
                        control.request_stop();
                    }
                }
                let mut anchors = vec![FakeElement::Anchor(format!("{BASE}/explore/"))];
                for n in 1..=s.visible() {
                    // Thumbnail and caption both link to the post; even
                    // reels use the relative form.
                    let href = if n % 2 == 0 {
                        format!("/reel/{n:04}/")
                    } else {
                        reel_url(n)
                    };
                    anchors.push(FakeElement::Anchor(href.clone()));
                    anchors.push(FakeElement::Anchor(href));
                }
                Ok(anchors)
            }
            Query::Css(selector) if selector == "video" => Ok(s
                .posts
                .get(&s.location)
                .and_then(|post| post.video_src.clone())
                .map(|src| vec![FakeElement::Video(src)])
                .unwrap_or_default()),
            Query::Css(selector) if selector == USERNAME_FIELD || selector == PASSWORD_FIELD => {
                if s.login_form && s.on_login_page() {
                    let field = if selector == USERNAME_FIELD {
                        "username"
                    } else {
                        "password"
                    };
                    Ok(vec![FakeElement::Input(field)])
                } else {
                    Ok(Vec::new())
                }
            }
            Query::XPath(expression) => Ok(s
                .overlays
                .iter()
                .filter(|label| expression.contains(&format!("'{label}'")))
                .map(|label| FakeElement::Button(label.clone()))
                .collect()),
            Query::Css(other) => Err(DriverError::NotFound(other.clone())),
        }
    }

    async fn read_attribute(
        &self,
        element: &FakeElement,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        Ok(match (element, name) {
            (FakeElement::Anchor(href), "href") => Some(href.clone()),
            (FakeElement::Video(src), "src") => Some(src.clone()),
            _ => None,
        })
    }

    async fn click(&self, element: &FakeElement) -> Result<(), DriverError> {
        let mut s = self.state.lock().unwrap();
        match element {
            FakeElement::Button(label) => {
                s.calls.clicks.push(label.clone());
                if let Some(pos) = s.overlays.iter().position(|l| l == label) {
                    s.overlays.remove(pos);
                }
                Ok(())
            }
            other => Err(DriverError::Session(format!("{other:?} is not clickable"))),
        }
    }

    async fn type_text(&self, element: &FakeElement, text: &str) -> Result<(), DriverError> {
        let mut s = self.state.lock().unwrap();
        let FakeElement::Input(field) = element else {
            return Err(DriverError::Session("not an input".to_string()));
        };
        s.calls.typed.push((*field, text.to_string()));
        if text == ENTER_KEY && s.accept_login {
            s.location = format!("{BASE}/");
        }
        Ok(())
    }

    async fn current_location(&self) -> Result<String, DriverError> {
        Ok(self.state.lock().unwrap().location.clone())
    }

    async fn run_script(&self, code: &str) -> Result<Value, DriverError> {
        let mut s = self.state.lock().unwrap();
        if code.contains("scrollTo") {
            s.calls.scrolls += 1;
            return Ok(Value::Null);
        }
        if code.contains("scrollHeight") {
            let height = if s.height_keeps_growing {
                1_000 + s.calls.scrolls * 100
            } else {
                100 + s.visible() * 100
            };
            return Ok(Value::from(height as u64));
        }
        Err(DriverError::Script(format!("unsupported script: {code}")))
    }

    async fn raw_markup(&self) -> Result<String, DriverError> {
        let s = self.state.lock().unwrap();
        Ok(s.posts
            .get(&s.location)
            .map(|post| post.markup.clone())
            .unwrap_or_else(|| "<html><body></body></html>".to_string()))
    }
}
