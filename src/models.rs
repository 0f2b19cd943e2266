use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Absolute URL of one post, as discovered on the profile feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostIdentifier(String);

impl PostIdentifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A post resolved to a directly fetchable media URL.
///
/// `index` is the 1-based discovery rank of the post and names the output
/// file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub index: usize,
    pub media_url: String,
}

impl ResolvedMedia {
    pub fn new(index: usize, media_url: impl Into<String>) -> Self {
        Self {
            index,
            media_url: media_url.into(),
        }
    }

    pub fn file_name(&self) -> String {
        format!("reel_{:03}.mp4", self.index)
    }
}

/// Identifies one run; computed once when the run is configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn from_time(at: DateTime<Local>) -> Self {
        Self(at.format("%Y-%m-%d_%H%M%S").to_string())
    }

    pub fn now() -> Self {
        Self::from_time(Local::now())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    LoginFormNotFound,
    LoginRejected,
    NoPostsFound,
    Unexpected(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoginFormNotFound => f.write_str("login form not found"),
            Self::LoginRejected => f.write_str("login rejected"),
            Self::NoPostsFound => f.write_str("no reels found"),
            Self::Unexpected(message) => write!(f, "unexpected error: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terminal {
    Success,
    Failure(FailureReason),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Authenticating,
    Collecting,
    Resolving,
    Downloading,
    Summarizing,
    Terminal(Terminal),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }

    /// Whether the run controller may move from `self` to `next`.
    pub fn can_transition_to(&self, next: &RunState) -> bool {
        use RunState as S;
        use Terminal as T;

        match (self, next) {
            // Setup failures happen before the browser is touched.
            (S::Idle, S::Authenticating | S::Terminal(T::Failure(_))) => true,
            (S::Authenticating | S::Collecting, S::Terminal(T::Failure(_) | T::Cancelled)) => true,
            (S::Authenticating, S::Collecting) => true,
            (S::Collecting, S::Resolving) => true,
            (S::Resolving, S::Downloading | S::Summarizing) => true,
            (S::Downloading, S::Resolving | S::Summarizing) => true,
            (S::Resolving | S::Downloading, S::Terminal(T::Failure(_))) => true,
            (S::Summarizing, S::Terminal(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Authenticating => f.write_str("authenticating"),
            Self::Collecting => f.write_str("collecting"),
            Self::Resolving => f.write_str("resolving"),
            Self::Downloading => f.write_str("downloading"),
            Self::Summarizing => f.write_str("summarizing"),
            Self::Terminal(Terminal::Success) => f.write_str("finished"),
            Self::Terminal(Terminal::Cancelled) => f.write_str("cancelled"),
            Self::Terminal(Terminal::Failure(reason)) => write!(f, "failed ({reason})"),
        }
    }
}

/// Final accounting of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub state: Terminal,
    pub total_found: usize,
    pub total_succeeded: usize,
    pub total_failed: usize,
    pub failed_identifiers: Vec<PostIdentifier>,
    /// Posts cut short by a stop request; counted neither way.
    pub abandoned_identifiers: Vec<PostIdentifier>,
    pub elapsed: Duration,
    pub output_dir: PathBuf,
}
