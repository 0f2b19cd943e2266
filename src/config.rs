use serde::{Deserialize, Serialize};
use config::Config;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

use crate::error::AppError;
use crate::models::RunId;
use crate::settings::Settings;

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub account: AccountConfig,
    #[validate(nested)]
    pub target: TargetConfig,
    #[validate(nested)]
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[validate(nested)]
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Clone, Deserialize, Serialize, Validate)]
pub struct AccountConfig {
    #[validate(length(min = 1, message = "Username cannot be empty"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password cannot be empty"))]
    #[serde(default, skip_serializing)]
    pub password: String,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TargetConfig {
    #[validate(length(min = 1, message = "Target profile cannot be empty"))]
    pub profile: String,
    /// Stop after this many reels; unlimited when absent.
    #[validate(range(min = 1, message = "Video limit must be a positive number"))]
    #[serde(default)]
    pub video_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct DownloadConfig {
    #[validate(range(min = 1, max = 20, message = "Parallel downloads must be between 1 and 20"))]
    pub max_parallel: usize,
    #[validate(range(min = 1, message = "Retries must be at least 1"))]
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub connect_timeout_secs: u64,
    pub chunk_timeout_secs: u64,
    #[validate(range(min = 1, message = "Batch size must be at least 1"))]
    pub batch_size: usize,
    /// Defaults to `{profile}_reels_{run id}` in the working directory.
    pub output_dir: Option<PathBuf>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_parallel: 5,
            max_retries: 3,
            retry_delay_ms: 2_000,
            connect_timeout_secs: 30,
            chunk_timeout_secs: 30,
            batch_size: 5,
            output_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
    pub base_url: String,
    pub user_agent: String,
}

pub const MOBILE_USER_AGENT: &str =
    "Mozilla/5.0 (iPhone; CPU iPhone OS 14_0_1 like Mac OS X) AppleWebKit/605.1.15";

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            headless: true,
            base_url: "https://www.instagram.com".to_string(),
            user_agent: MOBILE_USER_AGENT.to_string(),
        }
    }
}

/// Delays and heuristics of the scraping loop, in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct TimingConfig {
    pub navigation_timeout_ms: u64,
    pub page_settle_ms: u64,
    pub scroll_settle_ms: u64,
    pub post_settle_ms: u64,
    pub element_wait_ms: u64,
    pub probe_interval_ms: u64,
    #[validate(range(min = 1))]
    pub probes_per_attempt: u32,
    pub retry_backoff_ms: u64,
    pub login_form_wait_ms: u64,
    pub login_settle_ms: u64,
    pub overlay_wait_ms: u64,
    pub overlay_settle_ms: u64,
    pub pause_poll_ms: u64,
    #[validate(range(min = 1, message = "Stall passes must be at least 1"))]
    pub stall_passes: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: 30_000,
            page_settle_ms: 5_000,
            scroll_settle_ms: 2_000,
            post_settle_ms: 2_000,
            element_wait_ms: 5_000,
            probe_interval_ms: 1_000,
            probes_per_attempt: 2,
            retry_backoff_ms: 2_000,
            login_form_wait_ms: 30_000,
            login_settle_ms: 5_000,
            overlay_wait_ms: 3_000,
            overlay_settle_ms: 1_000,
            pause_poll_ms: 500,
            stall_passes: 3,
        }
    }
}

impl TimingConfig {
    pub fn to_timings(&self) -> Timings {
        let ms = Duration::from_millis;
        Timings {
            navigation_timeout: ms(self.navigation_timeout_ms),
            page_settle: ms(self.page_settle_ms),
            scroll_settle: ms(self.scroll_settle_ms),
            post_settle: ms(self.post_settle_ms),
            element_wait: ms(self.element_wait_ms),
            probe_interval: ms(self.probe_interval_ms),
            probes_per_attempt: self.probes_per_attempt,
            retry_backoff: ms(self.retry_backoff_ms),
            login_form_wait: ms(self.login_form_wait_ms),
            login_settle: ms(self.login_settle_ms),
            overlay_wait: ms(self.overlay_wait_ms),
            overlay_settle: ms(self.overlay_settle_ms),
            pause_poll: ms(self.pause_poll_ms),
            stall_passes: self.stall_passes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timings {
    pub navigation_timeout: Duration,
    pub page_settle: Duration,
    pub scroll_settle: Duration,
    pub post_settle: Duration,
    pub element_wait: Duration,
    pub probe_interval: Duration,
    pub probes_per_attempt: u32,
    pub retry_backoff: Duration,
    pub login_form_wait: Duration,
    pub login_settle: Duration,
    pub overlay_wait: Duration,
    pub overlay_settle: Duration,
    pub pause_poll: Duration,
    pub stall_passes: u32,
}

impl Timings {
    /// Every delay zeroed; heuristics keep their defaults.
    #[cfg(test)]
    pub(crate) fn immediate() -> Self {
        let defaults = TimingConfig::default();
        Self {
            navigation_timeout: Duration::from_secs(5),
            page_settle: Duration::ZERO,
            scroll_settle: Duration::ZERO,
            post_settle: Duration::ZERO,
            element_wait: Duration::ZERO,
            probe_interval: Duration::ZERO,
            probes_per_attempt: defaults.probes_per_attempt,
            retry_backoff: Duration::ZERO,
            login_form_wait: Duration::ZERO,
            login_settle: Duration::ZERO,
            overlay_wait: Duration::ZERO,
            overlay_settle: Duration::ZERO,
            pause_poll: Duration::from_millis(1),
            stall_passes: defaults.stall_passes,
        }
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub identity: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Locations on the target site, derived from its base URL.
#[derive(Debug, Clone)]
pub struct SiteUrls {
    base: String,
}

impl SiteUrls {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn login(&self) -> String {
        format!("{}/accounts/login/", self.base)
    }

    /// Substring of the location that means we are still on the login page.
    pub fn login_marker(&self) -> &'static str {
        "login"
    }

    pub fn profile_reels(&self, handle: &str) -> String {
        format!("{}/{}/reels/", self.base, handle.trim_matches('/'))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub connect_timeout: Duration,
    pub chunk_timeout: Duration,
}

/// Immutable configuration of a single run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub run_id: RunId,
    pub credentials: Credentials,
    pub target_profile: String,
    pub video_limit: Option<usize>,
    pub max_parallel: usize,
    pub batch_size: usize,
    pub output_dir: PathBuf,
    pub site: SiteUrls,
    pub retry: RetryPolicy,
    pub user_agent: String,
    pub timings: Timings,
}

impl AppConfig {
    pub fn load_with_cli_args(cli_args: &crate::cli::CliArgs) -> Result<Self, AppError> {
        let mut builder = Config::builder();

        if let Some(settings) = Settings::load_if_present(&cli_args.settings)? {
            for (key, value) in settings.config_defaults() {
                builder = builder.set_default(key, value)?;
            }
        }

        builder = builder.add_source(config::File::with_name("config").required(false));

        if let Some(config_path) = &cli_args.config {
            builder = builder.add_source(config::File::from(config_path.as_path()));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("REELS")
                .prefix_separator("_")
                .separator("__"),
        );

        if let Some(profile) = &cli_args.profile {
            builder = builder.set_override("target.profile", profile.as_str())?;
        }
        if let Some(username) = &cli_args.username {
            builder = builder.set_override("account.username", username.as_str())?;
        }
        if let Some(limit) = cli_args.limit {
            builder = builder.set_override("target.video_limit", limit as u64)?;
        }
        if let Some(parallel) = cli_args.parallel {
            builder = builder.set_override("download.max_parallel", parallel as u64)?;
        }
        if let Some(output_path) = &cli_args.output {
            builder = builder.set_override("download.output_dir", path_value(output_path))?;
        }
        if let Some(url) = &cli_args.webdriver_url {
            builder = builder.set_override("browser.webdriver_url", url.as_str())?;
        }
        if cli_args.headless {
            builder = builder.set_override("browser.headless", true)?;
        }

        let app_config: AppConfig = builder.build()?.try_deserialize()?;

        // Validate the configuration
        app_config.validate()?;

        Ok(app_config)
    }

    pub fn validate(&self) -> Result<(), validator::ValidationErrors> {
        validator::Validate::validate(self)
    }

    pub fn into_run_config(self, run_id: RunId) -> RunConfig {
        let output_dir = self.download.output_dir.clone().unwrap_or_else(|| {
            PathBuf::from(format!("{}_reels_{}", self.target.profile, run_id))
        });

        RunConfig {
            run_id,
            credentials: Credentials {
                identity: self.account.username,
                secret: self.account.password,
            },
            target_profile: self.target.profile,
            video_limit: self.target.video_limit,
            max_parallel: self.download.max_parallel,
            batch_size: self.download.batch_size,
            output_dir,
            site: SiteUrls::new(self.browser.base_url),
            retry: RetryPolicy {
                max_retries: self.download.max_retries,
                retry_delay: Duration::from_millis(self.download.retry_delay_ms),
                connect_timeout: Duration::from_secs(self.download.connect_timeout_secs),
                chunk_timeout: Duration::from_secs(self.download.chunk_timeout_secs),
            },
            user_agent: self.browser.user_agent,
            timings: self.timing.to_timings(),
        }
    }
}

fn path_value(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig {
            account: AccountConfig {
                username: "someone".into(),
                password: "hunter2".into(),
            },
            target: TargetConfig {
                profile: "netflix".into(),
                video_limit: Some(10),
            },
            download: DownloadConfig::default(),
            browser: BrowserConfig::default(),
            timing: TimingConfig::default(),
        }
    }

    #[test]
    fn defaults_pass_validation() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_parallelism_and_zero_limit() {
        let mut config = sample();
        config.download.max_parallel = 21;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.download.max_parallel = 0;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.target.video_limit = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_missing_credentials() {
        let mut config = sample();
        config.account.password.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn run_config_derives_output_dir_from_profile_and_run_id() {
        let run_id = RunId::now();
        let run = sample().into_run_config(run_id.clone());
        assert_eq!(
            run.output_dir,
            PathBuf::from(format!("netflix_reels_{run_id}"))
        );
        assert_eq!(run.timings.stall_passes, 3);
        assert_eq!(run.retry.retry_delay, Duration::from_secs(2));
    }

    #[test]
    fn secrets_stay_out_of_debug_output() {
        let run = sample().into_run_config(RunId::now());
        let rendered = format!("{:?} {:?}", run.credentials, sample().account);
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn site_urls_follow_the_base() {
        let site = SiteUrls::new("https://example.test/");
        assert_eq!(site.login(), "https://example.test/accounts/login/");
        assert_eq!(site.profile_reels("alice"), "https://example.test/alice/reels/");
    }
}
