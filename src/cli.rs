use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory to save reels into
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Profile to collect reels from
    #[arg(short, long, value_name = "HANDLE")]
    pub profile: Option<String>,

    /// Account to log in with (password comes from config or REELS_ACCOUNT__PASSWORD)
    #[arg(short, long, value_name = "NAME")]
    pub username: Option<String>,

    /// Maximum number of reels to download
    #[arg(short, long, value_name = "N")]
    pub limit: Option<usize>,

    /// Number of parallel downloads (1-20)
    #[arg(short = 'j', long, value_name = "N")]
    pub parallel: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Run browser in headless mode
    #[arg(long)]
    pub headless: bool,

    /// WebDriver endpoint to connect to
    #[arg(long, value_name = "URL")]
    pub webdriver_url: Option<String>,

    /// Settings file remembered between runs
    #[arg(long, value_name = "FILE", default_value = "settings.json")]
    pub settings: PathBuf,

    /// Write the effective settings back to the settings file
    #[arg(long)]
    pub save_settings: bool,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            config: None,
            output: None,
            profile: None,
            username: None,
            limit: None,
            parallel: None,
            log_level: "info".to_string(),
            headless: false,
            webdriver_url: None,
            settings: PathBuf::from("settings.json"),
            save_settings: false,
        }
    }
}

impl CliArgs {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn validate(&self) -> Result<(), String> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log level '{}'. Valid levels are: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }

        if let Some(parallel) = self.parallel {
            if parallel == 0 || parallel > 20 {
                return Err("parallel must be between 1 and 20".to_string());
            }
        }

        if self.limit == Some(0) {
            return Err("limit must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn tracing_level(&self) -> tracing::Level {
        match self.log_level.as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }
}
