//! The flat settings record remembered between runs.
//!
//! The password is never written here; supply it through the config file or
//! `REELS_ACCOUNT__PASSWORD`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub username: String,
    pub target_profile: String,
    pub video_limit: Option<usize>,
    pub max_parallel: Option<usize>,
    pub output_dir: Option<String>,
}

impl Settings {
    pub fn load_if_present(path: &Path) -> Result<Option<Self>, AppError> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Settings saved to {}", path.display());
        Ok(())
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            username: config.account.username.clone(),
            target_profile: config.target.profile.clone(),
            video_limit: config.target.video_limit,
            max_parallel: Some(config.download.max_parallel),
            output_dir: config
                .download
                .output_dir
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        }
    }

    /// Config keys this record provides defaults for. Empty fields are skipped.
    pub fn config_defaults(&self) -> Vec<(&'static str, config::Value)> {
        let mut defaults = Vec::new();
        if !self.username.is_empty() {
            defaults.push(("account.username", self.username.clone().into()));
        }
        if !self.target_profile.is_empty() {
            defaults.push(("target.profile", self.target_profile.clone().into()));
        }
        if let Some(limit) = self.video_limit {
            defaults.push(("target.video_limit", (limit as u64).into()));
        }
        if let Some(parallel) = self.max_parallel {
            defaults.push(("download.max_parallel", (parallel as u64).into()));
        }
        if let Some(dir) = self.output_dir.as_ref().filter(|d| !d.is_empty()) {
            defaults.push(("download.output_dir", dir.clone().into()));
        }
        defaults
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk_without_a_password_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            username: "someone".into(),
            target_profile: "netflix".into(),
            video_limit: Some(10),
            max_parallel: Some(5),
            output_dir: None,
        };

        settings.save(&path).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("password"));
        assert_eq!(Settings::load_if_present(&path).unwrap(), Some(settings));
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Settings::load_if_present(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn blank_fields_provide_no_defaults() {
        let settings = Settings {
            target_profile: "netflix".into(),
            output_dir: Some(String::new()),
            ..Settings::default()
        };
        let keys: Vec<_> = settings.config_defaults().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["target.profile"]);
    }
}
