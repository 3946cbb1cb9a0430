use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::transport::{TransportCapabilities, XhrLevel};

pub const CONFIG_ENV: &str = "FACES_AJAX_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read ajax config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Post,
    Get,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStage {
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AjaxConfig {
    /// Requests allowed in flight at once.
    pub max_concurrency: usize,
    /// Waiting requests kept before the oldest is dropped.
    pub max_waiting: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub method: HttpMethod,
    /// Highest XHR level available; `0` means no native XHR.
    pub xhr_level: u8,
    pub iframe: bool,
    pub force_compat: bool,
    pub partial_submit: bool,
    pub discard_stale_responses: bool,
    pub project_stage: ProjectStage,
    pub separator: char,
    pub user_agent: String,
}

impl Default for AjaxConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            max_waiting: None,
            timeout_ms: None,
            method: HttpMethod::Post,
            xhr_level: 2,
            iframe: true,
            force_compat: false,
            partial_submit: false,
            discard_stale_responses: false,
            project_stage: ProjectStage::Production,
            separator: ':',
            user_agent: concat!("faces-ajax/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl AjaxConfig {
    /// Loads `path` when it exists, else the per-user config file, else defaults.
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let candidate = path
            .filter(|path| path.exists())
            .or_else(|| default_config_path().filter(|path| path.exists()));

        let config = match candidate {
            Some(path) => {
                tracing::debug!(target: "config", path = %path.display(), "loading ajax config");
                let contents = fs::read_to_string(path)?;
                Self::from_yaml(&contents)?
            }
            None => Self::default(),
        };
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: AjaxConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.xhr_level > 2 {
            return Err(ConfigError::Invalid(format!(
                "xhr_level {} is not one of 0, 1, 2",
                self.xhr_level
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn capabilities(&self) -> TransportCapabilities {
        let xhr = match self.xhr_level {
            0 => None,
            1 => Some(XhrLevel::One),
            _ => Some(XhrLevel::Two),
        };
        TransportCapabilities {
            xhr,
            iframe: self.iframe,
            force_compat: self.force_compat,
        }
    }

    pub fn is_development(&self) -> bool {
        self.project_stage == ProjectStage::Development
    }
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "faces", "faces-ajax").map(|dirs| dirs.config_dir().join("config.yaml"))
}
