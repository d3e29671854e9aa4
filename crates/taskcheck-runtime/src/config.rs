//! Runtime configuration.
//!
//! Values come from an optional YAML file and the environment. A value
//! set in the file wins over the environment; anything unset falls back
//! to its default.
//!
//! ```yaml
//! api_url: "https://api.pyrus.com/v4/"
//! login: "bot@example.com"
//! utc_offset_hours: 5
//! check_mode: "yesterday12"
//! token_ttl: "23h"
//! request_timeout: "30s"
//! task_link_base: "https://pyrus.com/t#id"
//! ```

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use taskcheck_core::CheckMode;

use crate::platform::ApiCredential;

pub const DEFAULT_API_URL: &str = "https://api.pyrus.com/v4/";
pub const DEFAULT_TASK_LINK_BASE: &str = "https://pyrus.com/t#id";

/// Reporting zone of the platform, hours east of UTC.
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 5;

pub const ENV_API_URL: &str = "PYRUS_API_URL";
pub const ENV_LOGIN: &str = "PYRUS_LOGIN";
pub const ENV_SECURITY_KEY: &str = "PYRUS_SECURITY_KEY";
pub const ENV_UTC_OFFSET: &str = "TASKCHECK_UTC_OFFSET";
pub const ENV_CHECK_MODE: &str = "TASKCHECK_CHECK_MODE";
pub const ENV_TOKEN_TTL: &str = "TASKCHECK_TOKEN_TTL";

/// Errors loading runtime configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: &'static str, message: String },
}

/// Settings file as written by the user.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    api_url: Option<String>,
    login: Option<String>,
    security_key: Option<String>,
    utc_offset_hours: Option<i32>,
    check_mode: Option<CheckMode>,
    token_ttl: Option<String>,
    request_timeout: Option<String>,
    task_link_base: Option<String>,
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Platform API base URL
    pub api_url: String,

    pub login: Option<String>,

    pub security_key: Option<ApiCredential>,

    /// Offset of the reporting zone used to compute "yesterday"
    pub utc_offset_hours: i32,

    pub check_mode: CheckMode,

    /// How long an access token is reused
    pub token_ttl: Duration,

    pub request_timeout: Duration,

    /// Prefix of task links; the task id is appended
    pub task_link_base: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            login: None,
            security_key: None,
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
            check_mode: CheckMode::default(),
            token_ttl: Duration::from_secs(23 * 60 * 60),
            request_timeout: Duration::from_secs(30),
            task_link_base: DEFAULT_TASK_LINK_BASE.to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load from the environment and an optional YAML file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let yaml = match path {
            Some(path) => Some(std::fs::read_to_string(path)?),
            None => None,
        };
        Self::from_sources(yaml.as_deref(), |key| std::env::var(key).ok())
    }

    /// Resolve from YAML text and an environment lookup.
    pub fn from_sources(
        yaml: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file: ConfigFile = match yaml {
            Some(text) if !text.trim().is_empty() => serde_yaml::from_str(text)?,
            _ => ConfigFile::default(),
        };
        let defaults = Self::default();

        let api_url = file
            .api_url
            .or_else(|| env(ENV_API_URL))
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(defaults.api_url);
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: "api_url",
                message: "must start with http:// or https://".to_string(),
            });
        }

        let utc_offset_hours = match file.utc_offset_hours {
            Some(hours) => hours,
            None => match env(ENV_UTC_OFFSET) {
                Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: "utc_offset_hours",
                    message: format!("'{}' is not a whole number of hours", raw),
                })?,
                None => defaults.utc_offset_hours,
            },
        };
        if !(-23..=23).contains(&utc_offset_hours) {
            return Err(ConfigError::InvalidValue {
                key: "utc_offset_hours",
                message: format!("{} is outside -23..=23", utc_offset_hours),
            });
        }

        let check_mode = match file.check_mode {
            Some(mode) => mode,
            None => match env(ENV_CHECK_MODE) {
                Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                    key: "check_mode",
                    message: format!("{}", e),
                })?,
                None => defaults.check_mode,
            },
        };

        let token_ttl = match file.token_ttl.or_else(|| env(ENV_TOKEN_TTL)) {
            Some(raw) => parse_duration("token_ttl", &raw)?,
            None => defaults.token_ttl,
        };
        let request_timeout = match file.request_timeout {
            Some(raw) => parse_duration("request_timeout", &raw)?,
            None => defaults.request_timeout,
        };

        Ok(Self {
            api_url,
            login: file.login.or_else(|| env(ENV_LOGIN)),
            security_key: ApiCredential::resolve(
                file.security_key,
                env(ENV_SECURITY_KEY),
                "Pyrus security key",
            ),
            utc_offset_hours,
            check_mode,
            token_ttl,
            request_timeout,
            task_link_base: file.task_link_base.unwrap_or(defaults.task_link_base),
        })
    }

    pub fn with_check_mode(mut self, mode: CheckMode) -> Self {
        self.check_mode = mode;
        self
    }
}

fn parse_duration(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim()).map_err(|e| ConfigError::InvalidValue {
        key,
        message: e.to_string(),
    })
}
