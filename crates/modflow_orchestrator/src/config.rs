//! Configuration
//!
//! Resolution order: defaults → config file → environment. CLI flags are
//! applied on top by the binary.
//!
//! All paths are under ~/.modflow/ unless `MODFLOW_HOME` is set.

use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10 * 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const ENV_HOME: &str = "MODFLOW_HOME";
pub const ENV_BASE_URL: &str = "MODFLOW_BASE_URL";
pub const ENV_API_KEY: &str = "MODFLOW_API_KEY";
pub const ENV_POLL_INTERVAL: &str = "MODFLOW_POLL_INTERVAL_SECS";
pub const ENV_TIMEOUT: &str = "MODFLOW_TIMEOUT_SECS";

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Root URL of the remote analysis service
    pub base_url: String,

    /// Seconds between poll ticks
    pub poll_interval_secs: u64,

    /// Wall-clock budget per poller run before TIMED_OUT
    pub timeout_secs: u64,

    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,

    /// Sent as a bearer token when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            api_key: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| OrchestratorError::Config(e.to_string()))
    }

    /// Load from an explicit file (must exist) or the default location (optional),
    /// then apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = default_config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `MODFLOW_*` overrides read through `lookup`
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            self.api_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Some(value) = lookup(ENV_POLL_INTERVAL) {
            self.poll_interval_secs = parse_secs(ENV_POLL_INTERVAL, &value)?;
        }
        if let Some(value) = lookup(ENV_TIMEOUT) {
            self.timeout_secs = parse_secs(ENV_TIMEOUT, &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(OrchestratorError::Config("base_url is empty".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(OrchestratorError::Config(
                "poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(OrchestratorError::Config(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| OrchestratorError::Config(format!("{} must be a number of seconds, got '{}'", key, value)))
}

/// Get the Modflow home directory: ~/.modflow
pub fn modflow_home() -> PathBuf {
    if let Ok(override_path) = std::env::var(ENV_HOME) {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".modflow")
}

/// Get the config file path: ~/.modflow/config.toml
pub fn default_config_path() -> PathBuf {
    modflow_home().join("config.toml")
}

/// Get the logs directory: ~/.modflow/logs
pub fn logs_dir() -> PathBuf {
    modflow_home().join("logs")
}
