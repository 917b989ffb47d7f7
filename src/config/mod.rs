use crate::completion::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_TIMEOUT};
use crate::error::{Error, Result};
use crate::sync::DEFAULT_FALLBACK;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Endpoint override read from the environment.
pub const ENDPOINT_ENV: &str = "CHATLINE_ENDPOINT";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Completion endpoint the transcript is POSTed to.
    pub endpoint: String,
    /// Whole-request timeout in seconds. Expiry counts as a transport failure.
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Assistant text shown when no reply could be obtained.
    pub fallback_message: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5000/chat".to_string(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
            fallback_message: DEFAULT_FALLBACK.to_string(),
        }
    }
}

/// `<config dir>/chatline/config.toml`, or `.chatline/config.toml` if the
/// platform has no config directory.
#[must_use]
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("chatline").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from(".chatline/config.toml"))
}

impl Config {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Load from the default location and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&config_path())?;
        config.apply_env(std::env::var(ENDPOINT_ENV).ok());
        Ok(config)
    }

    /// Apply the `CHATLINE_ENDPOINT` value, if set. Blank values are ignored.
    pub fn apply_env(&mut self, endpoint: Option<String>) {
        if let Some(endpoint) = endpoint
            && !endpoint.trim().is_empty()
        {
            self.endpoint = endpoint;
        }
    }

    /// Load a specific file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::Config("endpoint must not be empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be positive".into()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(Error::Config(
                "connect_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}
