use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::UserDirs;
use serde::{Deserialize, Serialize};

use crate::error::GitterError;
use crate::subscription::ReconnectPolicy;

pub const DEFAULT_API_URL: &str = "https://api.gitter.im/v1";
pub const DEFAULT_STREAM_URL: &str = "https://stream.gitter.im/v1";
pub const DEFAULT_KEEPALIVE: char = ' ';

/// Client settings. The token is never part of the config; pass it to
/// [`GitterApi::try_authenticate`](crate::GitterApi::try_authenticate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
    /// Applied to request/response calls only. `None` keeps the transport's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    /// Padding character the stream sends to keep the connection alive.
    #[serde(default = "default_keepalive")]
    pub keepalive: char,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_stream_url() -> String {
    DEFAULT_STREAM_URL.to_string()
}

fn default_keepalive() -> char {
    DEFAULT_KEEPALIVE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            stream_url: default_stream_url(),
            request_timeout_secs: None,
            keepalive: DEFAULT_KEEPALIVE,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Apply `GITTER_API_URL` and `GITTER_STREAM_URL` when set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("GITTER_API_URL") {
            self.api_url = url;
        }
        if let Ok(url) = std::env::var("GITTER_STREAM_URL") {
            self.stream_url = url;
        }
        self
    }

    pub fn api_url(mut self, url: &str) -> Self {
        self.api_url = url.to_string();
        self
    }

    pub fn stream_url(mut self, url: &str) -> Self {
        self.stream_url = url.to_string();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}

pub fn config_dir() -> Result<PathBuf, GitterError> {
    let home = UserDirs::new()
        .ok_or_else(|| GitterError::Config("unable to determine home directory".to_string()))?
        .home_dir()
        .to_path_buf();
    Ok(home.join(".gitter"))
}

pub fn config_path() -> Result<PathBuf, GitterError> {
    Ok(config_dir()?.join("config.yaml"))
}

/// Load `~/.gitter/config.yaml`, falling back to defaults when it does not exist.
pub fn load() -> Result<Config, GitterError> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(Config::default().with_env_overrides());
    }
    Ok(load_from(&path)?.with_env_overrides())
}

pub fn load_from(path: &Path) -> Result<Config, GitterError> {
    let data = fs::read_to_string(path)
        .map_err(|e| GitterError::Config(format!("{}: {e}", path.display())))?;
    serde_yaml::from_str(&data).map_err(|e| GitterError::Config(format!("{}: {e}", path.display())))
}
