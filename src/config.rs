use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::live::DEFAULT_RECONNECT_INTERVAL;
use crate::workflow::DEFAULT_HISTORY_LIMIT;
use crate::{Error, Result};

const TRACING_TARGET: &str = "flowdeck::config";

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub api_url: Option<String>,
    /// Push endpoint without the session segment.
    pub ws_url: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub reconnect_interval_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub history_limit: Option<usize>,
    pub require_approval: Option<bool>,
}

impl Config {
    pub fn flowdeck_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".flowdeck"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::flowdeck_dir()?.join("flowdeck.toml"))
    }

    pub fn effective_api_url(&self) -> &str {
        self.api_url
            .as_deref()
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
    }

    /// Push endpoint, derived from the API URL unless set explicitly.
    pub fn effective_ws_url(&self) -> String {
        if let Some(url) = &self.ws_url {
            return url.trim_end_matches('/').to_string();
        }
        let api = self.effective_api_url();
        let ws = if let Some(rest) = api.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = api.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            api.to_string()
        };
        format!("{}/ws", ws)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS))
    }

    pub fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RECONNECT_INTERVAL)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn effective_history_limit(&self) -> usize {
        self.history_limit.unwrap_or(DEFAULT_HISTORY_LIMIT)
    }

    pub fn effective_require_approval(&self) -> bool {
        self.require_approval.unwrap_or(true)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        tracing::debug!(target: TRACING_TARGET, path = %path.display(), "Config::load");
        if !path.exists() {
            tracing::debug!(target: TRACING_TARGET, "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        tracing::debug!(
            target: TRACING_TARGET,
            api_url = config.effective_api_url(),
            poll_interval = ?config.poll_interval(),
            "Config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                tracing::debug!(target: TRACING_TARGET, dir = %dir.display(), "Creating config directory");
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        tracing::debug!(target: TRACING_TARGET, path = %path.display(), "Config saved");
        Ok(())
    }
}
