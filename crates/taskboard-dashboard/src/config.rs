//! Layered configuration: defaults, TOML file, environment, CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use taskboard_sync::{normalize_channel_url, FetchConfig, LiveConfig, ReconnectPolicy, SyncError};

pub const ENV_API_URL: &str = "TASKBOARD_API_URL";
pub const ENV_WS_URL: &str = "TASKBOARD_WS_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Where the data comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Chart endpoint. Empty disables fetching.
    pub api_url: String,
    /// Live channel URL. Empty disables the channel.
    pub ws_url: String,
    /// Periodic full refresh. 0 disables it.
    pub refresh_interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            ws_url: String::new(),
            refresh_interval_secs: 0,
            request_timeout_secs: 10,
        }
    }
}

/// Live channel tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveSection {
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    pub max_reconnect_attempts: u32,
    /// 0 disables keepalive pings.
    pub keepalive_interval_secs: u64,
}

impl Default for LiveSection {
    fn default() -> Self {
        Self {
            reconnect_base_ms: 1_000,
            reconnect_max_ms: 30_000,
            max_reconnect_attempts: 10,
            keepalive_interval_secs: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` wins when set.
    pub level: String,
    /// Log file used while the console owns the terminal.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub source: SourceConfig,
    pub live: LiveSection,
    pub logging: LoggingConfig,
}

impl DashboardConfig {
    /// `$XDG_CONFIG_HOME/taskboard/config.toml` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("taskboard").join("config.toml"))
    }

    /// Load from `path`, or from the default location if it exists.
    /// An explicitly given file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `TASKBOARD_API_URL` / `TASKBOARD_WS_URL` from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL) {
            self.source.api_url = url;
        }
        if let Some(url) = lookup(ENV_WS_URL) {
            self.source.ws_url = url;
        }
    }

    /// CLI flags, highest precedence.
    pub fn apply_overrides(&mut self, api_url: Option<String>, ws_url: Option<String>) {
        if let Some(url) = api_url {
            self.source.api_url = url;
        }
        if let Some(url) = ws_url {
            self.source.ws_url = url;
        }
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig::new(self.source.api_url.trim())
            .with_timeout(Duration::from_secs(self.source.request_timeout_secs.max(1)))
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.live.reconnect_base_ms),
            max_delay: Duration::from_millis(self.live.reconnect_max_ms),
            max_attempts: self.live.max_reconnect_attempts,
        }
    }

    /// Live channel settings, or why the channel is disabled.
    pub fn live_config(&self) -> Result<LiveConfig, SyncError> {
        let url = normalize_channel_url(&self.source.ws_url)
            .ok_or_else(|| SyncError::Config("live channel URL is not set".into()))?;
        let keepalive = match self.live.keepalive_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Ok(LiveConfig::new(url)
            .with_policy(self.reconnect_policy())
            .with_keepalive(keepalive))
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        match self.source.refresh_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Log file for console mode: configured path, else the platform data dir.
    pub fn log_file(&self) -> Option<PathBuf> {
        self.logging.file.clone().or_else(|| {
            dirs::data_local_dir().map(|d| d.join("taskboard").join("taskboard.log"))
        })
    }
}
