//! Engine configuration
//!
//! Every tunable the engine exposes lives here: the backend address, request
//! and probe timeouts, the connectivity-monitor interval, reconnect policy
//! knobs, and the replay ceiling. Built through [`ConfigBuilder`] from a
//! composition root; `Config::default()` reads the backend address from the
//! `TILLSYNC_SERVER_URL` environment variable so deployments can repoint a
//! device without rebuilding.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default backend address
const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    server_url: String,
    request_timeout: Duration,
    health_timeout: Duration,
    sync_interval: Duration,
    reconnect_base_delay: Duration,
    reconnect_attempt_cap: u32,
    max_reconnect_attempts: u32,
    max_replay_attempts: u32,
    database_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let server_url =
            std::env::var("TILLSYNC_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
        Self {
            server_url,
            request_timeout: Duration::from_secs(10),
            health_timeout: Duration::from_millis(800),
            sync_interval: Duration::from_secs(30),
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_attempt_cap: 5,
            max_reconnect_attempts: 10,
            max_replay_attempts: 5,
            database_path: None,
        }
    }
}

impl Config {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new ConfigBuilder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Base URL of the backend-of-record
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Full URL for an API endpoint path
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.server_url.trim_end_matches('/'), path)
    }

    /// Push channel URL, derived from the backend address.
    ///
    /// Same host and port as the data service with the transport upgraded,
    /// `http` becoming `ws` and `https` becoming `wss`.
    pub fn push_url(&self) -> String {
        let base = self.server_url.trim_end_matches('/');
        let upgraded = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{upgraded}/ws")
    }

    /// Timeout applied to collection fetches and mutation replays
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Timeout for the health probe, kept sub-second so probes stay cheap
    pub fn health_timeout(&self) -> Duration {
        self.health_timeout
    }

    /// Connectivity monitor tick interval
    pub fn sync_interval(&self) -> Duration {
        self.sync_interval
    }

    /// Base delay between push channel reconnect attempts
    pub fn reconnect_base_delay(&self) -> Duration {
        self.reconnect_base_delay
    }

    /// Attempt number at which the reconnect delay stops growing
    pub fn reconnect_attempt_cap(&self) -> u32 {
        self.reconnect_attempt_cap
    }

    /// Reconnect attempts before automatic reconnection gives up
    pub fn max_reconnect_attempts(&self) -> u32 {
        self.max_reconnect_attempts
    }

    /// Failed replays tolerated before a queued mutation is evicted
    pub fn max_replay_attempts(&self) -> u32 {
        self.max_replay_attempts
    }

    /// Explicit local database path, if overridden
    pub fn database_path(&self) -> Option<&PathBuf> {
        self.database_path.as_ref()
    }
}

/// Builder for [`Config`]
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    server_url: Option<String>,
    request_timeout: Option<Duration>,
    health_timeout: Option<Duration>,
    sync_interval: Option<Duration>,
    reconnect_base_delay: Option<Duration>,
    reconnect_attempt_cap: Option<u32>,
    max_reconnect_attempts: Option<u32>,
    max_replay_attempts: Option<u32>,
    database_path: Option<PathBuf>,
}

impl ConfigBuilder {
    /// Set the backend address
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    /// Set the collection fetch timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the health probe timeout
    pub fn health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = Some(timeout);
        self
    }

    /// Set the connectivity monitor tick interval
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Set the base reconnect delay
    pub fn reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = Some(delay);
        self
    }

    /// Set the attempt number where the reconnect delay plateaus
    pub fn reconnect_attempt_cap(mut self, cap: u32) -> Self {
        self.reconnect_attempt_cap = Some(cap);
        self
    }

    /// Set the automatic reconnection attempt ceiling
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Set the replay attempt ceiling
    pub fn max_replay_attempts(mut self, attempts: u32) -> Self {
        self.max_replay_attempts = Some(attempts);
        self
    }

    /// Set an explicit local database path
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config, ConfigError> {
        let defaults = Config::default();
        let server_url = self.server_url.unwrap_or(defaults.server_url);
        if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
            return Err(ConfigError::InvalidUrl(server_url));
        }
        Ok(Config {
            server_url,
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            health_timeout: self.health_timeout.unwrap_or(defaults.health_timeout),
            sync_interval: self.sync_interval.unwrap_or(defaults.sync_interval),
            reconnect_base_delay: self
                .reconnect_base_delay
                .unwrap_or(defaults.reconnect_base_delay),
            reconnect_attempt_cap: self
                .reconnect_attempt_cap
                .unwrap_or(defaults.reconnect_attempt_cap),
            max_reconnect_attempts: self
                .max_reconnect_attempts
                .unwrap_or(defaults.max_reconnect_attempts),
            max_replay_attempts: self
                .max_replay_attempts
                .unwrap_or(defaults.max_replay_attempts),
            database_path: self.database_path,
        })
    }
}

impl From<ConfigError> for crate::shared::error::SyncError {
    fn from(err: ConfigError) -> Self {
        Self::config(err.to_string())
    }
}
