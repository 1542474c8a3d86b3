//! chunkplay-client configuration
//!
//! Command line first, then the optional TOML file, then defaults.

use crate::error::{Error, Result};
use chunkplay_common::protocol::{DEFAULT_PREFETCH_INTERVAL_SECS, DEFAULT_SERVER_URL};
use serde::Deserialize;
use std::time::Duration;

/// Delay before the first retry; doubles on each further attempt
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Settings read from the TOML config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server_url: Option<String>,
    pub interval_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
}

/// Settings given on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub server_url: Option<String>,
    pub interval_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
}

/// Resolved client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// URL probed with HEAD and fetched with ranged GETs
    pub server_url: String,
    /// Period between two prefetches
    pub interval: Duration,
    /// Extra attempts for a transient failure; 0 makes the first failure fatal
    pub max_retries: u32,
    pub retry_backoff: Duration,
    /// Per-request timeout; `None` waits indefinitely
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            interval: Duration::from_secs(DEFAULT_PREFETCH_INTERVAL_SECS),
            max_retries: 0,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            request_timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn resolve(cli: ConfigOverrides, file: FileConfig) -> Result<Self> {
        let defaults = ClientConfig::default();

        let interval_secs = cli.interval_secs.or(file.interval_secs);
        if interval_secs == Some(0) {
            return Err(Error::Config("interval_secs must be at least 1".to_string()));
        }

        let timeout_secs = cli.timeout_secs.or(file.timeout_secs);
        if timeout_secs == Some(0) {
            return Err(Error::Config("timeout_secs must be at least 1".to_string()));
        }

        let server_url = cli.server_url.or(file.server_url).unwrap_or(defaults.server_url);
        if !(server_url.starts_with("http://") || server_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "server_url must be an http(s) URL: {}",
                server_url
            )));
        }

        Ok(ClientConfig {
            server_url,
            interval: interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.interval),
            max_retries: cli
                .max_retries
                .or(file.max_retries)
                .unwrap_or(defaults.max_retries),
            retry_backoff: cli
                .retry_backoff_ms
                .or(file.retry_backoff_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
            request_timeout: timeout_secs.map(Duration::from_secs),
        })
    }
}
