//! Proxy configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides
//! except the config file path itself. Default config path:
//! `/etc/msgproxy/msgproxy.toml`.
//!
//! # Required fields
//! - `proxy.host`
//! - `proxy.port`
//!
//! Everything else falls back to the literal constants from the spec
//! (5s heartbeat, 1s connect/read timeouts, 3 ACK retries, 200ms backoff).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/msgproxy/msgproxy.toml";
pub const DEFAULT_PORT: u16 = 60000;

const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5_000;
const DEFAULT_BACKEND_CONNECT_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_BACKEND_READ_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_ACK_RETRY_COUNT: u32 = 3;
const DEFAULT_ACK_RETRY_BACKOFF_MS: u64 = 200;

/// Fully-resolved proxy configuration, ready to drive the server.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub heartbeat_interval: Duration,
    pub backend_connect_timeout: Duration,
    pub backend_read_timeout: Duration,
    pub ack_retry_count: u32,
    pub ack_retry_backoff: Duration,
}

impl ProxyConfig {
    /// Load configuration from `path` (or [`DEFAULT_CONFIG_PATH`] if `None`).
    ///
    /// Missing file, unparsable TOML, or a missing required key is a
    /// fatal [`ConfigError`].
    pub fn load(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
        let path: PathBuf = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::NotFound {
            path: path.clone(),
            source,
        })?;

        let raw: RawConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<ProxyConfig, ConfigError> {
        let proxy = raw.proxy.ok_or(ConfigError::MissingKey { key: "proxy" })?;
        let host = proxy.host.ok_or(ConfigError::MissingKey { key: "proxy.host" })?;
        let port = proxy.port.ok_or(ConfigError::MissingKey { key: "proxy.port" })?;

        Ok(ProxyConfig {
            host,
            port,
            heartbeat_interval: Duration::from_millis(
                proxy.heartbeat_interval_ms.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS),
            ),
            backend_connect_timeout: Duration::from_millis(
                proxy
                    .backend_connect_timeout_ms
                    .unwrap_or(DEFAULT_BACKEND_CONNECT_TIMEOUT_MS),
            ),
            backend_read_timeout: Duration::from_millis(
                proxy
                    .backend_read_timeout_ms
                    .unwrap_or(DEFAULT_BACKEND_READ_TIMEOUT_MS),
            ),
            ack_retry_count: proxy.ack_retry_count.unwrap_or(DEFAULT_ACK_RETRY_COUNT),
            ack_retry_backoff: Duration::from_millis(
                proxy.ack_retry_backoff_ms.unwrap_or(DEFAULT_ACK_RETRY_BACKOFF_MS),
            ),
        })
    }
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (Option everywhere, validated afterward)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    proxy: Option<RawProxyConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct RawProxyConfig {
    host: Option<String>,
    port: Option<u16>,
    heartbeat_interval_ms: Option<u64>,
    backend_connect_timeout_ms: Option<u64>,
    backend_read_timeout_ms: Option<u64>,
    ack_retry_count: Option<u32>,
    ack_retry_backoff_ms: Option<u64>,
}
