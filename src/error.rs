//! Typed error enums for the proxy's subsystems.
//!
//! Mirrors the per-module error-enum convention used throughout the
//! forwarder/server codebase (`UplinkError`, `JournalError`): one enum
//! per subsystem, a `Display` impl, and `std::error::Error`.

use std::path::PathBuf;

/// Failure talking to a backend replica: connect, read, write, or a
/// malformed ACK handshake. Recovered by retry inside
/// [`crate::backend::BackendEndpoint::send_and_await_ack`], then by
/// failover in [`crate::dispatcher::forward`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("connect to {addr} timed out")]
    ConnectTimeout { addr: String },
    #[error("read/write to {addr} failed: {source}")]
    Io {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("read from {addr} timed out")]
    ReadTimeout { addr: String },
    #[error("{addr} closed the connection before replying")]
    Eof { addr: String },
    #[error("{addr} sent unexpected ACK line: {line:?}")]
    BadAck { addr: String, line: String },
}

impl TransportError {
    pub fn addr(&self) -> &str {
        match self {
            TransportError::Connect { addr, .. }
            | TransportError::ConnectTimeout { addr }
            | TransportError::Io { addr, .. }
            | TransportError::ReadTimeout { addr }
            | TransportError::Eof { addr }
            | TransportError::BadAck { addr, .. } => addr,
        }
    }
}

/// Fatal startup configuration error. `main` treats this as unrecoverable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found at {path}: {source}")]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config file {path} is not valid TOML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("config is missing required key `{key}`")]
    MissingKey { key: &'static str },
}
