//! Backend endpoint: per-replica handle for liveness probing, the ACK
//! send protocol, and journal replay.
//!
//! The capability set is a trait (redesigned per SPEC_FULL.md REDESIGN
//! FLAGS) so the dispatcher and heartbeat manager are generic over a real
//! TCP-backed replica or a scripted test double, instead of being
//! hard-wired to [`tokio::net::TcpStream`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::TransportError;

/// Number of attempts `send_and_await_ack` makes before giving up.
pub const ACK_RETRY_COUNT: u32 = 3;
/// Back-off between retry attempts.
pub const ACK_RETRY_BACKOFF: Duration = Duration::from_millis(200);
/// Connect timeout for every outbound backend connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
/// Read timeout for each line read in the ACK protocol.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Capability set exposed by a backend replica.
///
/// Unit tests substitute a scripted implementation that returns
/// configured sequences of responses/errors without opening real sockets.
#[async_trait]
pub trait BackendEndpoint: Send + Sync {
    /// Stable identity, used as the `S` ordering key and for logging.
    fn address(&self) -> &str;

    /// Attempt a TCP connect with a 1s timeout. Does not mutate `alive`;
    /// the caller (heartbeat manager) updates it based on the result.
    async fn probe(&self) -> bool;

    /// Open a fresh connection, write `request`, await `ACK`, then read
    /// and return the response line. Retries up to [`ACK_RETRY_COUNT`]
    /// times with [`ACK_RETRY_BACKOFF`] between attempts.
    async fn send_and_await_ack(&self, request: &str) -> Result<String, TransportError>;

    /// Send every journal entry to this backend, in order, over one
    /// connection. Does not await ACKs — replay is idempotent on the
    /// backend side. Aborts on the first transport error.
    async fn replay(&self, entries: &[String]) -> Result<(), TransportError>;

    fn mark_dead(&self);
    fn mark_alive(&self);
    fn is_alive(&self) -> bool;
    fn mark_synced(&self);
    fn mark_unsynced(&self);
    fn is_synced(&self) -> bool;
}

/// Tuning knobs for a [`TcpBackend`], sourced from [`crate::config::ProxyConfig`].
///
/// Defaults match the spec's literal constants, used whenever a backend
/// is constructed without an explicit tuning (e.g. in unit tests).
#[derive(Debug, Clone, Copy)]
pub struct BackendTuning {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub ack_retry_count: u32,
    pub ack_retry_backoff: Duration,
}

impl Default for BackendTuning {
    fn default() -> Self {
        BackendTuning {
            connect_timeout: CONNECT_TIMEOUT,
            read_timeout: READ_TIMEOUT,
            ack_retry_count: ACK_RETRY_COUNT,
            ack_retry_backoff: ACK_RETRY_BACKOFF,
        }
    }
}

/// A backend reachable over plain TCP: `host:port`, newline-delimited.
pub struct TcpBackend {
    host: String,
    port: u16,
    addr: String,
    alive: AtomicBool,
    synced: AtomicBool,
    tuning: BackendTuning,
}

impl TcpBackend {
    /// Construct a new backend endpoint in the `REGISTERED` state:
    /// `alive = true`, `synced = false` (fresh), using the spec's
    /// default tuning constants.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_tuning(host, port, BackendTuning::default())
    }

    /// Construct a new backend endpoint with explicit tuning, typically
    /// sourced from the loaded [`crate::config::ProxyConfig`].
    pub fn with_tuning(host: impl Into<String>, port: u16, tuning: BackendTuning) -> Self {
        let host = host.into();
        let addr = format!("{}:{}", host, port);
        TcpBackend {
            host,
            port,
            addr,
            alive: AtomicBool::new(true),
            synced: AtomicBool::new(false),
            tuning,
        }
    }

    fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn connect(&self) -> Result<TcpStream, TransportError> {
        let addr = self.socket_addr();
        match timeout(self.tuning.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(TransportError::Connect { addr, source }),
            Err(_) => Err(TransportError::ConnectTimeout { addr }),
        }
    }

    async fn read_line(&self, reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> Result<String, TransportError> {
        let addr = self.socket_addr();
        let mut line = String::new();
        let n = timeout(self.tuning.read_timeout, reader.read_line(&mut line))
            .await
            .map_err(|_| TransportError::ReadTimeout { addr: addr.clone() })?
            .map_err(|source| TransportError::Io {
                addr: addr.clone(),
                source,
            })?;
        if n == 0 {
            return Err(TransportError::Eof { addr });
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_owned())
    }

    async fn try_send_and_await_ack(&self, request: &str) -> Result<String, TransportError> {
        let addr = self.socket_addr();
        let stream = self.connect().await?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let mut line = request.to_owned();
        line.push('\n');
        timeout(self.tuning.read_timeout, write_half.write_all(line.as_bytes()))
            .await
            .map_err(|_| TransportError::ReadTimeout { addr: addr.clone() })?
            .map_err(|source| TransportError::Io {
                addr: addr.clone(),
                source,
            })?;

        let ack_line = self.read_line(&mut reader).await?;
        if !ack_line.eq_ignore_ascii_case("ack") {
            return Err(TransportError::BadAck {
                addr,
                line: ack_line,
            });
        }

        self.read_line(&mut reader).await
    }
}

#[async_trait]
impl BackendEndpoint for TcpBackend {
    fn address(&self) -> &str {
        &self.addr
    }

    async fn probe(&self) -> bool {
        self.connect().await.is_ok()
    }

    async fn send_and_await_ack(&self, request: &str) -> Result<String, TransportError> {
        let mut last_err = None;
        for attempt in 0..self.tuning.ack_retry_count {
            match self.try_send_and_await_ack(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    debug!(backend = %self.addr, attempt, error = %e, "send_and_await_ack attempt failed");
                    last_err = Some(e);
                    if attempt + 1 < self.tuning.ack_retry_count {
                        tokio::time::sleep(self.tuning.ack_retry_backoff).await;
                    }
                }
            }
        }
        Err(last_err.expect("loop runs at least once"))
    }

    async fn replay(&self, entries: &[String]) -> Result<(), TransportError> {
        let addr = self.socket_addr();
        let stream = self.connect().await?;
        let (_read_half, mut write_half) = stream.into_split();
        for entry in entries {
            let mut line = entry.clone();
            line.push('\n');
            timeout(READ_TIMEOUT, write_half.write_all(line.as_bytes()))
                .await
                .map_err(|_| TransportError::ReadTimeout { addr: addr.clone() })?
                .map_err(|source| TransportError::Io {
                    addr: addr.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    fn mark_dead(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            warn!(backend = %self.addr, "backend marked dead");
        }
    }

    fn mark_alive(&self) {
        self.alive.store(true, Ordering::SeqCst);
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn mark_synced(&self) {
        self.synced.store(true, Ordering::SeqCst);
    }

    fn mark_unsynced(&self) {
        self.synced.store(false, Ordering::SeqCst);
    }

    fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

/// Synthesize the collision-prone `ADDRESS` format the source uses:
/// host and port concatenated without a separator (e.g. `127.0.0.155123`).
///
/// Flagged in SPEC_FULL.md Open Question 2 as a known defect, implemented
/// literally for behavioral parity.
pub fn synthesize_address(peer: SocketAddr) -> String {
    format!("{}{}", peer.ip(), peer.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_backend_is_alive_and_unsynced() {
        let b = TcpBackend::new("127.0.0.1", 9001);
        assert!(b.is_alive());
        assert!(!b.is_synced());
        assert_eq!(b.address(), "127.0.0.1:9001");
    }

    #[test]
    fn mark_dead_then_alive_toggles_state() {
        let b = TcpBackend::new("127.0.0.1", 9001);
        b.mark_dead();
        assert!(!b.is_alive());
        b.mark_alive();
        assert!(b.is_alive());
    }

    #[test]
    fn synthesize_address_concatenates_without_separator() {
        let addr: SocketAddr = "127.0.0.1:55123".parse().unwrap();
        assert_eq!(synthesize_address(addr), "127.0.0.155123");
    }

    #[tokio::test]
    async fn probe_against_closed_port_fails() {
        // Port 0 never accepts; connect should fail quickly rather than
        // hang for the full 1s timeout in the common case.
        let b = TcpBackend::new("127.0.0.1", 0);
        assert!(!b.probe().await);
    }
}
