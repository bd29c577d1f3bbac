//! Shared integration-test harness: a scripted TCP backend double (plays
//! the `ACK`-then-response protocol without a real replica process) and
//! helpers for standing up a real proxy instance on an ephemeral port.
//!
//! Grounded on the teacher's `free_port` helper
//! (`services/receiver/src/local_proxy.rs` tests) and its
//! bind-then-spawn-accept-loop pattern.

use std::time::Duration;

use msgproxy::backend::BackendTuning;
use msgproxy::state::ProxyState;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Tuning with short timeouts/backoff so failover-path tests run fast.
pub fn fast_tuning() -> BackendTuning {
    BackendTuning {
        connect_timeout: Duration::from_millis(200),
        read_timeout: Duration::from_millis(200),
        ack_retry_count: 3,
        ack_retry_backoff: Duration::from_millis(10),
    }
}

/// Claim a free local port and release it immediately. Racy in theory;
/// good enough for a test harness (same approach as the teacher's).
pub async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    tokio::time::sleep(Duration::from_millis(10)).await;
    port
}

/// Start the real proxy server on an ephemeral port against `state`.
/// Returns the bound port; the server task runs for the rest of the
/// process (tests don't need a clean shutdown path).
pub async fn spawn_proxy(state: ProxyState) -> u16 {
    spawn_proxy_with_heartbeat(state, Duration::from_millis(50)).await
}

/// Like [`spawn_proxy`] but with an explicit heartbeat interval, for
/// tests that need the heartbeat task out of the way of an in-flight
/// dispatch (e.g. recovery-replay timing).
pub async fn spawn_proxy_with_heartbeat(state: ProxyState, heartbeat_interval: Duration) -> u16 {
    let port = free_port().await;
    tokio::spawn(async move {
        msgproxy::server::run(state, "127.0.0.1", port, heartbeat_interval)
            .await
            .expect("proxy server error");
    });
    // Give the accept loop a moment to bind before the first client connects.
    tokio::time::sleep(Duration::from_millis(20)).await;
    port
}

/// A scripted backend: accepts one connection at a time and replies with
/// a fixed `ACK\n<response>\n` to every request it reads. Never drops
/// connections on its own (the dispatcher closes after each request).
pub struct ScriptedAckBackend {
    pub port: u16,
}

impl ScriptedAckBackend {
    /// Start accepting connections, always responding with `response`.
    pub async fn start(response: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(serve_one(stream, response));
            }
        });
        ScriptedAckBackend { port }
    }

    /// Start a backend that accepts connections but never writes an ACK,
    /// forcing every `send_and_await_ack` attempt to time out.
    pub async fn start_silent() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                // Hold the connection open without replying.
                tokio::spawn(async move {
                    let _stream = stream;
                    tokio::time::sleep(Duration::from_secs(10)).await;
                });
            }
        });
        ScriptedAckBackend { port }
    }
}

async fn serve_one(stream: TcpStream, response: &'static str) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
        return;
    }
    let reply = format!("ACK\n{}\n", response);
    let _ = write_half.write_all(reply.as_bytes()).await;
}

/// Register a backend with the proxy at `proxy_port` over the wire
/// protocol (exercises the real `REGISTER` handler rather than poking
/// `ProxyState` directly).
pub async fn register_backend(proxy_port: u16, backend_port: u16) {
    let mut stream = TcpStream::connect(("127.0.0.1", proxy_port)).await.unwrap();
    stream
        .write_all(format!("OPERACION:REGISTER;IP:127.0.0.1;PUERTO:{}\n", backend_port).as_bytes())
        .await
        .unwrap();
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    assert_eq!(line.trim_end(), "RESPUESTA:ACK");
}
