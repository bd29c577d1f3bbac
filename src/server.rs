//! Accept loop (SPEC_FULL.md §4.G): binds the proxy's listening endpoint
//! and spawns one session handler per accepted connection.
//!
//! Grounded on the teacher's `LocalProxy::bind` accept loop
//! (`services/receiver/src/local_proxy.rs`): a `TcpListener` plus a
//! spawn-per-connection loop, no throttling or backpressure.

use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::heartbeat;
use crate::session;
use crate::state::ProxyState;

/// Bind `host:port` and run the accept loop forever, spawning a fresh
/// heartbeat task alongside it. Returns only on a fatal bind error.
pub async fn run(
    state: ProxyState,
    host: &str,
    port: u16,
    heartbeat_interval: Duration,
) -> std::io::Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "proxy listening");

    heartbeat::spawn(state.clone(), heartbeat_interval);

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!(%peer, "accepted connection");
                let state = state.clone();
                tokio::spawn(async move {
                    session::handle(state, stream, peer).await;
                });
            }
            Err(e) => {
                warn!(error = %e, "accept error");
            }
        }
    }
}
