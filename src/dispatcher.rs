//! Request dispatch: round-robin selection over the backend set with
//! bounded retry, ACK protocol, and journal append.
//!
//! Grounded on the teacher's `uplink.rs` send/ack loop pattern, adapted
//! from a single persistent WebSocket session to a fresh TCP connection
//! per request with failover across the shared backend set (SPEC_FULL.md
//! §4.E).

use tracing::{info, warn};

use crate::codec::{ERR_ALL_BACKENDS_DOWN, ERR_NO_BACKENDS};
use crate::state::ProxyState;

/// Forward `request` to a live backend, retrying across the backend set
/// until one acknowledges or all candidates are exhausted.
///
/// The journal append happens unconditionally, before the backend-count
/// check, per SPEC_FULL.md §8 Boundary Behavior (Open Question 1
/// resolved as pre-append).
pub async fn forward(state: &ProxyState, request: &str) -> String {
    state.journal().append(request.to_owned()).await;

    let backends = state.snapshot_backends().await;
    let n = backends.len();
    if n == 0 {
        return ERR_NO_BACKENDS.to_owned();
    }

    for attempt in 0..n {
        let idx = state.next_cursor(n);
        let backend = &backends[idx];
        if !backend.is_alive() {
            continue;
        }
        match backend.send_and_await_ack(request).await {
            Ok(response) => {
                info!(backend = %backend.address(), attempt, "forward succeeded");
                return response;
            }
            Err(e) => {
                warn!(backend = %backend.address(), attempt, error = %e, "forward attempt failed");
                backend.mark_dead();
            }
        }
    }

    ERR_ALL_BACKENDS_DOWN.to_owned()
}
