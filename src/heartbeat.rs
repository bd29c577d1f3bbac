//! Membership & heartbeat manager: periodic liveness probing, primary
//! failover, and recovery replay (SPEC_FULL.md §4.D).
//!
//! Runs as a single periodic `tokio` task, in the style of the teacher's
//! periodic-task loops (`tokio::time::interval` + `loop { tick().await }`).

use std::time::Duration;

use tracing::{info, warn};

use crate::state::ProxyState;

/// Spawn the heartbeat task, ticking every `interval`. Returns the
/// `JoinHandle` so callers may await or abort it (tests do the latter).
pub fn spawn(state: ProxyState, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so the proxy's first
        // probe happens one full interval after startup, matching the
        // "periodic task every 5s" semantics rather than an instant burst.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            run_tick(&state).await;
        }
    })
}

/// Run one heartbeat tick over a snapshot of the current backend set.
pub async fn run_tick(state: &ProxyState) {
    let backends = state.snapshot_backends().await;
    let n = backends.len();

    for (i, backend) in backends.iter().enumerate() {
        let ok = backend.probe().await;

        if !ok {
            backend.mark_dead();
            if i == state.primary_index() && n > 0 {
                let next = (i + 1) % n;
                state.set_primary_index(next);
                warn!(backend = %backend.address(), new_primary = next, "primary failed over");
            }
            continue;
        }

        if !backend.is_synced() && i != state.primary_index() && n > 1 {
            let entries = state.journal().tail_from(0).await;
            match backend.replay(&entries).await {
                Ok(()) => {
                    backend.mark_synced();
                    backend.mark_alive();
                    info!(backend = %backend.address(), entries = entries.len(), "replay succeeded, backend rejoined rotation");
                }
                Err(e) => {
                    warn!(backend = %backend.address(), error = %e, "replay failed, backend remains unsynced");
                }
            }
            continue;
        }

        // Primary, sole, or already-synced backends don't go through
        // replay: a successful probe alone must restore `alive` so
        // `is_alive() <=> probe()` holds after every tick, even if this
        // backend was marked dead by a previous failed probe or dispatch.
        backend.mark_alive();
    }
}
