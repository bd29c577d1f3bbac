//! Process-wide proxy state: the backend set `S`, primary index `p`,
//! journal `J`, and connected-user map `U`.
//!
//! Grounded on the teacher's `AppState` (`services/server/src/state.rs`):
//! one `Clone`-cheap struct wrapping `Arc`-shared collections, threaded
//! explicitly through every handler rather than kept as ambient globals
//! (SPEC_FULL.md §9 "Global mutable state").

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, RwLock};

use crate::backend::{BackendEndpoint, BackendTuning};
use crate::journal::Journal;

/// A connected client's write half, shared so `SEND_MESSAGE` can push to
/// it from a different task than the one reading its requests.
///
/// The map holds this handle only; the owning session task holds the
/// read half and removes its `U` entry on every exit path, so `U` never
/// extends the socket's lifetime on its own (SPEC_FULL.md §9 "Cyclic/
/// back-reference shapes").
pub type ClientHandle = Arc<Mutex<OwnedWriteHalf>>;

/// Process-wide state shared across the accept loop, every session
/// handler, and the heartbeat task. Cheap to clone (all fields are
/// `Arc`s); pass by value into spawned tasks.
#[derive(Clone)]
pub struct ProxyState {
    backends: Arc<RwLock<Vec<Arc<dyn BackendEndpoint>>>>,
    primary: Arc<AtomicUsize>,
    cursor: Arc<AtomicUsize>,
    journal: Arc<Journal>,
    users: Arc<RwLock<HashMap<String, ClientHandle>>>,
    backend_tuning: BackendTuning,
}

impl ProxyState {
    pub fn new() -> Self {
        Self::with_backend_tuning(BackendTuning::default())
    }

    /// Construct with backend tuning sourced from the loaded
    /// [`crate::config::ProxyConfig`], applied to every backend
    /// registered afterward via [`ProxyState::register_backend_at`].
    pub fn with_backend_tuning(backend_tuning: BackendTuning) -> Self {
        ProxyState {
            backends: Arc::new(RwLock::new(Vec::new())),
            primary: Arc::new(AtomicUsize::new(0)),
            cursor: Arc::new(AtomicUsize::new(0)),
            journal: Arc::new(Journal::new()),
            users: Arc::new(RwLock::new(HashMap::new())),
            backend_tuning,
        }
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn backend_tuning(&self) -> BackendTuning {
        self.backend_tuning
    }

    /// Register a new backend endpoint, appending it to `S` in
    /// registration order. Idempotent at the protocol level: duplicate
    /// registrations produce duplicate entries (SPEC_FULL.md §7).
    pub async fn register_backend(&self, backend: Arc<dyn BackendEndpoint>) {
        self.backends.write().await.push(backend);
    }

    /// Defensive snapshot of the current backend set, safe to iterate
    /// without holding the lock across `.await` points.
    pub async fn snapshot_backends(&self) -> Vec<Arc<dyn BackendEndpoint>> {
        self.backends.read().await.clone()
    }

    pub async fn backend_count(&self) -> usize {
        self.backends.read().await.len()
    }

    /// Atomically take the next round-robin slot, mod `n`. Advances even
    /// when the candidate is skipped for being dead, preserving fairness
    /// across calls (SPEC_FULL.md §3 "Round-robin cursor").
    pub fn next_cursor(&self, n: usize) -> usize {
        self.cursor.fetch_add(1, Ordering::SeqCst) % n
    }

    pub fn primary_index(&self) -> usize {
        self.primary.load(Ordering::SeqCst)
    }

    pub fn set_primary_index(&self, idx: usize) {
        self.primary.store(idx, Ordering::SeqCst);
    }

    /// Insert `addr -> handle` only if absent. Returns `true` if this
    /// call performed the insert.
    pub async fn insert_user_if_absent(&self, addr: &str, handle: ClientHandle) -> bool {
        let mut users = self.users.write().await;
        if users.contains_key(addr) {
            return false;
        }
        users.insert(addr.to_owned(), handle);
        true
    }

    pub async fn lookup_user(&self, addr: &str) -> Option<ClientHandle> {
        self.users.read().await.get(addr).cloned()
    }

    pub async fn remove_user(&self, addr: &str) {
        self.users.write().await.remove(addr);
    }

    #[cfg(test)]
    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

impl Default for ProxyState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TcpBackend;

    #[tokio::test]
    async fn register_backend_appends_in_order() {
        let state = ProxyState::new();
        state
            .register_backend(Arc::new(TcpBackend::new("127.0.0.1", 9001)))
            .await;
        state
            .register_backend(Arc::new(TcpBackend::new("127.0.0.1", 9002)))
            .await;

        let snapshot = state.snapshot_backends().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].address(), "127.0.0.1:9001");
        assert_eq!(snapshot[1].address(), "127.0.0.1:9002");
    }

    #[tokio::test]
    async fn next_cursor_increments_and_wraps() {
        let state = ProxyState::new();
        assert_eq!(state.next_cursor(3), 0);
        assert_eq!(state.next_cursor(3), 1);
        assert_eq!(state.next_cursor(3), 2);
        assert_eq!(state.next_cursor(3), 0);
    }

    #[tokio::test]
    async fn insert_user_if_absent_rejects_second_insert() {
        let state = ProxyState::new();
        let (_client, handle) = fake_handle().await;
        assert!(state.insert_user_if_absent("1.2.3.4:9", handle.clone()).await);
        assert!(!state.insert_user_if_absent("1.2.3.4:9", handle).await);
        assert_eq!(state.user_count().await, 1);
    }

    #[tokio::test]
    async fn remove_user_clears_entry() {
        let state = ProxyState::new();
        let (_client, handle) = fake_handle().await;
        state.insert_user_if_absent("addr", handle).await;
        state.remove_user("addr").await;
        assert!(state.lookup_user("addr").await.is_none());
    }

    async fn fake_handle() -> (tokio::net::TcpStream, ClientHandle) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = tokio::net::TcpStream::connect(addr);
        let accept = listener.accept();
        let (client, (server, _)) = tokio::join!(connect, accept);
        let client = client.unwrap();
        let (_read, write) = server.unwrap().into_split();
        (client, Arc::new(Mutex::new(write)))
    }
}
