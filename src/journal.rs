//! In-memory append-only journal of forwarded requests.
//!
//! Durability is explicitly out of scope (see SPEC_FULL.md §1 non-goals):
//! this is a `Vec<String>` behind a mutex, not a WAL. The process restarts
//! with an empty journal.

use tokio::sync::Mutex;

/// Append-only ordered log of encoded requests.
///
/// `append` happens-before the corresponding forward's first network
/// attempt, so a replica that replays `tail_from(0)` never misses a
/// request any live replica may have observed.
#[derive(Default)]
pub struct Journal {
    entries: Mutex<Vec<String>>,
}

impl Journal {
    pub fn new() -> Self {
        Journal {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Append one entry.
    pub async fn append(&self, entry: String) {
        self.entries.lock().await.push(entry);
    }

    /// Return a defensive copy of every entry from `offset` onward.
    ///
    /// `offset = 0` yields the full journal. An out-of-range offset
    /// yields an empty sequence.
    pub async fn tail_from(&self, offset: usize) -> Vec<String> {
        let entries = self.entries.lock().await;
        if offset >= entries.len() {
            Vec::new()
        } else {
            entries[offset..].to_vec()
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
