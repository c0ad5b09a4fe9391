/// Channel registry — the single shared map between the receive loop and
/// consumer code.
///
/// The receive loop resolves destinations here; consumers add and remove
/// entries via join/part. All access goes through the RwLock, so the loop
/// never observes a half-constructed entry.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};

/// Delivery queue depth per channel. A consumer that stops draining its
/// channel backs up only that queue; the receive loop drops lines after a
/// short timeout instead of stalling the connection.
pub(crate) const DELIVERY_CAPACITY: usize = 256;

/// Shared member-nick set for one channel. Best-effort: populated from
/// JOIN/PART events observed while joined, never queried from the server.
pub(crate) type MemberSet = Arc<RwLock<HashSet<String>>>;

/// One live registry entry: the shared pieces every handle for this channel
/// is built from. Deliberately holds no command sender, so registry entries
/// never keep the receive loop alive on their own — once the [`Connection`]
/// and every consumer handle are dropped, the loop's command receiver goes
/// dead and it shuts down.
///
/// [`Connection`]: crate::connection::Connection
#[derive(Clone)]
pub(crate) struct Entry {
    /// Write side of the delivery queue, used only by the receive loop.
    pub tx: mpsc::Sender<String>,
    /// Read side of the delivery queue, shared by every handle.
    pub rx: Arc<Mutex<mpsc::Receiver<String>>>,
    /// Shared member-nick set.
    pub members: MemberSet,
    /// Set once by `part`; shared so repeat joins observe closure.
    pub closed: Arc<AtomicBool>,
}

#[derive(Clone, Default)]
pub(crate) struct Registry {
    inner: Arc<RwLock<HashMap<String, Entry>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a clone of the existing entry, or build and insert a fresh
    /// one under the same write lock. The boolean reports whether an insert
    /// happened.
    pub async fn join_entry<F>(&self, name: &str, create: F) -> (Entry, bool)
    where
        F: FnOnce() -> Entry,
    {
        let mut map = self.inner.write().await;
        if let Some(entry) = map.get(name) {
            return (entry.clone(), false);
        }
        let entry = create();
        map.insert(name.to_owned(), entry.clone());
        (entry, true)
    }

    /// Resolve a destination to its delivery sender and member set.
    pub async fn lookup(&self, name: &str) -> Option<(mpsc::Sender<String>, MemberSet)> {
        let map = self.inner.read().await;
        map.get(name)
            .map(|entry| (entry.tx.clone(), Arc::clone(&entry.members)))
    }

    /// Remove an entry, dropping its delivery sender. Later lines for this
    /// destination miss the lookup and are silently dropped.
    pub async fn remove(&self, name: &str) -> bool {
        self.inner.write().await.remove(name).is_some()
    }

    /// Drop every entry, releasing all delivery senders so blocked channel
    /// reads observe end-of-stream. Called once when the receive loop exits.
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}
