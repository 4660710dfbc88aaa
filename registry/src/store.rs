use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use flume::Sender;
use tracing::trace;

/// Number of lock stripes for per-key locking.
const LOCK_STRIPES: usize = 32;

/// Total order of layers: priority ascending, registration order breaking
/// ties (a later-registered layer with the same priority wins). The
/// registration sequence is assigned by the builder in insertion order, so
/// the tie-break is stable across rebuilds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerRank {
    pub priority: i64,
    pub seq: u64,
}

struct Watcher {
    id: u64,
    tx: Sender<Option<String>>,
}

#[derive(Default)]
struct KeyState {
    /// One entry per contributing layer, ordered by rank ascending; the last
    /// entry is the effective value.
    entries: BTreeMap<LayerRank, String>,
    watchers: Vec<Watcher>,
}

impl KeyState {
    fn effective(&self) -> Option<&String> {
        self.entries.iter().next_back().map(|(_, v)| v)
    }
}

/// Maps every key to its per-layer entries and computes effective values.
/// Locking is striped by key hash so writers on unrelated keys do not
/// contend. Watcher notifications go out through unbounded channels, so
/// `put` never blocks on a slow consumer.
pub struct RegistryStore {
    stripes: Vec<Mutex<HashMap<String, KeyState>>>,
    next_watcher_id: AtomicU64,
}

impl Default for RegistryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryStore {
    pub fn new() -> Self {
        RegistryStore {
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(HashMap::new())).collect(),
            next_watcher_id: AtomicU64::new(1),
        }
    }

    fn stripe(&self, key: &str) -> &Mutex<HashMap<String, KeyState>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.stripes[(hasher.finish() as usize) % LOCK_STRIPES]
    }

    /// Insert, update or (with `value == None`) remove the entry of one layer
    /// for `key`. When the effective value changes, every watcher of the key
    /// is notified exactly once with the new effective value.
    pub fn put(&self, key: &str, value: Option<String>, rank: LayerRank) {
        let mut map = self.stripe(key).lock().unwrap();
        let state = map.entry(key.to_string()).or_default();

        let old = state.effective().cloned();
        match value {
            Some(v) => {
                state.entries.insert(rank, v);
            }
            None => {
                state.entries.remove(&rank);
            }
        }
        let new = state.effective().cloned();

        if old != new {
            trace!("effective value of '{}' changed", key);
            state.watchers.retain(|w| w.tx.send(new.clone()).is_ok());
        }

        if state.entries.is_empty() && state.watchers.is_empty() {
            map.remove(key);
        }
    }

    /// Current effective value of `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.stripe(key)
            .lock()
            .unwrap()
            .get(key)
            .and_then(|state| state.effective().cloned())
    }

    /// Register a notification channel for `key`. Registration and the read
    /// of the current effective value happen under the same key lock, so no
    /// update can fall between them. Returns the watcher id and the current
    /// effective value.
    pub fn watch(&self, key: &str, tx: Sender<Option<String>>) -> (u64, Option<String>) {
        let id = self.next_watcher_id.fetch_add(1, Ordering::Relaxed);
        let mut map = self.stripe(key).lock().unwrap();
        let state = map.entry(key.to_string()).or_default();
        let current = state.effective().cloned();
        state.watchers.push(Watcher { id, tx });
        (id, current)
    }

    pub fn unwatch(&self, key: &str, id: u64) {
        let mut map = self.stripe(key).lock().unwrap();
        if let Some(state) = map.get_mut(key) {
            state.watchers.retain(|w| w.id != id);
            if state.entries.is_empty() && state.watchers.is_empty() {
                map.remove(key);
            }
        }
    }
}
