use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, warn};

use crate::error::Error;
use crate::source::{Snapshot, Source};
use crate::store::{LayerRank, RegistryStore};

/// Per-source options recognized by the registry builder.
#[derive(Default, Clone)]
pub struct LayerOptions {
    /// Layer name; falls back to the source id.
    pub alias: Option<String>,
    /// Resolution priority; higher wins. Defaults to insertion order.
    pub priority: Option<i64>,
    /// Invoked with source-level faults (I/O errors, watcher termination).
    pub on_errors: Option<Arc<dyn Fn(&Error) + Send + Sync>>,
}

impl LayerOptions {
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn on_errors(mut self, f: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_errors = Some(Arc::new(f));
        self
    }
}

/// A source bound into a registry at a fixed rank, holding a private mirror
/// of the last snapshot it accepted. Belongs to exactly one registry for its
/// lifetime.
pub struct Layer {
    source: Arc<dyn Source>,
    alias: Option<String>,
    rank: LayerRank,
    store: Arc<RegistryStore>,
    mirror: Mutex<HashMap<String, String>>,
    initialized: AtomicBool,
    refresh_requested: AtomicBool,
    on_errors: Option<Arc<dyn Fn(&Error) + Send + Sync>>,
    prev: Mutex<Weak<Layer>>,
    next: Mutex<Weak<Layer>>,
}

impl Layer {
    /// Create the layer and hook it up to its source: the downstream callback
    /// diffs incoming snapshots into the store, the error sink forwards
    /// source faults to `on_errors`.
    pub(crate) fn bind(
        source: Arc<dyn Source>,
        options: LayerOptions,
        rank: LayerRank,
        store: Arc<RegistryStore>,
    ) -> Arc<Layer> {
        let layer = Arc::new(Layer {
            source: source.clone(),
            alias: options.alias,
            rank,
            store,
            mirror: Mutex::new(HashMap::new()),
            initialized: AtomicBool::new(false),
            refresh_requested: AtomicBool::new(false),
            on_errors: options.on_errors,
            prev: Mutex::new(Weak::new()),
            next: Mutex::new(Weak::new()),
        });

        let weak = Arc::downgrade(&layer);
        source.register(Arc::new(move |snapshot| {
            if let Some(layer) = weak.upgrade() {
                layer.accept(snapshot);
            }
        }));

        let weak = Arc::downgrade(&layer);
        source.register_errors(Arc::new(move |err| {
            if let Some(layer) = weak.upgrade() {
                layer.report_error(&err);
            }
        }));

        layer
    }

    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or_else(|| self.source.id())
    }

    pub fn priority(&self) -> i64 {
        self.rank.priority
    }

    pub(crate) fn rank(&self) -> LayerRank {
        self.rank
    }

    pub(crate) fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Ask the source for its first snapshot. Idempotent; a no-op once the
    /// layer has accepted a snapshot or a refresh is already pending.
    pub fn initialize(&self) {
        if self.initialized.load(Ordering::SeqCst) {
            return;
        }
        if !self.refresh_requested.swap(true, Ordering::SeqCst) {
            self.source.refresh();
        }
    }

    /// Diff `snapshot` against the mirror and forward the deltas to the
    /// store. Guarded by the mirror lock: a second `accept` that begins
    /// before the first returns blocks until it is done, so downstream always
    /// observes internally-consistent snapshots.
    pub fn accept(&self, snapshot: Snapshot) {
        let mut mirror = self.mirror.lock().unwrap();

        let gone: Vec<String> = mirror
            .keys()
            .filter(|k| !snapshot.contains_key(*k))
            .cloned()
            .collect();
        for key in gone {
            mirror.remove(&key);
            self.store.put(&key, None, self.rank);
        }

        for (key, value) in snapshot {
            match mirror.get(&key) {
                Some(current) if *current == value => {}
                _ => {
                    self.store.put(&key, Some(value.clone()), self.rank);
                    mirror.insert(key, value);
                }
            }
        }

        self.initialized.store(true, Ordering::SeqCst);
        debug!("layer '{}' accepted snapshot, {} keys mirrored", self.name(), mirror.len());
    }

    /// Keys currently defined by this layer.
    pub fn mirrored_keys(&self) -> Vec<String> {
        self.mirror.lock().unwrap().keys().cloned().collect()
    }

    pub(crate) fn report_error(&self, err: &Error) {
        warn!("layer '{}' source fault: {}", self.name(), err);
        if let Some(on_errors) = &self.on_errors {
            on_errors(err);
        }
    }

    pub(crate) fn set_prev(&self, other: &Arc<Layer>) {
        *self.prev.lock().unwrap() = Arc::downgrade(other);
    }

    pub(crate) fn set_next(&self, other: &Arc<Layer>) {
        *self.next.lock().unwrap() = Arc::downgrade(other);
    }

    /// Neighbor with the next-lower rank, if any.
    pub fn prev(&self) -> Option<Arc<Layer>> {
        self.prev.lock().unwrap().upgrade()
    }

    /// Neighbor with the next-higher rank, if any.
    pub fn next(&self) -> Option<Arc<Layer>> {
        self.next.lock().unwrap().upgrade()
    }
}
