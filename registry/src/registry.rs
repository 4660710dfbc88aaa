use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::chain::LayerChain;
use crate::convert::Codec;
use crate::error::{Error, Result};
use crate::layer::{Layer, LayerOptions};
use crate::prop::{CustomPropBuilder, Prop, PropDef};
use crate::scheduler::Scheduler;
use crate::source::Source;
use crate::store::{LayerRank, RegistryStore};

/// Collects sources and builds the registry: one layer per source, linked by
/// rank, pre-initialized in rank order.
#[derive(Default)]
pub struct RegistryBuilder {
    sources: Vec<(Arc<dyn Source>, LayerOptions)>,
    scheduler: Option<Arc<Scheduler>>,
}

impl RegistryBuilder {
    /// Add a source with default options (priority = insertion order).
    pub fn source(self, source: Arc<dyn Source>) -> Self {
        self.source_with(source, LayerOptions::default())
    }

    pub fn source_with(mut self, source: Arc<dyn Source>, options: LayerOptions) -> Self {
        self.sources.push((source, options));
        self
    }

    /// Use an explicit scheduler instead of the default (the ambient tokio
    /// runtime when built inside one, otherwise an owned worker pool).
    pub fn scheduler(mut self, scheduler: Arc<Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn build(self) -> Result<Registry> {
        let scheduler = match self.scheduler {
            Some(s) => s,
            None => match Scheduler::current() {
                Some(s) => Arc::new(s),
                None => Arc::new(
                    Scheduler::new("props", crate::scheduler::DEFAULT_WORKER_THREADS)
                        .map_err(|e| Error::source_io("scheduler", e))?,
                ),
            },
        };

        let store = Arc::new(RegistryStore::new());
        let mut layers = Vec::with_capacity(self.sources.len());
        for (seq, (source, options)) in self.sources.into_iter().enumerate() {
            let priority = options.priority.unwrap_or(seq as i64);
            let rank = LayerRank {
                priority,
                seq: seq as u64,
            };
            layers.push(Layer::bind(source, options, rank, store.clone()));
        }
        let chain = LayerChain::new(layers);

        let registry = Registry {
            inner: Arc::new(RegistryInner {
                store,
                chain,
                scheduler,
                bound: Mutex::new(HashMap::new()),
            }),
        };

        for layer in registry.inner.chain.iter() {
            layer.initialize();
        }
        debug!("registry built with {} layers", registry.inner.chain.len());

        Ok(registry)
    }
}

struct RegistryInner {
    store: Arc<RegistryStore>,
    chain: LayerChain,
    scheduler: Arc<Scheduler>,
    /// key -> store watcher id, one bound prop per key
    bound: Mutex<HashMap<String, u64>>,
}

/// Facade owning the layer chain and the store. Cheap to clone.
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Clone for Registry {
    fn clone(&self) -> Self {
        Registry {
            inner: self.inner.clone(),
        }
    }
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn layers(&self) -> &LayerChain {
        &self.inner.chain
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.inner.scheduler
    }

    /// Current effective raw value of `key`. A miss asks every on-demand
    /// source to materialize the key; the value then shows up once the load
    /// completes (observe via a bound prop or by polling).
    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.inner.store.get(key) {
            return Some(value);
        }
        if self.register_on_demand(key) {
            return self.inner.store.get(key);
        }
        None
    }

    /// Ad-hoc typed read without binding a prop.
    pub fn get_with<T>(&self, key: &str, codec: &dyn Codec<T>) -> Result<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => codec
                .decode(&raw)
                .map(Some)
                .map_err(|e| Error::decode(key, e)),
        }
    }

    /// Fluent construction of a generic prop over `codec`, bound with
    /// [`CustomPropBuilder::bind`].
    pub fn prop<T: Clone + Send + Sync + 'static>(
        &self,
        key: impl Into<String>,
        codec: Arc<dyn Codec<T>>,
    ) -> CustomPropBuilder<'_, T> {
        CustomPropBuilder::new(self, key, codec)
    }

    /// Bind a typed property to its key. Fails with `BindingConflict` if the
    /// key is already bound. The current effective value is delivered
    /// synchronously before this returns; subsequent updates arrive serially
    /// on the scheduler.
    pub fn bind<T: Clone + Send + Sync + 'static>(&self, def: PropDef<T>) -> Result<Prop<T>> {
        let key = def.key.clone();

        let (tx, rx) = flume::unbounded();
        let current = {
            let mut bound = self.inner.bound.lock().unwrap();
            if bound.contains_key(&key) {
                return Err(Error::BindingConflict { key });
            }
            let (watch_id, current) = self.inner.store.watch(&key, tx);
            bound.insert(key.clone(), watch_id);
            current
        };

        let prop = Prop::new(def);

        // let lazy sources know the key is wanted
        if current.is_none() {
            self.register_on_demand(&key);
        }

        // initial synchronous delivery, then serial dispatch of queued
        // updates; the channel was registered under the key lock, so every
        // later change is either in `current` or in the queue, never lost
        prop.inner.apply_raw(current);
        let inner = prop.inner.clone();
        self.inner.scheduler.spawn(async move {
            while let Ok(raw) = rx.recv_async().await {
                inner.apply_raw(raw);
            }
        });

        Ok(prop)
    }

    /// Stop dispatching: shuts the scheduler down; pending notifications are
    /// drained best-effort, in-flight on-demand loads complete or fail.
    pub fn shutdown(&self) {
        self.inner.scheduler.shutdown();
    }

    fn register_on_demand(&self, key: &str) -> bool {
        let mut any = false;
        for layer in self.inner.chain.iter() {
            if let Some(on_demand) = layer.source().on_demand() {
                on_demand.register_key(key);
                any = true;
            }
        }
        any
    }
}
