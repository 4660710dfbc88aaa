use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Error;
use crate::scheduler::Scheduler;
use crate::source::{Downstream, ErrorSink, OnDemandKeys, Snapshot, Source};

/// Per-key fetcher behind an [`OnDemand`] source.
#[async_trait]
pub trait KeyLoader: Send + Sync + 'static {
    /// Stable source identifier.
    fn id(&self) -> &str;

    /// Fetch one key. `Ok(None)` records the key as known-absent. Blocking
    /// I/O is fine; loads run on the scheduler, never on the requester.
    async fn load_key(&self, key: &str) -> utils::error::Result<Option<String>>;
}

struct State {
    /// `None` entries are keys known to be absent.
    loaded: RwLock<HashMap<String, Option<String>>>,
    inflight: Mutex<HashSet<String>>,
    downstream: RwLock<Option<Downstream>>,
    errors: RwLock<Option<ErrorSink>>,
}

impl State {
    fn mark_inflight(&self, key: &str) -> bool {
        self.inflight.lock().unwrap().insert(key.to_string())
    }

    fn clear_inflight(&self, key: &str) {
        self.inflight.lock().unwrap().remove(key);
    }

    fn snapshot(&self) -> Snapshot {
        self.loaded
            .read()
            .unwrap()
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())))
            .collect()
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        if let Some(downstream) = self.downstream.read().unwrap().as_ref() {
            downstream(snapshot);
        }
    }

    fn report(&self, err: Error) {
        if let Some(sink) = self.errors.read().unwrap().as_ref() {
            sink(err);
        }
    }
}

/// Source base for backends where fetching everything up front is expensive:
/// keys materialize on first request, concurrent requests for the same key
/// collapse into a single load, and results publish downstream
/// asynchronously on the scheduler.
pub struct OnDemand<L: KeyLoader> {
    loader: Arc<L>,
    scheduler: Arc<Scheduler>,
    state: Arc<State>,
}

impl<L: KeyLoader> OnDemand<L> {
    pub fn new(loader: L, scheduler: Arc<Scheduler>) -> Self {
        OnDemand {
            loader: Arc::new(loader),
            scheduler,
            state: Arc::new(State {
                loaded: RwLock::new(HashMap::new()),
                inflight: Mutex::new(HashSet::new()),
                downstream: RwLock::new(None),
                errors: RwLock::new(None),
            }),
        }
    }

    /// Keys currently materialized, absent ones included.
    pub fn known_keys(&self) -> Vec<String> {
        self.state.loaded.read().unwrap().keys().cloned().collect()
    }
}

impl<L: KeyLoader> OnDemandKeys for OnDemand<L> {
    fn register_key(&self, key: &str) {
        if self.state.loaded.read().unwrap().contains_key(key) {
            return;
        }
        if !self.state.mark_inflight(key) {
            // a load for this key is already in flight
            return;
        }

        debug!("on-demand source '{}' loading key '{}'", self.loader.id(), key);
        let loader = self.loader.clone();
        let state = self.state.clone();
        let key = key.to_string();
        self.scheduler.spawn(async move {
            match loader.load_key(&key).await {
                Ok(value) => {
                    state.loaded.write().unwrap().insert(key.clone(), value);
                    state.clear_inflight(&key);
                    state.publish();
                }
                Err(err) => {
                    state.clear_inflight(&key);
                    warn!("on-demand load of key '{}' failed", key);
                    state.report(Error::source_io(loader.id(), err));
                }
            }
        });
    }
}

impl<L: KeyLoader> Source for OnDemand<L> {
    fn id(&self) -> &str {
        self.loader.id()
    }

    fn snapshot(&self) -> Snapshot {
        self.state.snapshot()
    }

    fn register(&self, downstream: Downstream) {
        *self.state.downstream.write().unwrap() = Some(downstream);
    }

    fn register_errors(&self, sink: ErrorSink) {
        *self.state.errors.write().unwrap() = Some(sink);
    }

    /// Reload every key seen so far, then publish the merged result once.
    fn refresh(&self) {
        let keys: Vec<String> = self.state.loaded.read().unwrap().keys().cloned().collect();
        let loader = self.loader.clone();
        let state = self.state.clone();
        self.scheduler.spawn(async move {
            for key in keys {
                if !state.mark_inflight(&key) {
                    continue;
                }
                match loader.load_key(&key).await {
                    Ok(value) => {
                        state.loaded.write().unwrap().insert(key.clone(), value);
                    }
                    Err(err) => {
                        warn!("on-demand refresh of key '{}' failed", key);
                        state.report(Error::source_io(loader.id(), err));
                    }
                }
                state.clear_inflight(&key);
            }
            state.publish();
        });
    }

    fn on_demand(&self) -> Option<&dyn OnDemandKeys> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingLoader {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KeyLoader for CountingLoader {
        fn id(&self) -> &str {
            "counting"
        }

        async fn load_key(&self, key: &str) -> utils::error::Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(200)).await;
            match key {
                "missing" => Ok(None),
                _ => Ok(Some(format!("{}-value", key))),
            }
        }
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("condition not reached within timeout");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_single_flight() {
        let scheduler = Arc::new(Scheduler::current().unwrap());
        let source = Arc::new(OnDemand::new(
            CountingLoader {
                calls: AtomicUsize::new(0),
            },
            scheduler,
        ));

        let mut handles = Vec::new();
        for _ in 0..100 {
            let s = source.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                s.register_key("secret1");
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let s = source.clone();
        wait_for(move || s.snapshot().contains_key("secret1")).await;
        assert_eq!(source.loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            source.snapshot().get("secret1").map(String::as_str),
            Some("secret1-value")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_absent_key_is_remembered() {
        let scheduler = Arc::new(Scheduler::current().unwrap());
        let source = Arc::new(OnDemand::new(
            CountingLoader {
                calls: AtomicUsize::new(0),
            },
            scheduler,
        ));

        source.register_key("missing");
        let s = source.clone();
        wait_for(move || s.known_keys().contains(&"missing".to_string())).await;

        // a second request must not trigger another load
        source.register_key("missing");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.loader.calls.load(Ordering::SeqCst), 1);
        assert!(!source.snapshot().contains_key("missing"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_refresh_reloads_known_keys_and_publishes_once() {
        let scheduler = Arc::new(Scheduler::current().unwrap());
        let source = Arc::new(OnDemand::new(
            CountingLoader {
                calls: AtomicUsize::new(0),
            },
            scheduler,
        ));

        let publishes = Arc::new(AtomicUsize::new(0));
        let p = publishes.clone();
        source.register(Arc::new(move |_| {
            p.fetch_add(1, Ordering::SeqCst);
        }));

        source.register_key("a");
        source.register_key("b");
        let s = source.clone();
        wait_for(move || s.known_keys().len() == 2).await;
        let after_loads = publishes.load(Ordering::SeqCst);
        assert_eq!(after_loads, 2);

        source.refresh();
        let p = publishes.clone();
        wait_for(move || p.load(Ordering::SeqCst) == after_loads + 1).await;
        assert_eq!(source.loader.calls.load(Ordering::SeqCst), 4);
    }
}
