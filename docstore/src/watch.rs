use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use tracing::{debug, warn};

use registry::{Downstream, Error, ErrorSink, Scheduler, Snapshot, Source};

use crate::client::{ChangeEvent, DocumentClient, ResumeToken};

/// Publish once this many events accumulated without the stream going idle,
/// so a busy stream cannot defer publication forever.
const COALESCE_THRESHOLD: usize = 64;

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

struct Inner<C> {
    client: Arc<C>,
    scheduler: Arc<Scheduler>,
    view: RwLock<HashMap<String, String>>,
    downstream: RwLock<Option<Downstream>>,
    errors: RwLock<Option<ErrorSink>>,
    started: AtomicBool,
}

impl<C: DocumentClient> Inner<C> {
    fn publish(&self) {
        let snapshot = self.view.read().unwrap().clone();
        if let Some(downstream) = self.downstream.read().unwrap().as_ref() {
            downstream(snapshot);
        }
    }

    fn fault(&self, err: utils::error::Error) {
        warn!("watcher of source '{}' faulted: {}", self.client.id(), err);
        if let Some(sink) = self.errors.read().unwrap().as_ref() {
            sink(Error::watcher_fault(self.client.id(), err));
        }
    }

    /// Apply one non-invalidating event to the view.
    fn apply(&self, event: ChangeEvent, resume: &mut Option<ResumeToken>) {
        match event {
            ChangeEvent::Upsert { id, value, token } => {
                self.view.write().unwrap().insert(id, value);
                *resume = Some(token);
            }
            ChangeEvent::Delete { id, token } => {
                self.view.write().unwrap().remove(&id);
                *resume = Some(token);
            }
            ChangeEvent::Invalidate => {}
        }
    }
}

/// Document-store source in watch mode: a long-running watcher holds a
/// change stream, keeps an internal map current and publishes coalesced
/// snapshots. The watcher survives stream breaks (resuming from the last
/// token) and collection drops (starting over from a full read); previously
/// published values stay visible while re-establishing.
pub struct WatchSource<C: DocumentClient> {
    inner: Arc<Inner<C>>,
}

impl<C: DocumentClient> WatchSource<C> {
    pub fn new(client: C, scheduler: Arc<Scheduler>) -> Self {
        WatchSource {
            inner: Arc::new(Inner {
                client: Arc::new(client),
                scheduler,
                view: RwLock::new(HashMap::new()),
                downstream: RwLock::new(None),
                errors: RwLock::new(None),
                started: AtomicBool::new(false),
            }),
        }
    }
}

impl<C: DocumentClient> Source for WatchSource<C> {
    fn id(&self) -> &str {
        self.inner.client.id()
    }

    fn snapshot(&self) -> Snapshot {
        self.inner.view.read().unwrap().clone()
    }

    fn register(&self, downstream: Downstream) {
        *self.inner.downstream.write().unwrap() = Some(downstream);
        if !self.inner.started.swap(true, Ordering::SeqCst) {
            let weak = Arc::downgrade(&self.inner);
            self.inner.scheduler.spawn(run(weak));
        }
    }

    fn register_errors(&self, sink: ErrorSink) {
        *self.inner.errors.write().unwrap() = Some(sink);
    }

    /// Republish the current view; the watcher keeps it fresh on its own.
    fn refresh(&self) {
        self.inner.publish();
    }

    fn scheduled(&self) -> bool {
        true
    }
}

async fn run<C: DocumentClient>(inner: Weak<Inner<C>>) {
    let mut resume: Option<ResumeToken> = None;
    let mut need_full_read = true;

    loop {
        let Some(strong) = inner.upgrade() else { return };

        // open the stream before the full read, so no change falls into the
        // gap between the two
        let mut stream = match strong.client.watch(resume.clone()).await {
            Ok(stream) => stream,
            Err(err) => {
                strong.fault(err);
                resume = None;
                need_full_read = true;
                drop(strong);
                tokio::time::sleep(RETRY_BACKOFF).await;
                continue;
            }
        };

        if need_full_read {
            match strong.client.load_all().await {
                Ok(all) => {
                    *strong.view.write().unwrap() = all;
                    strong.publish();
                    need_full_read = false;
                }
                Err(err) => {
                    strong.fault(err);
                    drop(strong);
                    tokio::time::sleep(RETRY_BACKOFF).await;
                    continue;
                }
            }
        }
        debug!("source '{}' watching change stream", strong.client.id());
        drop(strong);

        'consume: loop {
            let Some(event) = stream.next().await else {
                if let Some(strong) = inner.upgrade() {
                    strong.fault("change stream ended".into());
                }
                break 'consume;
            };
            let Some(strong) = inner.upgrade() else { return };

            let mut invalidated = matches!(event, ChangeEvent::Invalidate);
            let mut pending = 0usize;
            if !invalidated {
                strong.apply(event, &mut resume);
                pending = 1;
            }

            // drain whatever is immediately ready, bounded by the threshold;
            // either an idle queue or a full batch triggers the publish
            let mut ended = false;
            while !invalidated && !ended && pending < COALESCE_THRESHOLD {
                match stream.next().now_or_never() {
                    Some(Some(ChangeEvent::Invalidate)) => invalidated = true,
                    Some(Some(event)) => {
                        strong.apply(event, &mut resume);
                        pending += 1;
                    }
                    Some(None) => ended = true,
                    None => break,
                }
            }

            if pending > 0 {
                strong.publish();
            }

            if invalidated {
                strong.fault("change stream invalidated".into());
                resume = None;
                need_full_read = true;
                break 'consume;
            }
            if ended {
                strong.fault("change stream ended".into());
                break 'consume;
            }
        }

        // reconnect; previously published values stay visible meanwhile
        tokio::time::sleep(RETRY_BACKOFF).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MemoryDocumentStore;
    use registry::Registry;

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("condition not reached within timeout");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_initial_snapshot_then_stream_updates() {
        let store = MemoryDocumentStore::new("docs");
        store.insert("k", "v1");

        let scheduler = Arc::new(Scheduler::current().unwrap());
        let source = WatchSource::new(store.clone(), scheduler.clone());
        let registry = Registry::builder()
            .source(Arc::new(source))
            .scheduler(scheduler)
            .build()
            .unwrap();

        let r = registry.clone();
        wait_for(move || r.get("k").as_deref() == Some("v1")).await;

        store.insert("other", "x");
        store.delete("k");
        let r = registry.clone();
        wait_for(move || r.get("k").is_none() && r.get("other").as_deref() == Some("x")).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reinitializes_after_collection_drop() {
        let store = MemoryDocumentStore::new("docs");
        store.insert("k", "v1");

        let scheduler = Arc::new(Scheduler::current().unwrap());
        let source = WatchSource::new(store.clone(), scheduler.clone());
        let registry = Registry::builder()
            .source(Arc::new(source))
            .scheduler(scheduler)
            .build()
            .unwrap();

        let r = registry.clone();
        wait_for(move || r.get("k").as_deref() == Some("v1")).await;

        store.drop_collection();
        store.insert("k", "v2");

        let r = registry.clone();
        wait_for(move || r.get("k").as_deref() == Some("v2")).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_survives_stream_break() {
        let store = MemoryDocumentStore::new("docs");
        store.insert("k", "v1");

        let scheduler = Arc::new(Scheduler::current().unwrap());
        let source = WatchSource::new(store.clone(), scheduler.clone());
        let registry = Registry::builder()
            .source(Arc::new(source))
            .scheduler(scheduler)
            .build()
            .unwrap();

        let r = registry.clone();
        wait_for(move || r.get("k").as_deref() == Some("v1")).await;

        store.break_streams();
        // previously published values stay visible while re-establishing
        assert_eq!(registry.get("k").as_deref(), Some("v1"));

        store.insert("k2", "v2");
        let r = registry.clone();
        wait_for(move || r.get("k2").as_deref() == Some("v2")).await;
        assert_eq!(registry.get("k").as_deref(), Some("v1"));
    }
}
