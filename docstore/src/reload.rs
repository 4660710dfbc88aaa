use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use registry::{Downstream, Error, ErrorSink, Scheduler, Snapshot, Source};
use tracing::warn;

use crate::client::DocumentClient;

struct Inner<C> {
    client: Arc<C>,
    scheduler: Arc<Scheduler>,
    view: RwLock<HashMap<String, String>>,
    downstream: RwLock<Option<Downstream>>,
    errors: RwLock<Option<ErrorSink>>,
}

/// Document-store source in reload-on-demand mode: the store is read in full
/// on every `refresh` and published once the read completes. No watcher, no
/// spontaneous publishes.
pub struct ReloadSource<C: DocumentClient> {
    inner: Arc<Inner<C>>,
}

impl<C: DocumentClient> ReloadSource<C> {
    pub fn new(client: C, scheduler: Arc<Scheduler>) -> Self {
        ReloadSource {
            inner: Arc::new(Inner {
                client: Arc::new(client),
                scheduler,
                view: RwLock::new(HashMap::new()),
                downstream: RwLock::new(None),
                errors: RwLock::new(None),
            }),
        }
    }
}

impl<C: DocumentClient> Source for ReloadSource<C> {
    fn id(&self) -> &str {
        self.inner.client.id()
    }

    fn snapshot(&self) -> Snapshot {
        self.inner.view.read().unwrap().clone()
    }

    fn register(&self, downstream: Downstream) {
        *self.inner.downstream.write().unwrap() = Some(downstream);
    }

    fn register_errors(&self, sink: ErrorSink) {
        *self.inner.errors.write().unwrap() = Some(sink);
    }

    fn refresh(&self) {
        let inner = self.inner.clone();
        self.inner.scheduler.spawn(async move {
            match inner.client.load_all().await {
                Ok(all) => {
                    *inner.view.write().unwrap() = all.clone();
                    if let Some(downstream) = inner.downstream.read().unwrap().as_ref() {
                        downstream(all);
                    }
                }
                Err(err) => {
                    warn!("source '{}' reload failed: {}", inner.client.id(), err);
                    if let Some(sink) = inner.errors.read().unwrap().as_ref() {
                        sink(Error::source_io(inner.client.id(), err));
                    }
                }
            }
        });
    }
}
