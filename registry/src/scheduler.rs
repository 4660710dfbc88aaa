use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;
use utils::error::Result;

pub const DEFAULT_WORKER_THREADS: usize = 2;

/// Shared background worker pool. Wraps a tokio runtime: either one owned by
/// this scheduler (named worker threads, shut down with the registry) or the
/// ambient runtime of the calling context.
pub struct Scheduler {
    name: String,
    handle: Handle,
    owned: Mutex<Option<Runtime>>,
    down: AtomicBool,
}

impl Scheduler {
    /// Build a scheduler owning a multi-threaded runtime with named workers.
    pub fn new(name: &str, worker_threads: usize) -> Result<Scheduler> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name(format!("{}-worker", name))
            .enable_all()
            .build()
            .map_err(|e| format!("failed to build scheduler runtime: {}", e))?;
        let handle = runtime.handle().clone();
        Ok(Scheduler {
            name: name.to_string(),
            handle,
            owned: Mutex::new(Some(runtime)),
            down: AtomicBool::new(false),
        })
    }

    /// Reuse the runtime of the current async context, if there is one.
    pub fn current() -> Option<Scheduler> {
        Handle::try_current().ok().map(|handle| Scheduler {
            name: "ambient".to_string(),
            handle,
            owned: Mutex::new(None),
            down: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Submit a task. Tasks submitted after shutdown are dropped.
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        if self.down.load(Ordering::SeqCst) {
            debug!("scheduler '{}' is shut down, dropping task", self.name);
            return;
        }
        self.handle.spawn(fut);
    }

    pub fn is_shutdown(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }

    /// Stop accepting tasks. An owned runtime is torn down in the background;
    /// a borrowed ambient runtime is left untouched.
    pub fn shutdown(&self) {
        self.down.store(true, Ordering::SeqCst);
        if let Some(runtime) = self.owned.lock().unwrap().take() {
            debug!("shutting down scheduler '{}'", self.name);
            runtime.shutdown_background();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // shutdown_background never blocks, so dropping inside an async
        // context is safe.
        if let Some(runtime) = self.owned.lock().unwrap().take() {
            runtime.shutdown_background();
        }
    }
}
