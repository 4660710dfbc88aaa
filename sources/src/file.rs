use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use tracing::{debug, error};

use registry::{Downstream, Error, ErrorSink, Scheduler, Snapshot, Source};

use crate::propfile;

struct Inner {
    id: String,
    path: PathBuf,
    downstream: RwLock<Option<Downstream>>,
    errors: RwLock<Option<ErrorSink>>,
    poll: Option<PollConfig>,
    polling: AtomicBool,
}

struct PollConfig {
    interval: Duration,
    scheduler: Arc<Scheduler>,
}

/// A local properties file. Reads on every `refresh`; an unreadable or
/// unparseable file logs, reports the fault, and yields an empty snapshot so
/// previously published keys get withdrawn by the layer diff.
///
/// With a poll interval the source becomes scheduled: it republishes from a
/// scheduler task until the source is dropped.
pub struct FileSource {
    inner: Arc<Inner>,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        FileSource {
            inner: Arc::new(Inner {
                id: format!("file:{}", path.display()),
                path,
                downstream: RwLock::new(None),
                errors: RwLock::new(None),
                poll: None,
                polling: AtomicBool::new(false),
            }),
        }
    }

    /// Re-read and republish every `interval` on `scheduler`.
    pub fn with_poll_interval(
        path: impl AsRef<Path>,
        interval: Duration,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        let path = path.as_ref().to_path_buf();
        FileSource {
            inner: Arc::new(Inner {
                id: format!("file:{}", path.display()),
                path,
                downstream: RwLock::new(None),
                errors: RwLock::new(None),
                poll: Some(PollConfig {
                    interval,
                    scheduler,
                }),
                polling: AtomicBool::new(false),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }
}

impl Inner {
    fn read(&self) -> Snapshot {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) => {
                error!("source '{}' failed to read file: {}", self.id, err);
                self.report(Error::source_io(&self.id, err.to_string()));
                return Snapshot::new();
            }
        };
        match propfile::parse(&text) {
            Ok(map) => map,
            Err(err) => {
                error!("source '{}' failed to parse file: {}", self.id, err);
                self.report(Error::source_io(&self.id, err));
                Snapshot::new()
            }
        }
    }

    fn publish(&self) {
        let snapshot = self.read();
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

impl Source for FileSource {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn snapshot(&self) -> Snapshot {
        self.inner.read()
    }

    fn register(&self, downstream: Downstream) {
        *self.inner.downstream.write().unwrap() = Some(downstream);

        let Some(poll) = &self.inner.poll else {
            return;
        };
        if self.inner.polling.swap(true, Ordering::SeqCst) {
            return;
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let interval = poll.interval;
        poll.scheduler.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match weak.upgrade() {
                    Some(inner) => inner.publish(),
                    None => {
                        debug!("file source dropped, stopping poll task");
                        break;
                    }
                }
            }
        });
    }

    fn register_errors(&self, sink: ErrorSink) {
        *self.inner.errors.write().unwrap() = Some(sink);
    }

    fn refresh(&self) {
        self.inner.publish();
    }

    fn scheduled(&self) -> bool {
        self.inner.poll.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("props-file-test-{}-{}", std::process::id(), name));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_reads_properties_file() {
        let path = temp_file("read", "a=1\nb = two words\n");
        let source = FileSource::new(&path);
        let snapshot = source.snapshot();
        assert_eq!(snapshot.get("a").map(String::as_str), Some("1"));
        assert_eq!(snapshot.get("b").map(String::as_str), Some("two words"));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_missing_file_yields_empty_snapshot() {
        let source = FileSource::new("/definitely/not/here.properties");
        assert!(source.snapshot().is_empty());
    }

    #[test]
    fn test_poll_republishes() {
        let path = temp_file("poll", "k=1\n");
        let scheduler = Arc::new(Scheduler::new("file-test", 1).unwrap());
        let source = FileSource::with_poll_interval(&path, Duration::from_millis(50), scheduler);
        assert!(source.scheduled());

        let seen = Arc::new(RwLock::new(Vec::<Snapshot>::new()));
        let s = seen.clone();
        source.register(Arc::new(move |snapshot| {
            s.write().unwrap().push(snapshot);
        }));

        std::fs::write(&path, "k=2\n").unwrap();
        for _ in 0..100 {
            if seen
                .read()
                .unwrap()
                .iter()
                .any(|s| s.get("k").map(String::as_str) == Some("2"))
            {
                std::fs::remove_file(&path).unwrap();
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        panic!("poll task never published the updated file");
    }
}
