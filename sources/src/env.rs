use std::sync::RwLock;

use registry::{Downstream, Snapshot, Source};

/// OS environment variables, mapped 1:1. An optional prefix narrows the
/// snapshot to matching variables (names kept unchanged).
pub struct EnvSource {
    id: String,
    prefix: Option<String>,
    downstream: RwLock<Option<Downstream>>,
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvSource {
    pub fn new() -> Self {
        EnvSource {
            id: "env".to_string(),
            prefix: None,
            downstream: RwLock::new(None),
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        EnvSource {
            id: format!("env:{}", prefix),
            prefix: Some(prefix),
            downstream: RwLock::new(None),
        }
    }
}

impl Source for EnvSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn snapshot(&self) -> Snapshot {
        std::env::vars()
            .filter(|(k, _)| match &self.prefix {
                Some(prefix) => k.starts_with(prefix),
                None => true,
            })
            .collect()
    }

    fn register(&self, downstream: Downstream) {
        *self.downstream.write().unwrap() = Some(downstream);
    }

    fn refresh(&self) {
        let snapshot = self.snapshot();
        if let Some(downstream) = self.downstream.read().unwrap().as_ref() {
            downstream(snapshot);
        }
    }
}
