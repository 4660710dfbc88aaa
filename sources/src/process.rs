use std::sync::RwLock;

use registry::{Downstream, Snapshot, Source};
use utils::process_props;

/// The process-wide property table (`utils::process_props`), mapped 1:1.
pub struct ProcessSource {
    downstream: RwLock<Option<Downstream>>,
}

impl Default for ProcessSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource {
    pub fn new() -> Self {
        ProcessSource {
            downstream: RwLock::new(None),
        }
    }
}

impl Source for ProcessSource {
    fn id(&self) -> &str {
        "process"
    }

    fn snapshot(&self) -> Snapshot {
        process_props::snapshot()
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
