use std::collections::HashMap;
use std::sync::RwLock;

use tracing::error;

use registry::{Downstream, Snapshot, Source};

use crate::propfile;

/// Property text embedded in the binary (typically via `include_str!`),
/// parsed once at construction. The rendition of bundled default
/// configuration shipped with the application.
pub struct StaticSource {
    id: String,
    map: HashMap<String, String>,
    downstream: RwLock<Option<Downstream>>,
}

impl StaticSource {
    pub fn new(id: impl Into<String>, text: &str) -> Self {
        let id = id.into();
        let map = match propfile::parse(text) {
            Ok(map) => map,
            Err(err) => {
                error!("static source '{}' has unparseable content: {}", id, err);
                HashMap::new()
            }
        };
        StaticSource {
            id,
            map,
            downstream: RwLock::new(None),
        }
    }
}

impl Source for StaticSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn snapshot(&self) -> Snapshot {
        self.map.clone()
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
