use std::collections::HashMap;
use std::sync::RwLock;

use registry::{Downstream, Snapshot, Source};

/// Mutable in-memory source. Mutations stay local until `refresh` pushes the
/// current snapshot downstream.
pub struct MemorySource {
    id: String,
    map: RwLock<HashMap<String, String>>,
    downstream: RwLock<Option<Downstream>>,
}

impl MemorySource {
    pub fn new(id: impl Into<String>) -> Self {
        MemorySource {
            id: id.into(),
            map: RwLock::new(HashMap::new()),
            downstream: RwLock::new(None),
        }
    }

    pub fn with_values<K, V>(id: impl Into<String>, values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let source = MemorySource::new(id);
        source.set_all(values);
        source
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.map.write().unwrap().insert(key.into(), value.into());
    }

    pub fn set_all<K, V>(&self, values: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = self.map.write().unwrap();
        for (k, v) in values {
            map.insert(k.into(), v.into());
        }
    }

    pub fn remove(&self, key: &str) {
        self.map.write().unwrap().remove(key);
    }

    pub fn clear(&self) {
        self.map.write().unwrap().clear();
    }
}

impl Source for MemorySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn snapshot(&self) -> Snapshot {
        self.map.read().unwrap().clone()
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_refresh_pushes_snapshot() {
        let source = MemorySource::with_values("mem", [("a", "1")]);
        let seen: Arc<Mutex<Vec<Snapshot>>> = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        source.register(Arc::new(move |snapshot| {
            s.lock().unwrap().push(snapshot);
        }));

        source.refresh();
        source.set("b", "2");
        source.remove("a");
        source.refresh();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].get("a").map(String::as_str), Some("1"));
        assert!(!seen[1].contains_key("a"));
        assert_eq!(seen[1].get("b").map(String::as_str), Some("2"));
    }
}
