//! Process-wide string properties, settable by the host application and
//! readable from anywhere in the process. The configuration registry exposes
//! them through a dedicated source.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

static PROPS: OnceLock<RwLock<HashMap<String, String>>> = OnceLock::new();

fn table() -> &'static RwLock<HashMap<String, String>> {
    PROPS.get_or_init(|| RwLock::new(HashMap::new()))
}

pub fn set(key: impl Into<String>, value: impl Into<String>) {
    table().write().unwrap().insert(key.into(), value.into());
}

pub fn get(key: &str) -> Option<String> {
    table().read().unwrap().get(key).cloned()
}

pub fn remove(key: &str) -> Option<String> {
    table().write().unwrap().remove(key)
}

/// A copy of the whole table.
pub fn snapshot() -> HashMap<String, String> {
    table().read().unwrap().clone()
}
