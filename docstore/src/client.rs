use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use utils::error::Result;

/// Opaque change-stream position; hand the last one back to `watch` to
/// resume after a break.
pub type ResumeToken = String;

/// One change-stream event. Documents carry an `_id` (the property key) and
/// a `value` string.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Upsert {
        id: String,
        value: String,
        token: ResumeToken,
    },
    Delete {
        id: String,
        token: ResumeToken,
    },
    /// The backing collection was dropped or renamed; resuming is
    /// impossible and the watcher must start over from a full read.
    Invalidate,
}

/// Access to the backing document store.
#[async_trait]
pub trait DocumentClient: Send + Sync + 'static {
    fn id(&self) -> &str;

    /// Full read: `{_id -> value}` for every document.
    async fn load_all(&self) -> Result<HashMap<String, String>>;

    /// Open a change stream, resuming after `token` when given. The stream
    /// ending (or erroring into `None`) signals a watcher fault.
    async fn watch(&self, resume: Option<ResumeToken>)
        -> Result<BoxStream<'static, ChangeEvent>>;
}
