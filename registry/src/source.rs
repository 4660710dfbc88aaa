use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Error;

/// A complete view of everything a source currently defines.
pub type Snapshot = HashMap<String, String>;

/// Callback a layer registers with its source. Invoked with a complete
/// snapshot whenever the source (re)publishes.
pub type Downstream = Arc<dyn Fn(Snapshot) + Send + Sync>;

/// Callback for source-level faults (I/O failures, watcher termination).
/// Sources report through this instead of panicking out of the contract.
pub type ErrorSink = Arc<dyn Fn(Error) + Send + Sync>;

/// A producer of flat `string -> string` snapshots.
///
/// A source never partially applies: every downstream invocation carries a
/// complete snapshot. On internal failure `snapshot` logs and returns an
/// empty map.
pub trait Source: Send + Sync + 'static {
    /// Stable identifier, used as the layer name when no alias is given.
    fn id(&self) -> &str;

    /// Blocking read of all currently-defined keys.
    fn snapshot(&self) -> Snapshot;

    /// Attach the downstream callback. A second call replaces the previous
    /// registration.
    fn register(&self, downstream: Downstream);

    /// Ask the source to (re)invoke its downstream with the latest snapshot,
    /// either synchronously or via the scheduler.
    fn refresh(&self);

    /// Whether the source owns its own watcher and publishes spontaneously.
    fn scheduled(&self) -> bool {
        false
    }

    /// Attach a sink for source-level faults. Optional; the default keeps
    /// faults inside the source (logged only).
    fn register_errors(&self, _sink: ErrorSink) {}

    /// Lazily-loading sources expose per-key registration here; the registry
    /// calls it when an unknown key is requested.
    fn on_demand(&self) -> Option<&dyn OnDemandKeys> {
        None
    }
}

/// Per-key registration surface of lazily-loading sources.
pub trait OnDemandKeys {
    /// Request that `key` be materialized. Returns immediately; the value
    /// shows up through the regular downstream publish once loaded.
    fn register_key(&self, key: &str);
}
