//! A layered, typed, reactive configuration registry.
//!
//! Sources contribute flat `string -> string` snapshots; the registry
//! resolves the effective value per key across prioritized layers, pushes
//! changes to typed props, and keeps groups of correlated props atomic.
//!
//! ```no_run
//! use std::sync::Arc;
//! use props::registry::{PropDef, Registry, LayerOptions};
//! use props::sources::{MemorySource, StaticSource};
//! use props::Source;
//!
//! let defaults = StaticSource::new("defaults", "server.port=8080\nserver.host=localhost\n");
//! let overrides = Arc::new(MemorySource::new("overrides"));
//!
//! let registry = Registry::builder()
//!     .source_with(Arc::new(defaults), LayerOptions::default().priority(0))
//!     .source_with(overrides.clone(), LayerOptions::default().priority(10))
//!     .build()
//!     .unwrap();
//!
//! let port = registry.bind(PropDef::int("server.port").with_default(8080)).unwrap();
//! port.subscribe(|value| println!("port is now {:?}", value), |err| eprintln!("{err}"));
//!
//! overrides.set("server.port", "9090");
//! overrides.refresh();
//! ```

pub use docstore;
pub use registry;
pub use sources;
pub use utils;
pub use vault;

pub use registry::{
    Group, LayerOptions, Prop, PropDef, Registry, Scheduler, Snapshot, Source,
};
