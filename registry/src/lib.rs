mod chain;
mod convert;
mod error;
mod group;
mod layer;
mod ondemand;
mod prop;
mod registry;
mod scheduler;
mod source;
mod store;

pub use chain::LayerChain;
pub use convert::{
    BoolCodec, Codec, DurationCodec, FloatCodec, IntCodec, LongCodec, LongListCodec, PathCodec,
    StringCodec, StringListCodec,
};
pub use error::{Error, Result};
pub use group::{Group, GroupMembers};
pub use layer::{Layer, LayerOptions};
pub use ondemand::{KeyLoader, OnDemand};
pub use prop::{CustomPropBuilder, Prop, PropDef, REDACTED};
pub use registry::{Registry, RegistryBuilder};
pub use scheduler::Scheduler;
pub use source::{Downstream, ErrorSink, OnDemandKeys, Snapshot, Source};
pub use store::{LayerRank, RegistryStore};
