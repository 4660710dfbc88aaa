mod client;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod reload;
mod watch;

pub use client::{ChangeEvent, DocumentClient, ResumeToken};
pub use reload::ReloadSource;
pub use watch::WatchSource;
