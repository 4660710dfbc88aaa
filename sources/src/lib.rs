mod embedded;
mod env;
mod file;
mod memory;
mod process;
pub mod propfile;

pub use embedded::StaticSource;
pub use env::EnvSource;
pub use file::FileSource;
pub use memory::MemorySource;
pub use process::ProcessSource;
