use thiserror::Error as ThisError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced to callers of the registry. Inner subsystems log and
/// continue; only `Registry::bind`, typed `Registry::get` and `Prop::get`
/// return these.
#[derive(ThisError, Debug)]
pub enum Error {
    /// A source could not read its backing storage.
    #[error("source '{source_id}' failed to read backing storage")]
    SourceIo {
        source_id: String,
        #[source]
        source: utils::error::Error,
    },

    /// Decoding a raw value failed. The property's cached value is untouched.
    #[error("failed to decode value of property '{key}'")]
    Decode {
        key: String,
        #[source]
        source: utils::error::Error,
    },

    /// A required property has neither an effective value nor a default.
    #[error("required property '{key}' has no value and no default")]
    RequiredMissing { key: String },

    /// A property is already bound to this key in the same registry.
    #[error("a property is already bound to key '{key}'")]
    BindingConflict { key: String },

    /// A scheduled source's watcher terminated and is re-establishing.
    #[error("watcher of source '{source_id}' terminated")]
    WatcherFault {
        source_id: String,
        #[source]
        source: utils::error::Error,
    },
}

impl Error {
    pub fn source_io(source_id: impl Into<String>, err: impl Into<utils::error::Error>) -> Self {
        Error::SourceIo {
            source_id: source_id.into(),
            source: err.into(),
        }
    }

    pub fn decode(key: impl Into<String>, err: impl Into<utils::error::Error>) -> Self {
        Error::Decode {
            key: key.into(),
            source: err.into(),
        }
    }

    pub fn watcher_fault(source_id: impl Into<String>, err: impl Into<utils::error::Error>) -> Self {
        Error::WatcherFault {
            source_id: source_id.into(),
            source: err.into(),
        }
    }

    /// The key the error is about, when there is one.
    pub fn key(&self) -> Option<&str> {
        match self {
            Error::Decode { key, .. }
            | Error::RequiredMissing { key }
            | Error::BindingConflict { key } => Some(key),
            _ => None,
        }
    }
}
