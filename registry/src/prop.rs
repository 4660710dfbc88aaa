use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::warn;

use crate::convert::{
    BoolCodec, Codec, DurationCodec, FloatCodec, IntCodec, LongCodec, LongListCodec, PathCodec,
    StringCodec, StringListCodec,
};
use crate::error::{Error, Result};
use crate::registry::Registry;

/// Marker substituted for secret values in rendered output.
pub const REDACTED: &str = "<redacted>";

type ValueHandler<T> = Arc<dyn Fn(Option<&T>) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// Declarative description of a typed property. Turned into a live [`Prop`]
/// by `Registry::bind`.
pub struct PropDef<T> {
    pub(crate) key: String,
    pub(crate) codec: Arc<dyn Codec<T>>,
    pub(crate) default: Option<T>,
    pub(crate) description: Option<String>,
    pub(crate) required: bool,
    pub(crate) secret: bool,
}

impl<T> PropDef<T> {
    pub fn new(key: impl Into<String>, codec: Arc<dyn Codec<T>>) -> Self {
        PropDef {
            key: key.into(),
            codec,
            default: None,
            description: None,
            required: false,
            secret: false,
        }
    }

    pub fn with_default(mut self, value: T) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }
}

impl PropDef<String> {
    pub fn string(key: impl Into<String>) -> Self {
        PropDef::new(key, Arc::new(StringCodec))
    }
}

impl PropDef<bool> {
    pub fn boolean(key: impl Into<String>) -> Self {
        PropDef::new(key, Arc::new(BoolCodec))
    }
}

impl PropDef<i32> {
    pub fn int(key: impl Into<String>) -> Self {
        PropDef::new(key, Arc::new(IntCodec))
    }
}

impl PropDef<i64> {
    pub fn long(key: impl Into<String>) -> Self {
        PropDef::new(key, Arc::new(LongCodec))
    }
}

impl PropDef<f64> {
    pub fn float(key: impl Into<String>) -> Self {
        PropDef::new(key, Arc::new(FloatCodec))
    }
}

impl PropDef<Duration> {
    pub fn duration(key: impl Into<String>) -> Self {
        PropDef::new(key, Arc::new(DurationCodec))
    }
}

impl PropDef<PathBuf> {
    pub fn path(key: impl Into<String>) -> Self {
        PropDef::new(key, Arc::new(PathCodec))
    }
}

impl PropDef<Vec<String>> {
    pub fn list_of_strings(key: impl Into<String>) -> Self {
        PropDef::new(key, Arc::new(StringListCodec))
    }
}

impl PropDef<Vec<i64>> {
    pub fn list_of_longs(key: impl Into<String>) -> Self {
        PropDef::new(key, Arc::new(LongListCodec))
    }
}

/// Fluent construction of a generic prop against a registry, finished off by
/// [`CustomPropBuilder::bind`].
pub struct CustomPropBuilder<'a, T> {
    registry: &'a Registry,
    def: PropDef<T>,
}

impl<'a, T: Clone + Send + Sync + 'static> CustomPropBuilder<'a, T> {
    pub(crate) fn new(
        registry: &'a Registry,
        key: impl Into<String>,
        codec: Arc<dyn Codec<T>>,
    ) -> Self {
        CustomPropBuilder {
            registry,
            def: PropDef::new(key, codec),
        }
    }

    pub fn default_value(mut self, value: T) -> Self {
        self.def = self.def.with_default(value);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.def = self.def.with_description(description);
        self
    }

    pub fn required(mut self) -> Self {
        self.def = self.def.required();
        self
    }

    pub fn secret(mut self) -> Self {
        self.def = self.def.secret();
        self
    }

    pub fn bind(self) -> Result<Prop<T>> {
        self.registry.bind(self.def)
    }
}

pub(crate) struct PropInner<T> {
    pub(crate) key: String,
    codec: Arc<dyn Codec<T>>,
    default: Option<T>,
    description: Option<String>,
    required: bool,
    secret: bool,
    value: RwLock<Option<T>>,
    subscribers: RwLock<Vec<ValueHandler<T>>>,
    error_handlers: RwLock<Vec<ErrorHandler>>,
}

/// A typed, reactive view of one key. Cheap to clone; all clones share the
/// same cached value and subscriber list.
pub struct Prop<T> {
    pub(crate) inner: Arc<PropInner<T>>,
}

impl<T> Clone for Prop<T> {
    fn clone(&self) -> Self {
        Prop {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Prop<T> {
    pub(crate) fn new(def: PropDef<T>) -> Self {
        Prop {
            inner: Arc::new(PropInner {
                key: def.key,
                codec: def.codec,
                default: def.default,
                description: def.description,
                required: def.required,
                secret: def.secret,
                value: RwLock::new(None),
                subscribers: RwLock::new(Vec::new()),
                error_handlers: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn description(&self) -> Option<&str> {
        self.inner.description.as_deref()
    }

    pub fn is_required(&self) -> bool {
        self.inner.required
    }

    pub fn is_secret(&self) -> bool {
        self.inner.secret
    }

    /// The cached decoded value. Non-blocking; never touches the sources.
    /// Errors only when the prop is required and neither an effective value
    /// nor a default exists.
    pub fn get(&self) -> Result<Option<T>> {
        let value = self.inner.value.read().unwrap().clone();
        if value.is_none() && self.inner.required {
            return Err(Error::RequiredMissing {
                key: self.inner.key.clone(),
            });
        }
        Ok(value)
    }

    pub(crate) fn cached(&self) -> Option<T> {
        self.inner.value.read().unwrap().clone()
    }

    /// Register callbacks. The current value is delivered synchronously to
    /// `on_value` before this returns.
    pub fn subscribe(
        &self,
        on_value: impl Fn(Option<&T>) + Send + Sync + 'static,
        on_error: impl Fn(&Error) + Send + Sync + 'static,
    ) {
        let handler: ValueHandler<T> = Arc::new(on_value);
        self.inner.subscribers.write().unwrap().push(handler.clone());
        self.inner
            .error_handlers
            .write()
            .unwrap()
            .push(Arc::new(on_error));

        let current = self.inner.value.read().unwrap().clone();
        handler(current.as_ref());
    }

    pub fn encode(&self, value: &T) -> Option<String> {
        self.inner.codec.encode(value)
    }

    /// Decode a raw value the way notifications do: `None` falls back to the
    /// default.
    pub fn decode(&self, raw: Option<&str>) -> Result<Option<T>> {
        match raw {
            None => Ok(self.inner.default.clone()),
            Some(s) => self
                .inner
                .codec
                .decode(s)
                .map(Some)
                .map_err(|e| Error::decode(&self.inner.key, e)),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> PropInner<T> {
    /// Apply one store notification: decode, update the cache, fan out. A
    /// decode failure goes to the error handlers and leaves the cache
    /// untouched.
    pub(crate) fn apply_raw(&self, raw: Option<String>) {
        let decoded = match raw {
            None => Ok(self.default.clone()),
            Some(s) => self
                .codec
                .decode(&s)
                .map(Some)
                .map_err(|e| Error::decode(&self.key, e)),
        };

        match decoded {
            Ok(value) => {
                *self.value.write().unwrap() = value.clone();
                let subscribers = self.subscribers.read().unwrap().clone();
                for subscriber in &subscribers {
                    subscriber(value.as_ref());
                }
            }
            Err(err) => {
                // only the key goes to the log; the raw value may be secret
                warn!("property '{}' received an undecodable value", self.key);
                let handlers = self.error_handlers.read().unwrap().clone();
                for handler in &handlers {
                    handler(&err);
                }
            }
        }
    }
}

impl<T: Clone + Send + Sync + 'static> fmt::Display for Prop<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = if self.inner.secret {
            REDACTED.to_string()
        } else {
            match self.inner.value.read().unwrap().as_ref() {
                Some(v) => self.inner.codec.encode(v).unwrap_or_default(),
                None => "null".to_string(),
            }
        };
        write!(f, "Prop{{key={}, value={}}}", self.inner.key, rendered)
    }
}

impl<T: Clone + Send + Sync + 'static> fmt::Debug for Prop<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = if self.inner.secret {
            REDACTED.to_string()
        } else {
            match self.inner.value.read().unwrap().as_ref() {
                Some(v) => self.inner.codec.encode(v).unwrap_or_default(),
                None => "null".to_string(),
            }
        };
        f.debug_struct("Prop")
            .field("key", &self.inner.key)
            .field("value", &rendered)
            .field("required", &self.inner.required)
            .field("secret", &self.inner.secret)
            .finish()
    }
}
