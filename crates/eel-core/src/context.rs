//! Request-scoped state shared between the dispatcher and its collaborators.
//!
//! A [`Context`] carries three independent string-keyed bags:
//!
//! - **Values**: request data such as tenant, partner, headers and query.
//! - **LogValues**: fields injected into every line logged through the
//!   context.
//! - **ConfigValues**: long-lived handles (settings, transport, observer,
//!   duplicate checker) stored as type-erased `Arc`s.
//!
//! All three bags and the correlation id sit behind one reader-writer lock.
//! [`Context::sub_context`] is the only way to derive a child: the child
//! receives freshly allocated bags populated from the parent, so writes to
//! either side are never observed by the other.
//!
//! ```
//! use eel_core::Context;
//!
//! let root = Context::new();
//! root.set_id("4a1e0c52-0000-4000-8000-000000000000");
//! root.put_value("tenant", "a");
//!
//! let child = root.sub_context();
//! child.put_value("tenant", "b");
//!
//! assert_eq!(root.value_str("tenant").as_deref(), Some("a"));
//! assert_eq!(child.value_str("tenant").as_deref(), Some("b"));
//! assert_eq!(child.id(), root.id());
//! ```

use std::{
    any::Any,
    collections::HashMap,
    fmt,
    sync::{Arc, OnceLock},
};

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::{
    helpers::new_uuid,
    keys,
    logging::{ContextLogger, LogSink, Logger, TracingSink},
    observer::{NoOpObserver, Observer},
    settings::Settings,
};

/// Type-erased long-lived handle stored in ConfigValues.
pub type ConfigHandle = Arc<dyn Any + Send + Sync>;

#[derive(Default, Clone)]
struct Bags {
    id: String,
    values: HashMap<String, Value>,
    log_values: HashMap<String, Value>,
    config_values: HashMap<String, ConfigHandle>,
}

/// Per-request context. See the module documentation.
pub struct Context {
    bags: RwLock<Bags>,
    logger: Logger,
    cancel: CancellationToken,
}

impl Context {
    /// Creates a root context logging through `tracing`.
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingSink))
    }

    /// Creates a root context logging to the given sink.
    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        Self {
            bags: RwLock::new(Bags::default()),
            logger: Logger::new(sink),
            cancel: CancellationToken::new(),
        }
    }

    /// Correlation id, empty when none has been assigned.
    pub fn id(&self) -> String {
        self.bags.read().id.clone()
    }

    /// Overrides the correlation id and mirrors it into LogValues.
    pub fn set_id(&self, id: impl Into<String>) {
        let id = id.into();
        let mut bags = self.bags.write();
        bags.log_values.insert(keys::LOG_TX_ID.to_string(), Value::String(id.clone()));
        bags.id = id;
    }

    /// Stores a request-scoped value.
    pub fn put_value(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.bags.write().values.insert(key.into(), value.into());
    }

    /// Reads a request-scoped value.
    pub fn value(&self, key: &str) -> Option<Value> {
        self.bags.read().values.get(key).cloned()
    }

    /// Reads a request-scoped value that holds a string.
    pub fn value_str(&self, key: &str) -> Option<String> {
        self.bags.read().values.get(key).and_then(Value::as_str).map(str::to_string)
    }

    /// Stores a field injected into every log line from this context.
    pub fn put_log_value(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.bags.write().log_values.insert(key.into(), value.into());
    }

    /// Reads a log field.
    pub fn log_value(&self, key: &str) -> Option<Value> {
        self.bags.read().log_values.get(key).cloned()
    }

    /// Snapshot of all log fields.
    pub fn log_values(&self) -> Map<String, Value> {
        self.bags.read().log_values.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Stores a long-lived handle.
    pub fn put_config<T: Any + Send + Sync>(&self, key: impl Into<String>, handle: Arc<T>) {
        self.bags.write().config_values.insert(key.into(), handle);
    }

    /// Reads a long-lived handle of a known type.
    ///
    /// Returns `None` when the key is absent or holds a different type.
    pub fn config<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let handle = self.config_handle(key)?;
        handle.downcast::<T>().ok()
    }

    /// Reads a long-lived handle without downcasting.
    pub fn config_handle(&self, key: &str) -> Option<ConfigHandle> {
        self.bags.read().config_values.get(key).cloned()
    }

    /// Registered settings, if any.
    pub fn settings(&self) -> Option<Arc<Settings>> {
        self.config::<Settings>(keys::SETTINGS)
    }

    /// Registers an observer under [`keys::OBSERVER`].
    pub fn register_observer(&self, observer: Arc<dyn Observer>) {
        self.put_config(keys::OBSERVER, Arc::new(observer));
    }

    /// Registered observer, or the inert default.
    pub fn observer(&self) -> Arc<dyn Observer> {
        match self.config::<Arc<dyn Observer>>(keys::OBSERVER) {
            Some(observer) => Arc::clone(&*observer),
            None => no_op_observer(),
        }
    }

    /// Logging view that merges LogValues into every record.
    pub fn log(&self) -> ContextLogger<'_> {
        ContextLogger::new(self)
    }

    pub(crate) fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Silences this context's logger.
    pub fn disable_logging(&self) {
        self.logger.set_enabled(false);
    }

    /// Re-enables this context's logger.
    pub fn enable_logging(&self) {
        self.logger.set_enabled(true);
    }

    /// Whether this context's logger emits records.
    pub fn logging_enabled(&self) -> bool {
        self.logger.is_enabled()
    }

    /// Token cancelled when the work described by this context is abandoned.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancels this context and every sub-context derived from it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether this context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Derives a child context.
    ///
    /// The three bags are copied under the parent's shared lock into newly
    /// allocated maps; ConfigValues handles are shared by reference. The
    /// child inherits the parent's correlation id, or mints a UUIDv4 when the
    /// parent has none. Cancelling the parent cancels the child.
    pub fn sub_context(&self) -> Context {
        let mut bags = self.bags.read().clone();
        if bags.id.is_empty() {
            bags.id = new_uuid();
        }
        bags.log_values.insert(keys::LOG_TX_ID.to_string(), Value::String(bags.id.clone()));

        Context {
            bags: RwLock::new(bags),
            logger: self.logger.fork(),
            cancel: self.cancel.child_token(),
        }
    }

    /// Starts an observer span and returns the span-scoped child context.
    pub fn start_span(&self, trace_name: &str, attrs: &[crate::observer::Attribute]) -> Context {
        self.observer().start(self, trace_name, attrs)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bags = self.bags.read();
        let mut config_keys: Vec<&String> = bags.config_values.keys().collect();
        config_keys.sort();
        f.debug_struct("Context")
            .field("id", &bags.id)
            .field("values", &bags.values)
            .field("log_values", &bags.log_values)
            .field("config_keys", &config_keys)
            .field("logging_enabled", &self.logger.is_enabled())
            .finish()
    }
}

fn no_op_observer() -> Arc<dyn Observer> {
    static NO_OP: OnceLock<Arc<dyn Observer>> = OnceLock::new();
    Arc::clone(NO_OP.get_or_init(|| Arc::new(NoOpObserver)))
}
