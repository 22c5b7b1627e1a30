//! Context-bound structured logging.
//!
//! Every record emitted through a [`Context`] absorbs the context's
//! LogValues at emission time, so correlation id, tenant and retry attempt
//! travel with each line without call sites repeating them. Records are
//! handed to a pluggable [`LogSink`]; the default [`TracingSink`] forwards
//! them to `tracing`.

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::context::Context;

/// Severity of a context log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal operation.
    Info,
    /// Recoverable anomaly.
    Warn,
    /// Failure requiring attention.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One structured log line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Severity.
    pub level: LogLevel,
    /// Human readable message.
    pub message: String,
    /// LogValues merged with the call-site key/value pairs.
    pub fields: Map<String, Value>,
}

impl LogRecord {
    /// Returns a field rendered as text, if present.
    pub fn field(&self, key: &str) -> Option<String> {
        self.fields.get(key).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Destination for context log records.
pub trait LogSink: Send + Sync + fmt::Debug {
    /// Writes a record. Must not block beyond brief buffering.
    fn emit(&self, record: &LogRecord);
}

/// Sink that forwards records to the `tracing` subscriber.
///
/// All fields are carried as one JSON object so the line stays a single
/// key/value record regardless of which keys a context accumulated.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, record: &LogRecord) {
        let fields = Value::Object(record.fields.clone());
        match record.level {
            LogLevel::Debug => tracing::debug!(target: "eel", fields = %fields, "{}", record.message),
            LogLevel::Info => tracing::info!(target: "eel", fields = %fields, "{}", record.message),
            LogLevel::Warn => tracing::warn!(target: "eel", fields = %fields, "{}", record.message),
            LogLevel::Error => tracing::error!(target: "eel", fields = %fields, "{}", record.message),
        }
    }
}

/// Logger handle owned by a single context.
///
/// The enabled flag sits behind its own mutex so toggling logging never
/// contends with access to the context bags.
#[derive(Debug)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
    enabled: Mutex<bool>,
}

impl Logger {
    /// Creates an enabled logger writing to `sink`.
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink, enabled: Mutex::new(true) }
    }

    /// Creates an independent logger sharing this logger's sink and current
    /// enabled state.
    pub(crate) fn fork(&self) -> Self {
        Self { sink: Arc::clone(&self.sink), enabled: Mutex::new(self.is_enabled()) }
    }

    /// Whether records are currently emitted.
    pub fn is_enabled(&self) -> bool {
        *self.enabled.lock()
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        *self.enabled.lock() = enabled;
    }

    /// The sink records are written to.
    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }
}

/// Logging view over a context, returned by [`Context::log`].
#[derive(Debug, Clone, Copy)]
pub struct ContextLogger<'a> {
    ctx: &'a Context,
}

impl<'a> ContextLogger<'a> {
    pub(crate) fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    /// Emits a debug record.
    pub fn debug(&self, message: &str, kv: &[(&str, &str)]) {
        self.emit(LogLevel::Debug, message, kv);
    }

    /// Emits an info record.
    pub fn info(&self, message: &str, kv: &[(&str, &str)]) {
        self.emit(LogLevel::Info, message, kv);
    }

    /// Emits a warn record.
    pub fn warn(&self, message: &str, kv: &[(&str, &str)]) {
        self.emit(LogLevel::Warn, message, kv);
    }

    /// Emits an error record.
    pub fn error(&self, message: &str, kv: &[(&str, &str)]) {
        self.emit(LogLevel::Error, message, kv);
    }

    /// Emits a record whose extra fields are arbitrary JSON values.
    pub fn emit_fields(&self, level: LogLevel, message: &str, extra: Map<String, Value>) {
        let logger = self.ctx.logger();
        if !logger.is_enabled() {
            return;
        }

        let mut fields = self.ctx.log_values();
        fields.extend(extra);
        logger.sink().emit(&LogRecord { level, message: message.to_string(), fields });
    }

    fn emit(&self, level: LogLevel, message: &str, kv: &[(&str, &str)]) {
        let extra = kv
            .iter()
            .map(|(key, value)| ((*key).to_string(), Value::String((*value).to_string())))
            .collect();
        self.emit_fields(level, message, extra);
    }
}
