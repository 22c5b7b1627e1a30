//! Log capture for assertions on context log lines.

use std::sync::Arc;

use eel_core::{Context, LogLevel, LogRecord, LogSink};
use parking_lot::Mutex;

/// Sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct CapturingSink {
    records: Mutex<Vec<LogRecord>>,
}

impl CapturingSink {
    /// Creates an empty shared sink.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Root context writing to `sink`.
    pub fn context(sink: &Arc<Self>) -> Context {
        Context::with_sink(Arc::clone(sink) as Arc<dyn LogSink>)
    }

    /// Snapshot of all records.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Records at `level`.
    pub fn at_level(&self, level: LogLevel) -> Vec<LogRecord> {
        self.records.lock().iter().filter(|r| r.level == level).cloned().collect()
    }

    /// Records whose message equals `message`.
    pub fn with_message(&self, message: &str) -> Vec<LogRecord> {
        self.records.lock().iter().filter(|r| r.message == message).cloned().collect()
    }

    /// Drops everything captured so far.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl LogSink for CapturingSink {
    fn emit(&self, record: &LogRecord) {
        self.records.lock().push(record.clone());
    }
}
