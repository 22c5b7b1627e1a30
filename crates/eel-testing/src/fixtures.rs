//! Settings fixtures.

use eel_core::Settings;
use serde_json::{json, Map, Value};

/// Builds settings from PascalCase fields, the way they appear on disk.
///
/// ```
/// use eel_testing::SettingsBuilder;
///
/// let settings = SettingsBuilder::new().field("MaxAttempts", 3).build();
/// assert_eq!(settings.max_attempts, 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SettingsBuilder {
    fields: Map<String, Value>,
}

impl SettingsBuilder {
    /// Empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Retry tuning used across the dispatcher tests: three attempts, 10 ms
    /// initial delay, 20 ms backoff and 5 ms pad.
    pub fn retrying() -> Self {
        Self::new()
            .field("MaxAttempts", 3)
            .field("InitialDelay", 10)
            .field("InitialBackoff", 20)
            .field("Pad", 5)
    }

    /// Sets one field.
    #[must_use]
    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Downstream endpoint.
    #[must_use]
    pub fn endpoint(self, url: &str) -> Self {
        self.field("Endpoint", url)
    }

    /// Dedup window and cache size.
    #[must_use]
    pub fn dedup(self, ttl_ms: u64, size: usize) -> Self {
        self.field("DuplicateTimeout", ttl_ms).field("DuplicateCacheSize", size)
    }

    /// Log field to payload path mapping.
    #[must_use]
    pub fn log_param(mut self, name: &str, path: &str) -> Self {
        let params = self.fields.entry("LogParams").or_insert_with(|| json!({}));
        if let Value::Object(params) = params {
            params.insert(name.to_string(), Value::from(path));
        }
        self
    }

    /// The document as JSON text.
    pub fn to_json(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }

    /// Parses the document.
    ///
    /// # Panics
    ///
    /// Panics when a field has the wrong type for the settings record.
    #[allow(clippy::expect_used)]
    pub fn build(&self) -> Settings {
        Settings::from_json(&self.to_json()).expect("fixture settings must parse")
    }
}
