//! Error types for settings loading.
//!
//! Context, observer and helper operations never fail; the only fallible
//! surface in this crate is reading the settings document at start-up, which
//! the binary treats as fatal.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Failure to load the settings document.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be opened.
    #[error("failed to open config {path}: {source}")]
    Open {
        /// Path that was opened
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The settings file was opened but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Path that was read
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The settings document is not valid for the settings schema.
    #[error("failed to parse config {path}: {message}")]
    Parse {
        /// Path that was parsed
        path: PathBuf,
        /// Parser diagnostic
        message: String,
    },
}

impl SettingsError {
    /// Error family reported in the fatal log line.
    pub const fn error_type(&self) -> &'static str {
        "get_config"
    }

    /// Stage of loading that failed.
    pub const fn cause(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open_config",
            Self::Read { .. } => "read_config",
            Self::Parse { .. } => "parse_config",
        }
    }

    /// Single-line JSON blob written to stdout before the process exits.
    pub fn to_json_line(&self) -> String {
        serde_json::json!({
            "error": self.to_string(),
            "error_type": self.error_type(),
            "cause": self.cause(),
        })
        .to_string()
    }
}
