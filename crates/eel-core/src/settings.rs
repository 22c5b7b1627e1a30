//! Process configuration loaded once at start-up.
//!
//! The settings document is JSON with PascalCase keys. Unknown keys are
//! ignored and missing fields take their zero value. Top-level fields can be
//! overridden from the environment with the `EEL_` prefix and the field's own
//! casing, for example `EEL_MaxAttempts=5`.
//!
//! Durations are stored as integer milliseconds and converted to
//! [`Duration`](std::time::Duration) only where they are used.
//!
//! ```
//! use eel_core::Settings;
//!
//! let settings = Settings::from_json(r#"{"MaxAttempts": 3, "Pad": 5, "Unknown": true}"#)?;
//! assert_eq!(settings.max_attempts, 3);
//! assert_eq!(settings.pad, 5);
//! assert_eq!(settings.initial_delay, 0);
//! # Ok::<(), figment::Error>(())
//! ```

use std::{
    collections::HashMap,
    fs::File,
    io::Read,
    path::Path,
};

use figment::{
    providers::{Env, Format, Json},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SettingsError};

/// Environment prefix for settings overrides.
pub const ENV_PREFIX: &str = "EEL_";

/// Partner id assumed when a tenant string carries none.
pub const DEFAULT_PARTNER: &str = "comcast";

const DEFAULT_TENANT_HEADER: &str = "X-Tenant-Id";
const DEFAULT_PARTNER_HEADER: &str = "X-Partner-Id";
const DEFAULT_TRANSACTION_HEADER: &str = "X-B3-TraceId";

/// Credentials for outbound requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct BasicAuth {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

/// Optional secondary log target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct LogTarget {
    /// Whether the target is active.
    pub enable: bool,
    /// File the target writes to.
    pub file_name: String,
    /// Level filter for the target.
    pub level: String,
}

/// Immutable process settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Settings {
    // Identity
    /// Instance name reported in logs and health checks.
    pub name: String,
    /// Application id.
    pub app_id: String,
    /// Deployed version.
    pub version: String,

    // Endpoints and authentication
    /// Downstream URL events are forwarded to.
    pub endpoint: String,
    /// Credentials for the downstream endpoint.
    pub endpoint_auth: Option<BasicAuth>,
    /// Listener port; 8080 when zero.
    pub port: u16,

    // Retry tuning, milliseconds
    /// Maximum sends per event, including the first.
    pub max_attempts: u32,
    /// Sleep after the first failed attempt.
    pub initial_delay: u64,
    /// First exponential backoff step.
    pub initial_backoff: u64,
    /// Constant added to every backoff step.
    pub pad: u64,
    /// Backoff growth policy name.
    pub backoff_method: String,

    // HTTP tuning
    /// Whole-request timeout in milliseconds.
    pub http_timeout: u64,
    /// Timeout waiting for response data in milliseconds.
    pub response_header_timeout: u64,
    /// Idle pooled connections kept per host.
    pub max_idle_conns_per_host: usize,
    /// Largest accepted body in bytes; unlimited when zero.
    pub max_message_size: u64,

    // Topic routing
    /// Topics accepted as events.
    pub event_topics: Vec<String>,
    /// Topics accepted as actions.
    pub action_topics: Vec<String>,
    /// Dot-separated path to the topic inside a payload.
    pub topic_path: String,

    /// Worker pool sizes by pool name.
    pub worker_pool_size: HashMap<String, usize>,

    // Dedup
    /// Duplicate suppression window in milliseconds; disabled when zero.
    pub duplicate_timeout: u64,
    /// Number of payload digests remembered.
    pub duplicate_cache_size: usize,

    // Tenant conventions
    /// Whether tenant strings may carry a partner suffix.
    pub allow_partner: bool,
    /// Partner assumed when none is present.
    pub default_partner: String,
    /// Header carrying `appId[_partnerId]`.
    pub http_tenant_header: String,
    /// Header carrying an explicit partner id.
    pub http_partner_header: String,
    /// Header carrying the correlation id.
    pub http_transaction_header: String,

    // Logging
    /// Log field name to payload path.
    pub log_params: HashMap<String, String>,
    /// Debug log target.
    pub debug_log: Option<LogTarget>,
    /// Trace log target.
    pub trace_log: Option<LogTarget>,

    // Extensions
    /// Deployment-defined properties exposed to handlers.
    pub custom_properties: Map<String, Value>,
    /// Anything else.
    pub misc: Map<String, Value>,
}

impl Settings {
    /// Loads settings from a JSON file with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Open`], [`SettingsError::Read`] or
    /// [`SettingsError::Parse`] depending on which stage failed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file =
            File::open(path).map_err(|source| SettingsError::Open { path: path.into(), source })?;

        let mut text = String::new();
        file.read_to_string(&mut text)
            .map_err(|source| SettingsError::Read { path: path.into(), source })?;

        Figment::new()
            .merge(Json::string(&text))
            .merge(Env::prefixed(ENV_PREFIX).lowercase(false))
            .extract()
            .map_err(|e| SettingsError::Parse { path: path.into(), message: e.to_string() })
    }

    /// Parses a settings document without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns the extraction error when the document is not valid JSON or a
    /// field has the wrong type.
    pub fn from_json(text: &str) -> std::result::Result<Self, figment::Error> {
        Figment::new().merge(Json::string(text)).extract()
    }

    /// Listener port.
    pub fn listen_port(&self) -> u16 {
        if self.port == 0 {
            8080
        } else {
            self.port
        }
    }

    /// Partner used when a tenant string carries none.
    pub fn default_partner(&self) -> &str {
        non_empty_or(&self.default_partner, DEFAULT_PARTNER)
    }

    /// Tenant header name.
    pub fn tenant_header(&self) -> &str {
        non_empty_or(&self.http_tenant_header, DEFAULT_TENANT_HEADER)
    }

    /// Partner header name.
    pub fn partner_header(&self) -> &str {
        non_empty_or(&self.http_partner_header, DEFAULT_PARTNER_HEADER)
    }

    /// Correlation id header name.
    pub fn transaction_header(&self) -> &str {
        non_empty_or(&self.http_transaction_header, DEFAULT_TRANSACTION_HEADER)
    }

    /// Worker count for a named pool, falling back to `default`.
    pub fn pool_size(&self, pool: &str, default: usize) -> usize {
        match self.worker_pool_size.get(pool) {
            Some(&size) if size > 0 => size,
            _ => default,
        }
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}
