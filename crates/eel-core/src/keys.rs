//! Well-known context keys shared between the dispatcher core and its
//! surrounding handlers, transports and observers.

/// Loaded [`Settings`](crate::Settings) in ConfigValues.
pub const SETTINGS: &str = "Eel.Settings";
/// Outbound HTTP client in ConfigValues.
pub const HTTP_CLIENT: &str = "Eel.HttpClient";
/// Standard transport used by the retry driver convenience wrapper.
pub const HTTP_TRANSPORT: &str = "Eel.HttpTransport";
/// Inbound request headers in Values.
pub const HEADER: &str = "Eel.Header";
/// Inbound query parameters in Values.
pub const QUERY: &str = "Eel.Query";
/// Tenant application id in Values and LogValues.
pub const TENANT_ID: &str = "Eel.TenantId";
/// Tenant partner id in Values and LogValues.
pub const PARTNER_ID: &str = "Eel.PartnerId";
/// Free-form settings extension map in Values.
pub const CUSTOM_PROPERTIES: &str = "Eel.CustomProperties";
/// Registered [`Observer`](crate::Observer) in ConfigValues.
pub const OBSERVER: &str = "Eel.Observer";
/// Registered duplicate checker in ConfigValues.
pub const DUPLICATE_CHECKER: &str = "Eel.DuplicateChecker";
/// Trace logger handle in ConfigValues.
pub const TRACE_LOGGER: &str = "Eel.TraceLogger";
/// Shared cache handle in ConfigValues.
pub const CACHE: &str = "Eel.Cache";
/// Span start time (nanoseconds since the epoch) in Values.
pub const START_TIME: &str = "StartTime";

/// Correlation id field in LogValues.
pub const LOG_TX_ID: &str = "tx.traceId";
/// Retry attempt field in LogValues.
pub const LOG_ATTEMPT: &str = "attempt";
