//! Request context, settings and observer hooks for the eel dispatcher.
//!
//! Provides the per-request [`Context`] with its three keyed bags, the
//! immutable [`Settings`] record, the pluggable [`Observer`] sink, panic
//! capture for request handlers and the small helpers every other crate
//! shares. Delivery and HTTP crates build on these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod helpers;
pub mod keys;
pub mod logging;
pub mod observer;
pub mod panic;
pub mod runtime;
pub mod settings;
pub mod time;

pub use context::{ConfigHandle, Context};
pub use error::{Result, SettingsError};
pub use logging::{ContextLogger, LogLevel, LogRecord, LogSink, Logger, TracingSink};
pub use observer::{attributes, metrics, spans, Attribute, NoOpObserver, Observer, TracingObserver};
pub use panic::{catch_panic, catch_panic_async, install_capture_hook};
pub use runtime::Runtime;
pub use settings::{BasicAuth, LogTarget, Settings};
pub use time::{Clock, RealClock, TestClock};
