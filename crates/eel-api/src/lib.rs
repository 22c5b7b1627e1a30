//! eel HTTP API.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use eel_core::{Clock, Runtime};
use eel_delivery::{RetryDriver, RetryPolicy};

pub mod handlers;
pub mod middleware;
pub mod server;

pub use middleware::wrap_panic_http_handler;
pub use server::{create_router, start_server};

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Root context, settings and instance identity.
    pub runtime: Runtime,
    /// Retry driver configured from the runtime settings.
    pub driver: RetryDriver,
    /// Time source for timestamps and handler durations.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Builds handler state, deriving the retry policy from settings.
    pub fn new(runtime: Runtime, clock: Arc<dyn Clock>) -> Self {
        let driver = RetryDriver::new(RetryPolicy::from_settings(runtime.settings()), Arc::clone(&clock));
        Self { runtime, driver, clock }
    }
}
