//! HTTP middleware.

pub mod panic;

pub use panic::wrap_panic_http_handler;
