//! Outbound delivery for the eel dispatcher.
//!
//! Three pieces sit between an accepted event and the downstream endpoint:
//!
//! 1. **Duplicate suppression** - an LRU of payload digests rejects repeats
//!    seen within `DuplicateTimeout`
//! 2. **Retry driver** - capped exponential backoff around a [`Transport`],
//!    retrying network failures and statuses outside `[200, 499]`
//! 3. **HTTP transport** - a pooled reqwest client honouring the settings
//!    timeouts and response size cap
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use eel_core::{Context, RealClock, Settings};
//! use eel_delivery::{ClientConfig, HttpTransport, OutboundRequest, RetryDriver, RetryPolicy};
//!
//! # async fn example(settings: Settings) -> eel_delivery::Result<()> {
//! let transport = HttpTransport::new(ClientConfig::from_settings(&settings))?;
//! let driver = RetryDriver::new(RetryPolicy::from_settings(&settings), Arc::new(RealClock));
//!
//! let ctx = Context::new().sub_context();
//! let request = OutboundRequest::post(settings.endpoint.clone(), r#"{"event":"x"}"#);
//! let exchange = driver.retry(&ctx, &request, &transport).await;
//! println!("downstream answered {}", exchange.status);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod dedup;
pub mod error;
pub mod retry;

pub use client::{register_transport, registered_transport, ClientConfig, HttpTransport};
pub use dedup::{
    duplicate_checker, payload_digest, register_duplicate_checker, DuplicateChecker,
    DuplicateConfig, LruDuplicateChecker,
};
pub use error::{DeliveryError, ErrorCategory, Result};
pub use retry::{BackoffMethod, Exchange, OutboundRequest, RetryDriver, RetryPolicy, Transport};
