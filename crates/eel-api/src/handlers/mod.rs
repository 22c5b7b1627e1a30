//! HTTP request handlers.
//!
//! - `health` - liveness and health probes
//! - `events` - event ingest and forwarding

pub mod events;
pub mod health;

pub use events::ingest_event;
pub use health::{health_check, liveness_check};
