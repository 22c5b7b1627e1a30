//! Test infrastructure for the eel crates.
//!
//! Provides a capturing log sink, a scripted transport, settings fixtures and
//! the deterministic clock, so dispatcher behaviour can be asserted without
//! real downstream services or real sleeps.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod fixtures;
pub mod logs;
pub mod transport;

pub use eel_core::TestClock;
pub use fixtures::SettingsBuilder;
pub use logs::CapturingSink;
pub use transport::ScriptedTransport;
