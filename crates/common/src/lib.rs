//! CastBridge Common Utilities
//!
//! Shared infrastructure for all CastBridge crates:
//! - Error taxonomy and result aliases
//! - Session clock used for durations and signal timestamps
//! - Tracing/logging initialization
//! - Configuration loading and validation

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
