//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the signage player core:
//! - Logging and tracing infrastructure
//! - Configuration management and bridge validation
//! - Event bus system
//! - Bounded device event log
//!
//! Every other core crate depends on this one for the conventions it sets:
//! how logs are emitted, how events are broadcast, and how host bridges are
//! injected.

pub mod config;
pub mod device_log;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
