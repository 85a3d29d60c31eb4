//! # Host Bridge Traits
//!
//! Contracts between the playback core and the device shell it runs in.
//!
//! ## Traits
//!
//! ### Media
//! - [`ResourceManager`](media::ResourceManager) - Resolves media URIs through the host cache
//! - [`MediaProbe`](media::MediaProbe) - Reads intrinsic metadata such as video duration
//!
//! ### Screen
//! - [`Renderer`](render::Renderer) - Mounts content into screen regions, applies
//!   per-frame visual state, drives video transport, and manages font faces
//!
//! ### Utilities
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! `ResourceManager` and `Renderer` are required; the core refuses to build a
//! configuration without them:
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .resource_manager(Arc::new(HostCache::new()))
//!     .build()?; // Error::CapabilityMissing { capability: "Renderer", .. }
//! ```
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single implementation can be
//! shared between the scheduler task and prefetch tasks.

pub mod error;
pub mod logging;
pub mod media;
pub mod render;

pub use error::BridgeError;

// Re-export commonly used types
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use media::{MediaMetadata, MediaProbe, NoopProbe, ResourceManager};
pub use render::{
    Container, FontFace, MediaCommand, NodeContent, RenderNode, Renderer, VisualState,
};
