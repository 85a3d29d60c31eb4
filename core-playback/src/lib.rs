//! # Playback Engine
//!
//! Turns playlist documents into scheduled, on-screen content.
//!
//! ## Overview
//!
//! This crate handles:
//! - The [`Playable`] contract shared by widgets and layers
//! - Widgets: image, video, text, list, group, layout, image carousel, template
//! - Building widget trees from JSON documents with `{{binding}}` resolution
//! - Transitions between consecutive layers
//! - The [`Timeline`] scheduler: clock, cursor, seek, loop, prefetch and live edits
//!
//! ## Usage
//!
//! ```ignore
//! let deps = WidgetDeps::new(resources, probe, Arc::clone(&renderer), config);
//! let surface = Surface::new(renderer, Container::new("screen"));
//! let timeline = Timeline::from_document(&doc, &deps, surface, events, true)?;
//! timeline.play().await?;
//! ```

pub mod assets;
pub mod config;
pub mod context;
pub mod error;
pub mod factory;
pub mod layer;
pub mod schedule;
pub mod timeline;
pub mod traits;
pub mod transition;
pub mod tree;
pub mod widgets;

pub use config::PlaybackConfig;
pub use context::TemplateContext;
pub use core_runtime::events::PlaybackState;
pub use error::{PlaybackError, Result};
pub use factory::WidgetType;
pub use layer::{Layer, LayerSpec, LayerStatus};
pub use timeline::{Playlist, Timeline, TimelineStatus};
pub use traits::{
    DurationFuture, PlaySignal, PlayStream, Playable, SeekResult, ShowOutcome, Surface, Tick,
    TickStream,
};
pub use transition::{Transition, TransitionFrame, VisualPatch};
pub use tree::{TreeNode, WidgetTree};
pub use widgets::WidgetDeps;
