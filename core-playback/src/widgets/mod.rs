//! # Widget Variants
//!
//! Concrete [`Playable`] implementations. Leaves (`image`, `video`, `text`,
//! `image-carousel`) acquire assets and mount render nodes; containers
//! (`group`, `layout`, `list`, `template`) fan the clock out to children
//! built by the [`factory`](crate::factory).
//!
//! Container semantics shared by every variant:
//! - `load()` succeeds unless every child fails
//! - `show()` reports `Shown` when at least one child is shown
//! - all children of one activation receive the same tick source

pub mod carousel;
pub mod group;
pub mod image;
pub mod layout;
pub mod list;
pub mod template;
pub mod text;
pub mod video;

pub use carousel::{CarouselOptions, ImageCarousel};
pub use group::Group;
pub use image::{ImageOptions, ImageWidget};
pub use layout::{Layout, LayoutOptions};
pub use list::{List, ListOptions};
pub use template::TemplateWidget;
pub use text::{TextOptions, TextWidget};
pub use video::{VideoOptions, VideoWidget};

use crate::assets::FontRegistry;
use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, Result};
use crate::traits::{Playable, ShowOutcome, Surface};
use bridge_traits::{MediaProbe, NodeContent, RenderNode, Renderer, ResourceManager};
use futures::future;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Collaborators shared by every widget of a document.
#[derive(Clone)]
pub struct WidgetDeps {
    pub resources: Arc<dyn ResourceManager>,
    pub probe: Arc<dyn MediaProbe>,
    pub fonts: Arc<FontRegistry>,
    pub config: Arc<PlaybackConfig>,
}

impl WidgetDeps {
    pub fn new(
        resources: Arc<dyn ResourceManager>,
        probe: Arc<dyn MediaProbe>,
        renderer: Arc<dyn Renderer>,
        config: Arc<PlaybackConfig>,
    ) -> Self {
        let fonts = Arc::new(FontRegistry::new(renderer, Arc::clone(&resources)));
        Self {
            resources,
            probe,
            fonts,
            config,
        }
    }
}

impl std::fmt::Debug for WidgetDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetDeps")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Style and animations a node carries into its render node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Presentation {
    pub style: Map<String, Value>,
    pub animations: Vec<Value>,
}

impl Presentation {
    pub fn node(&self, content: NodeContent) -> RenderNode {
        RenderNode::new(content)
            .with_style(self.style.clone())
            .with_animations(self.animations.clone())
    }
}

/// Surface a widget is currently mounted into.
#[derive(Default)]
pub(crate) struct MountPoint {
    surface: Mutex<Option<Surface>>,
}

impl MountPoint {
    pub(crate) fn set(&self, surface: Surface) {
        *self.surface.lock() = Some(surface);
    }

    pub(crate) fn get(&self) -> Option<Surface> {
        self.surface.lock().clone()
    }

    /// Unmount if mounted.
    pub(crate) fn clear(&self) {
        if let Some(surface) = self.surface.lock().take() {
            surface.renderer.unmount(&surface.container);
        }
    }
}

/// Load every child; fails only when all of them fail.
pub(crate) async fn load_all(children: &[Arc<dyn Playable>]) -> Result<()> {
    if children.is_empty() {
        return Ok(());
    }
    let results = future::join_all(children.iter().map(|c| c.load())).await;
    let mut first_error = None;
    for result in results {
        match result {
            Ok(()) => return Ok(()),
            Err(e) if first_error.is_none() => first_error = Some(e),
            Err(_) => {}
        }
    }
    Err(first_error.unwrap_or_else(|| PlaybackError::Internal("no child loaded".into())))
}

/// Show each child in its own surface; `Shown` when at least one succeeds.
pub(crate) async fn show_all(
    children: &[Arc<dyn Playable>],
    surfaces: Vec<Surface>,
    offset_ms: u64,
) -> ShowOutcome {
    if children.is_empty() {
        return ShowOutcome::Shown;
    }
    let outcomes = future::join_all(
        children
            .iter()
            .zip(surfaces.iter())
            .map(|(child, surface)| child.show(surface, offset_ms)),
    )
    .await;

    let mut errors = Vec::new();
    for (child, outcome) in children.iter().zip(outcomes) {
        match outcome {
            ShowOutcome::Shown => return ShowOutcome::Shown,
            ShowOutcome::Error(message) => errors.push(format!("{}: {}", child.name(), message)),
        }
    }
    ShowOutcome::Error(errors.join("; "))
}
