//! Renderer contract.
//!
//! The renderer owns the screen. The core describes what should be mounted in
//! which region ([`RenderNode`] into a [`Container`]), how mounted content
//! should look at a given instant ([`VisualState`]), and how time-based media
//! should move ([`MediaCommand`]). Everything about pixels stays host-side.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::Result;

/// Address of a screen region.
///
/// Containers form a path hierarchy (`screen/layer-1/region-0`); composite
/// widgets derive child regions with [`Container::child`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Container {
    id: String,
}

impl Container {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn child(&self, name: impl AsRef<str>) -> Self {
        Self {
            id: format!("{}/{}", self.id, name.as_ref()),
        }
    }

    /// Whether `self` is `other` or nested somewhere below it.
    pub fn is_within(&self, other: &Container) -> bool {
        self.id == other.id
            || (self.id.starts_with(&other.id)
                && self.id.as_bytes().get(other.id.len()) == Some(&b'/'))
    }
}

impl std::fmt::Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// Content of a mounted node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeContent {
    Image {
        url: String,
        fit: Option<String>,
    },
    Video {
        url: String,
        muted: bool,
        looped: bool,
    },
    Text {
        text: String,
        font_family: Option<String>,
    },
    /// An empty box that hosts child regions.
    Region,
}

/// One mountable unit: content plus author-supplied style and animations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderNode {
    pub content: NodeContent,
    #[serde(default)]
    pub style: Map<String, Value>,
    #[serde(default)]
    pub animations: Vec<Value>,
}

impl RenderNode {
    pub fn new(content: NodeContent) -> Self {
        Self {
            content,
            style: Map::new(),
            animations: Vec::new(),
        }
    }

    pub fn with_style(mut self, style: Map<String, Value>) -> Self {
        self.style = style;
        self
    }

    pub fn with_animations(mut self, animations: Vec<Value>) -> Self {
        self.animations = animations;
        self
    }
}

/// Per-frame presentation of a mounted container.
///
/// Translations and `reveal` are fractions of the container size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualState {
    pub opacity: f64,
    pub rotation: f64,
    pub z_index: i32,
    pub translate_x: f64,
    pub translate_y: f64,
    pub reveal: f64,
    pub css: BTreeMap<String, String>,
}

impl Default for VisualState {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            rotation: 0.0,
            z_index: 0,
            translate_x: 0.0,
            translate_y: 0.0,
            reveal: 1.0,
            css: BTreeMap::new(),
        }
    }
}

/// Transport control for video content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum MediaCommand {
    Play { offset_ms: u64 },
    Pause,
    Seek { offset_ms: u64 },
}

/// Identity of a font face; two widgets using the same family and source
/// share one loaded face.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FontFace {
    pub family: String,
    pub uri: String,
}

impl FontFace {
    pub fn new(family: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            uri: uri.into(),
        }
    }
}

/// Screen renderer supplied by the device shell.
///
/// `unmount` must be safe to call for containers that were never mounted,
/// and must remove everything mounted below the container as well.
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    /// Mount `node` into `container`, replacing whatever was there.
    async fn mount(&self, container: &Container, node: RenderNode) -> Result<()>;

    /// Remove `container` and all of its descendants from the screen.
    fn unmount(&self, container: &Container);

    /// Apply opacity, transform and css overrides to a mounted container.
    fn apply_visual(&self, container: &Container, state: &VisualState) -> Result<()>;

    /// Drive playback of mounted video content.
    fn control_media(&self, container: &Container, command: MediaCommand) -> Result<()>;

    /// Register a font face from a resolved URL.
    async fn load_font(&self, face: &FontFace, url: &str) -> Result<()>;

    /// Unregister a previously loaded font face.
    fn unload_font(&self, face: &FontFace);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_child_paths() {
        let screen = Container::new("screen");
        let region = screen.child("layer-1").child("region-0");

        assert_eq!(region.id(), "screen/layer-1/region-0");
        assert!(region.is_within(&screen));
        assert!(region.is_within(&region));
        assert!(!screen.is_within(&region));
        assert!(!Container::new("screen-2").is_within(&screen));
    }

    #[test]
    fn test_visual_state_defaults_are_fully_visible() {
        let state = VisualState::default();
        assert_eq!(state.opacity, 1.0);
        assert_eq!(state.reveal, 1.0);
        assert!(state.css.is_empty());
    }

    #[test]
    fn test_media_command_serialization() {
        let json = serde_json::to_value(MediaCommand::Play { offset_ms: 1500 }).unwrap();
        assert_eq!(json["command"], "play");
        assert_eq!(json["offset_ms"], 1500);
    }
}
