//! # Widget Factory
//!
//! Maps the `type` discriminant of a document node onto a widget
//! constructor. Every tag is listed in [`WidgetType`], so adding a widget
//! variant forces the match in [`WidgetType::construct`] to be updated.

use crate::error::{PlaybackError, Result};
use crate::tree::TreeNode;
use crate::traits::Playable;
use crate::widgets::{
    CarouselOptions, Group, ImageCarousel, ImageOptions, ImageWidget, Layout, LayoutOptions,
    List, ListOptions, Presentation, TemplateWidget, TextOptions, TextWidget, VideoOptions,
    VideoWidget, WidgetDeps,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetType {
    Group,
    List,
    Layout,
    Image,
    Video,
    Text,
    ImageCarousel,
    Template,
}

impl WidgetType {
    pub const ALL: [WidgetType; 8] = [
        WidgetType::Group,
        WidgetType::List,
        WidgetType::Layout,
        WidgetType::Image,
        WidgetType::Video,
        WidgetType::Text,
        WidgetType::ImageCarousel,
        WidgetType::Template,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetType::Group => "group",
            WidgetType::List => "list",
            WidgetType::Layout => "layout",
            WidgetType::Image => "image",
            WidgetType::Video => "video",
            WidgetType::Text => "text",
            WidgetType::ImageCarousel => "image-carousel",
            WidgetType::Template => "template",
        }
    }

    /// Parse a tag, reporting `path` on failure.
    pub fn parse(tag: &str, path: &str) -> Result<Self> {
        tag.parse().map_err(|_| PlaybackError::UnknownWidgetType {
            tag: tag.to_string(),
            path: path.to_string(),
        })
    }

    /// Types whose `children` are expanded by the tree builder.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            WidgetType::Group | WidgetType::List | WidgetType::Layout | WidgetType::Template
        )
    }

    /// Instantiate the widget for `node` from its already built children.
    pub fn construct(
        &self,
        node: &TreeNode,
        children: Vec<Arc<dyn Playable>>,
        deps: &WidgetDeps,
    ) -> Result<Arc<dyn Playable>> {
        let name = node.name.clone();
        let presentation = Presentation {
            style: node.style.clone(),
            animations: node.animations.clone(),
        };
        let widget: Arc<dyn Playable> = match self {
            WidgetType::Group => Arc::new(Group::new(name, presentation, children)),
            WidgetType::Layout => {
                let opts: LayoutOptions = parse_options(self, node)?;
                Arc::new(Layout::new(name, opts, presentation, children))
            }
            WidgetType::List => {
                let opts: ListOptions = parse_options(self, node)?;
                Arc::new(List::new(name, opts, presentation, children))
            }
            WidgetType::Image => {
                let opts: ImageOptions = parse_options(self, node)?;
                Arc::new(ImageWidget::new(name, opts, presentation, deps))
            }
            WidgetType::Video => {
                let opts: VideoOptions = parse_options(self, node)?;
                Arc::new(VideoWidget::new(name, opts, presentation, deps))
            }
            WidgetType::Text => {
                let opts: TextOptions = parse_options(self, node)?;
                Arc::new(TextWidget::new(name, opts, presentation, deps))
            }
            WidgetType::ImageCarousel => {
                let opts: CarouselOptions = parse_options(self, node)?;
                Arc::new(ImageCarousel::new(name, opts, presentation, deps))
            }
            WidgetType::Template => {
                let root = children.into_iter().next().ok_or_else(|| {
                    invalid(self, node, "template requires a nested document".to_string())
                })?;
                Arc::new(TemplateWidget::new(name, root))
            }
        };
        Ok(widget)
    }
}

impl FromStr for WidgetType {
    type Err = PlaybackError;

    fn from_str(tag: &str) -> Result<Self> {
        let normalized = tag.trim().to_ascii_lowercase();
        let found = match normalized.as_str() {
            "group" => WidgetType::Group,
            "list" => WidgetType::List,
            "layout" => WidgetType::Layout,
            "image" => WidgetType::Image,
            "video" => WidgetType::Video,
            "text" => WidgetType::Text,
            "image-carousel" | "imagecarousel" | "carousel" => WidgetType::ImageCarousel,
            "template" => WidgetType::Template,
            _ => {
                return Err(PlaybackError::UnknownWidgetType {
                    tag: tag.to_string(),
                    path: "$".to_string(),
                })
            }
        };
        Ok(found)
    }
}

impl fmt::Display for WidgetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_options<T: DeserializeOwned>(kind: &WidgetType, node: &TreeNode) -> Result<T> {
    let opts = match &node.opts {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(opts).map_err(|e| invalid(kind, node, e.to_string()))
}

fn invalid(kind: &WidgetType, node: &TreeNode, message: String) -> PlaybackError {
    PlaybackError::InvalidOptions {
        widget: kind.to_string(),
        path: node.path.clone(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_round_trip() {
        for kind in WidgetType::ALL {
            assert_eq!(kind.as_str().parse::<WidgetType>().unwrap(), kind);
        }
        assert_eq!("Image-Carousel".parse::<WidgetType>().unwrap(), WidgetType::ImageCarousel);
    }

    #[test]
    fn test_unknown_tag_names_path() {
        let err = WidgetType::parse("foo", "$.items[1].widget").unwrap_err();
        assert_eq!(err.to_string(), "Unknown widget type 'foo' at $.items[1].widget");
        assert!(err.is_construction_error());
    }

    #[test]
    fn test_containers() {
        assert!(WidgetType::List.is_container());
        assert!(!WidgetType::ImageCarousel.is_container());
    }
}
