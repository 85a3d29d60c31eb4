//! # Transitions
//!
//! A transition overlaps the tail of the outgoing layer with the head of the
//! incoming one. Transitions are immutable once parsed and hold no playback
//! state, so a single instance is shared by reference.
//!
//! Documents describe a transition either as a bare kind (`"fade"`) or as an
//! object:
//!
//! ```json
//! { "type": "slide", "duration": 800, "direction": "left", "easing": "ease-out" }
//! ```

use crate::error::{PlaybackError, Result};
use bridge_traits::VisualState;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// Duration used when a document names a transition without one.
pub const DEFAULT_TRANSITION_MS: u64 = 500;

// ============================================================================
// Easing
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Easing {
    #[default]
    Linear,
    InQuad,
    OutQuad,
    InOutQuad,
    InCubic,
    OutCubic,
    InOutCubic,
}

impl Easing {
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::InQuad => t * t,
            Self::OutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            Self::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(2) / 2.0)
                }
            }
            Self::InCubic => t * t * t,
            Self::OutCubic => 1.0 - (1.0 - t).powi(3),
            Self::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(3) / 2.0)
                }
            }
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "ease-in" | "in-quad" | "ease_in" => Ok(Self::InQuad),
            "ease-out" | "out-quad" | "ease_out" => Ok(Self::OutQuad),
            "ease-in-out" | "in-out-quad" | "ease_in_out" | "ease" => Ok(Self::InOutQuad),
            "ease-in-cubic" | "in-cubic" => Ok(Self::InCubic),
            "ease-out-cubic" | "out-cubic" => Ok(Self::OutCubic),
            "ease-in-out-cubic" | "in-out-cubic" => Ok(Self::InOutCubic),
            other => Err(PlaybackError::UnknownTransition(format!(
                "unknown easing '{other}'"
            ))),
        }
    }
}

/// Direction content travels during a slide or wipe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "left" | "rtl" | "right_to_left" => Ok(Self::Left),
            "right" | "ltr" | "left_to_right" => Ok(Self::Right),
            "up" | "btt" | "bottom_to_top" => Ok(Self::Up),
            "down" | "ttb" | "top_to_bottom" => Ok(Self::Down),
            other => Err(PlaybackError::UnknownTransition(format!(
                "unknown direction '{other}'"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    /// Unit vector of travel on screen, y pointing down.
    fn vector(self) -> (f64, f64) {
        match self {
            Self::Left => (-1.0, 0.0),
            Self::Right => (1.0, 0.0),
            Self::Up => (0.0, -1.0),
            Self::Down => (0.0, 1.0),
        }
    }
}

// ============================================================================
// Frames
// ============================================================================

/// Per-frame adjustment of one layer's visual state.
///
/// Translations are fractions of the container size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisualPatch {
    pub opacity: f64,
    pub translate_x: f64,
    pub translate_y: f64,
    pub reveal: f64,
    pub reveal_from: Option<Direction>,
}

impl Default for VisualPatch {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            translate_x: 0.0,
            translate_y: 0.0,
            reveal: 1.0,
            reveal_from: None,
        }
    }
}

impl VisualPatch {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// Layer `self` over a layer's resting state.
    pub fn apply_to(&self, base: &VisualState) -> VisualState {
        let mut state = base.clone();
        state.opacity = base.opacity * self.opacity;
        state.translate_x = base.translate_x + self.translate_x;
        state.translate_y = base.translate_y + self.translate_y;
        state.reveal = base.reveal * self.reveal;
        if let Some(from) = self.reveal_from {
            state
                .css
                .insert("reveal-origin".to_string(), from.as_str().to_string());
        }
        state
    }
}

/// Visual patches for both sides of a transition at one point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TransitionFrame {
    pub incoming: VisualPatch,
    pub outgoing: VisualPatch,
}

// ============================================================================
// Transition Trait
// ============================================================================

pub trait Transition: Send + Sync + Debug {
    /// Kind name as written in documents.
    fn kind(&self) -> &'static str;

    fn duration_ms(&self) -> u64;

    /// Frame at `progress` in `0.0..=1.0`.
    fn frame(&self, progress: f64) -> TransitionFrame;

    /// Frame at `elapsed_ms` into the transition.
    fn frame_at(&self, elapsed_ms: u64) -> TransitionFrame {
        match self.duration_ms() {
            0 => self.frame(1.0),
            d => self.frame(elapsed_ms as f64 / d as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fade {
    pub duration_ms: u64,
    pub easing: Easing,
}

impl Transition for Fade {
    fn kind(&self) -> &'static str {
        "fade"
    }

    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn frame(&self, progress: f64) -> TransitionFrame {
        let e = self.easing.apply(progress);
        TransitionFrame {
            incoming: VisualPatch {
                opacity: e,
                ..Default::default()
            },
            outgoing: VisualPatch {
                opacity: 1.0 - e,
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slide {
    pub duration_ms: u64,
    pub easing: Easing,
    pub direction: Direction,
}

impl Transition for Slide {
    fn kind(&self) -> &'static str {
        "slide"
    }

    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn frame(&self, progress: f64) -> TransitionFrame {
        let e = self.easing.apply(progress);
        let (dx, dy) = self.direction.vector();
        TransitionFrame {
            // Enters from the opposite edge and travels along the direction.
            incoming: VisualPatch {
                translate_x: -dx * (1.0 - e),
                translate_y: -dy * (1.0 - e),
                ..Default::default()
            },
            outgoing: VisualPatch {
                translate_x: dx * e,
                translate_y: dy * e,
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Wipe {
    pub duration_ms: u64,
    pub easing: Easing,
    pub direction: Direction,
}

impl Transition for Wipe {
    fn kind(&self) -> &'static str {
        "wipe"
    }

    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn frame(&self, progress: f64) -> TransitionFrame {
        let e = self.easing.apply(progress);
        TransitionFrame {
            incoming: VisualPatch {
                reveal: e,
                reveal_from: Some(self.direction),
                ..Default::default()
            },
            outgoing: VisualPatch::default(),
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Build a transition from its document form.
///
/// `null` means no transition. Unknown kinds, easings or directions fail
/// at construction time.
pub fn transition_from_json(value: &Value) -> Result<Option<Arc<dyn Transition>>> {
    let (kind, params) = match value {
        Value::Null => return Ok(None),
        Value::String(kind) => (kind.as_str(), None),
        Value::Object(map) => {
            let kind = map
                .get("type")
                .or_else(|| map.get("kind"))
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    PlaybackError::UnknownTransition("transition object has no type".to_string())
                })?;
            (kind, Some(map))
        }
        other => {
            return Err(PlaybackError::UnknownTransition(format!(
                "expected a string or object, got {other}"
            )))
        }
    };

    let kind = kind.trim().to_ascii_lowercase();
    if kind.is_empty() || kind == "none" {
        return Ok(None);
    }

    let text = |key: &str| params.and_then(|p| p.get(key)).and_then(Value::as_str);
    let duration_ms = match params.and_then(|p| p.get("duration")) {
        None | Some(Value::Null) => DEFAULT_TRANSITION_MS,
        Some(v) => v.as_u64().ok_or_else(|| {
            PlaybackError::UnknownTransition(format!(
                "transition duration must be a non-negative integer, got {v}"
            ))
        })?,
    };
    let easing = text("easing").map(Easing::parse).transpose()?.unwrap_or_default();
    let direction = text("direction")
        .or_else(|| text("dir"))
        .map(Direction::parse)
        .transpose()?
        .unwrap_or_default();

    let transition: Arc<dyn Transition> = match kind.as_str() {
        "fade" | "crossfade" => Arc::new(Fade {
            duration_ms,
            easing,
        }),
        "slide" | "push" => Arc::new(Slide {
            duration_ms,
            easing,
            direction,
        }),
        "wipe" | "reveal" => Arc::new(Wipe {
            duration_ms,
            easing,
            direction,
        }),
        other => {
            return Err(PlaybackError::UnknownTransition(format!(
                "unknown transition kind '{other}'"
            )))
        }
    };
    Ok(Some(transition))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALL: [Easing; 7] = [
        Easing::Linear,
        Easing::InQuad,
        Easing::OutQuad,
        Easing::InOutQuad,
        Easing::InCubic,
        Easing::OutCubic,
        Easing::InOutCubic,
    ];

    #[test]
    fn endpoints_are_stable() {
        for easing in ALL {
            assert_eq!(easing.apply(0.0), 0.0);
            assert_eq!(easing.apply(1.0), 1.0);
            assert!(easing.apply(0.25) < easing.apply(0.75));
        }
    }

    #[test]
    fn fade_crosses_over() {
        let fade = Fade {
            duration_ms: 1000,
            easing: Easing::Linear,
        };
        let mid = fade.frame_at(500);
        assert!((mid.incoming.opacity - 0.5).abs() < 1e-9);
        assert!((mid.outgoing.opacity - 0.5).abs() < 1e-9);
        assert!(fade.frame_at(1000).outgoing.opacity.abs() < 1e-9);
        assert!(fade.frame_at(5000).incoming.is_identity());
    }

    #[test]
    fn slide_enters_from_opposite_edge() {
        let slide = Slide {
            duration_ms: 400,
            easing: Easing::Linear,
            direction: Direction::Left,
        };
        let start = slide.frame(0.0);
        assert_eq!(start.incoming.translate_x, 1.0);
        assert_eq!(start.outgoing.translate_x, 0.0);
        let end = slide.frame(1.0);
        assert_eq!(end.incoming.translate_x, 0.0);
        assert_eq!(end.outgoing.translate_x, -1.0);
    }

    #[test]
    fn patch_applies_over_base_state() {
        let base = VisualState {
            opacity: 0.8,
            ..Default::default()
        };
        let wipe = Wipe {
            duration_ms: 100,
            easing: Easing::Linear,
            direction: Direction::Down,
        };
        let state = wipe.frame(0.5).incoming.apply_to(&base);
        assert!((state.opacity - 0.8).abs() < 1e-9);
        assert!((state.reveal - 0.5).abs() < 1e-9);
        assert_eq!(state.css.get("reveal-origin").map(String::as_str), Some("down"));
    }

    #[test]
    fn parses_document_forms() {
        assert!(transition_from_json(&Value::Null).unwrap().is_none());

        let fade = transition_from_json(&json!("Fade")).unwrap().unwrap();
        assert_eq!(fade.kind(), "fade");
        assert_eq!(fade.duration_ms(), DEFAULT_TRANSITION_MS);

        let slide = transition_from_json(&json!({
            "type": "slide", "duration": 800, "direction": "ttb", "easing": "ease-out"
        }))
        .unwrap()
        .unwrap();
        assert_eq!(slide.kind(), "slide");
        assert_eq!(slide.duration_ms(), 800);
    }

    #[test]
    fn rejects_unknown_kinds() {
        let err = transition_from_json(&json!({ "type": "spiral" })).unwrap_err();
        assert!(err.is_construction_error());
        assert!(transition_from_json(&json!({ "type": "fade", "easing": "bouncy" })).is_err());
        assert!(transition_from_json(&json!({ "type": "wipe", "duration": -5 })).is_err());
    }
}
