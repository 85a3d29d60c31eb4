//! Text widget with an optional custom font face.

use super::{MountPoint, Presentation, WidgetDeps};
use crate::assets::FontRegistry;
use crate::error::Result;
use crate::traits::{
    leaf_play, peek_duration, ready_duration, DurationFuture, Playable, PlayStream, SeekResult,
    ShowOutcome, Surface, TickStream,
};
use async_trait::async_trait;
use bridge_traits::{FontFace, NodeContent};
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{instrument, warn};

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextOptions {
    /// Any JSON value; non-strings are rendered with their JSON text.
    #[serde(default)]
    pub text: Value,
    #[serde(default)]
    pub font: Option<FontOptions>,
    #[serde(default)]
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FontOptions {
    pub family: String,
    #[serde(alias = "src", alias = "url")]
    pub uri: String,
}

pub struct TextWidget {
    name: String,
    text: String,
    face: Option<FontFace>,
    presentation: Presentation,
    fonts: Arc<FontRegistry>,
    font_held: AtomicBool,
    duration: DurationFuture,
    mount: MountPoint,
}

impl TextWidget {
    pub fn new(
        name: impl Into<String>,
        opts: TextOptions,
        presentation: Presentation,
        deps: &WidgetDeps,
    ) -> Self {
        let text = match &opts.text {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        Self {
            name: name.into(),
            text,
            face: opts.font.map(|f| FontFace::new(f.family, f.uri)),
            presentation,
            fonts: Arc::clone(&deps.fonts),
            font_held: AtomicBool::new(false),
            duration: ready_duration(opts.duration.unwrap_or(deps.config.default_text_duration_ms)),
            mount: MountPoint::default(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[async_trait]
impl Playable for TextWidget {
    fn name(&self) -> &str {
        &self.name
    }

    /// Text always loads; a font that fails to load falls back to the
    /// renderer's default face.
    #[instrument(skip(self), fields(widget = %self.name))]
    async fn load(&self) -> Result<()> {
        let Some(face) = &self.face else {
            return Ok(());
        };
        if self.font_held.load(Ordering::SeqCst) {
            return Ok(());
        }
        match self.fonts.acquire(face).await {
            Ok(()) => {
                // A concurrent load already holds a reference.
                if self.font_held.swap(true, Ordering::SeqCst) {
                    self.fonts.release(face);
                }
            }
            Err(e) => warn!(family = %face.family, error = %e, "Using fallback font"),
        }
        Ok(())
    }

    fn unload(&self) {
        if let Some(face) = &self.face {
            if self.font_held.swap(false, Ordering::SeqCst) {
                self.fonts.release(face);
            }
        }
    }

    fn duration(&self) -> DurationFuture {
        self.duration.clone()
    }

    fn play(self: Arc<Self>, clock: TickStream) -> PlayStream {
        leaf_play(clock, self.duration.clone())
    }

    fn stop(&self) {}

    fn seek(&self, offset_ms: u64) -> SeekResult {
        let end = peek_duration(&self.duration).unwrap_or(offset_ms);
        SeekResult::new(offset_ms.min(end), 0)
    }

    async fn show(&self, surface: &Surface, _offset_ms: u64) -> ShowOutcome {
        let font_family = self
            .face
            .as_ref()
            .filter(|_| self.font_held.load(Ordering::SeqCst))
            .map(|f| f.family.clone());
        let node = self.presentation.node(NodeContent::Text {
            text: self.text.clone(),
            font_family,
        });
        if let Err(e) = surface.renderer.mount(&surface.container, node).await {
            return ShowOutcome::Error(e.to_string());
        }
        self.mount.set(surface.clone());
        ShowOutcome::Shown
    }

    fn hide(&self) {
        self.mount.clear();
    }
}
