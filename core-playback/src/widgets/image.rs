//! Still image widget.

use super::{MountPoint, Presentation, WidgetDeps};
use crate::assets::AssetSlot;
use crate::error::Result;
use crate::traits::{
    leaf_play, peek_duration, ready_duration, DurationFuture, Playable, PlayStream, SeekResult,
    ShowOutcome, Surface, TickStream,
};
use async_trait::async_trait;
use bridge_traits::NodeContent;
use core_runtime::logging::redact_uri;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageOptions {
    #[serde(alias = "src", alias = "url")]
    pub uri: String,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub fit: Option<String>,
}

pub struct ImageWidget {
    name: String,
    opts: ImageOptions,
    presentation: Presentation,
    slot: AssetSlot,
    duration: DurationFuture,
    mount: MountPoint,
}

impl ImageWidget {
    pub fn new(
        name: impl Into<String>,
        opts: ImageOptions,
        presentation: Presentation,
        deps: &WidgetDeps,
    ) -> Self {
        let duration = ready_duration(
            opts.duration
                .unwrap_or(deps.config.default_image_duration_ms),
        );
        Self {
            name: name.into(),
            slot: AssetSlot::new(opts.uri.clone(), Arc::clone(&deps.resources)),
            opts,
            presentation,
            duration,
            mount: MountPoint::default(),
        }
    }

    pub fn options(&self) -> &ImageOptions {
        &self.opts
    }
}

#[async_trait]
impl Playable for ImageWidget {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(widget = %self.name, uri = redact_uri(&self.opts.uri)))]
    async fn load(&self) -> Result<()> {
        self.slot.acquire().await?;
        debug!("Image ready");
        Ok(())
    }

    fn unload(&self) {
        self.slot.release();
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
        let url = match self.slot.acquire().await {
            Ok(url) => url,
            Err(e) => return ShowOutcome::Error(e.to_string()),
        };
        let node = self.presentation.node(NodeContent::Image {
            url,
            fit: self.opts.fit.clone(),
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
