//! Image carousel: a fixed sequence of slides, one every `imageDuration`.
//!
//! All slides load concurrently. Slides whose asset failed are skipped: the
//! carousel shows the next slide that loaded, wrapping around.

use super::{MountPoint, Presentation, WidgetDeps};
use crate::assets::AssetSlot;
use crate::error::{PlaybackError, Result};
use crate::traits::{
    ready_duration, DurationFuture, Playable, PlaySignal, PlayStream, SeekResult, ShowOutcome,
    Surface, TickStream,
};
use async_trait::async_trait;
use bridge_traits::NodeContent;
use futures::future;
use futures::StreamExt;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{instrument, warn};

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CarouselOptions {
    #[serde(default)]
    pub images: Vec<CarouselImage>,
    #[serde(default = "default_image_duration")]
    pub image_duration: u64,
    #[serde(default)]
    pub fit: Option<String>,
}

/// A slide given either as a bare URI or as `{ "uri": ... }`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CarouselImage {
    Uri(String),
    Object {
        #[serde(alias = "src", alias = "url")]
        uri: String,
    },
}

impl CarouselImage {
    pub fn uri(&self) -> &str {
        match self {
            CarouselImage::Uri(uri) | CarouselImage::Object { uri } => uri,
        }
    }
}

fn default_image_duration() -> u64 {
    5000
}

pub struct ImageCarousel {
    name: String,
    presentation: Presentation,
    slots: Vec<AssetSlot>,
    image_duration: u64,
    fit: Option<String>,
    duration: DurationFuture,
    slide: AtomicUsize,
    mount: MountPoint,
}

impl ImageCarousel {
    pub fn new(
        name: impl Into<String>,
        opts: CarouselOptions,
        presentation: Presentation,
        deps: &WidgetDeps,
    ) -> Self {
        let slots: Vec<AssetSlot> = opts
            .images
            .iter()
            .map(|image| AssetSlot::new(image.uri(), Arc::clone(&deps.resources)))
            .collect();
        Self {
            name: name.into(),
            presentation,
            duration: ready_duration((slots.len() as u64).saturating_mul(opts.image_duration)),
            slots,
            image_duration: opts.image_duration,
            fit: opts.fit,
            slide: AtomicUsize::new(0),
            mount: MountPoint::default(),
        }
    }

    pub fn slide_at(&self, offset_ms: u64) -> usize {
        if self.slots.is_empty() || self.image_duration == 0 {
            return 0;
        }
        ((offset_ms / self.image_duration) as usize).min(self.slots.len() - 1)
    }

    /// First loaded slide at or after `index`, wrapping around.
    fn available_from(&self, index: usize) -> Option<(usize, String)> {
        let n = self.slots.len();
        (0..n)
            .map(|k| (index + k) % n)
            .find_map(|i| self.slots[i].url().map(|url| (i, url)))
    }

    async fn mount_slide(&self, surface: &Surface, index: usize) -> std::result::Result<usize, String> {
        let (shown, url) = self
            .available_from(index)
            .ok_or_else(|| "no slide could be loaded".to_string())?;
        let node = self.presentation.node(NodeContent::Image {
            url,
            fit: self.fit.clone(),
        });
        surface
            .renderer
            .mount(&surface.container, node)
            .await
            .map_err(|e| e.to_string())?;
        Ok(shown)
    }

    async fn advance_to(&self, elapsed_ms: u64) -> PlaySignal {
        let target = self.slide_at(elapsed_ms);
        if self.slide.swap(target, Ordering::SeqCst) == target {
            return PlaySignal::Progress(elapsed_ms);
        }
        if let Some(surface) = self.mount.get() {
            if let Err(message) = self.mount_slide(&surface, target).await {
                warn!(widget = %self.name, slide = target, error = %message, "Slide failed to mount");
            }
        }
        PlaySignal::Internal(target as u64)
    }
}

#[async_trait]
impl Playable for ImageCarousel {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(widget = %self.name, slides = self.slots.len()))]
    async fn load(&self) -> Result<()> {
        if self.slots.is_empty() {
            return Ok(());
        }
        let results = future::join_all(self.slots.iter().map(|slot| slot.acquire())).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(failed, total = results.len(), "Some slides failed to load");
        }
        if failed < results.len() {
            return Ok(());
        }
        match results.into_iter().find_map(|r| r.err()) {
            Some(e) => Err(e),
            None => Err(PlaybackError::Internal("carousel load failed".into())),
        }
    }

    fn unload(&self) {
        self.slots.iter().for_each(|slot| slot.release());
    }

    fn duration(&self) -> DurationFuture {
        self.duration.clone()
    }

    fn play(self: Arc<Self>, clock: TickStream) -> PlayStream {
        clock
            .then(move |tick| {
                let carousel = Arc::clone(&self);
                async move { carousel.advance_to(tick.elapsed_ms).await }
            })
            .boxed()
    }

    fn stop(&self) {}

    fn seek(&self, offset_ms: u64) -> SeekResult {
        let total = (self.slots.len() as u64).saturating_mul(self.image_duration);
        let offset_ms = offset_ms.min(total);
        let slide = self.slide_at(offset_ms);
        SeekResult::new(offset_ms, slide as u64)
    }

    async fn show(&self, surface: &Surface, offset_ms: u64) -> ShowOutcome {
        if let Err(e) = self.load().await {
            return ShowOutcome::Error(e.to_string());
        }
        let target = self.slide_at(offset_ms);
        match self.mount_slide(surface, target).await {
            Ok(_) => {
                self.slide.store(target, Ordering::SeqCst);
                self.mount.set(surface.clone());
                ShowOutcome::Shown
            }
            Err(message) => ShowOutcome::Error(message),
        }
    }

    fn hide(&self) {
        self.mount.clear();
    }
}
