//! Video widget.
//!
//! Without an explicit `duration` the length comes from probing the resolved
//! media, bounded by the metadata timeout. Probing failures fall back to the
//! configured default instead of leaving the duration pending.

use super::{MountPoint, Presentation, WidgetDeps};
use crate::assets::AssetSlot;
use crate::error::Result;
use crate::traits::{
    lazy_duration, leaf_play, peek_duration, ready_duration, DurationFuture, Playable,
    PlayStream, SeekResult, ShowOutcome, Surface, TickStream,
};
use async_trait::async_trait;
use bridge_traits::{MediaCommand, NodeContent};
use core_async::time::timeout;
use core_runtime::logging::redact_uri;
use futures::StreamExt;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoOptions {
    #[serde(alias = "src", alias = "url")]
    pub uri: String,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default = "default_muted")]
    pub muted: bool,
    #[serde(default, rename = "loop")]
    pub looped: bool,
}

fn default_muted() -> bool {
    true
}

pub struct VideoWidget {
    name: String,
    opts: VideoOptions,
    presentation: Presentation,
    slot: AssetSlot,
    duration: DurationFuture,
    mount: MountPoint,
    /// Transport is running on the renderer side.
    playing: AtomicBool,
}

impl VideoWidget {
    pub fn new(
        name: impl Into<String>,
        opts: VideoOptions,
        presentation: Presentation,
        deps: &WidgetDeps,
    ) -> Self {
        let name = name.into();
        let slot = AssetSlot::new(opts.uri.clone(), Arc::clone(&deps.resources));
        let duration = match opts.duration {
            Some(ms) => ready_duration(ms),
            None => probed_duration(&name, &slot, deps),
        };
        Self {
            name,
            opts,
            presentation,
            slot,
            duration,
            mount: MountPoint::default(),
            playing: AtomicBool::new(false),
        }
    }

    fn command(&self, command: MediaCommand) {
        if let Some(surface) = self.mount.get() {
            if let Err(e) = surface.renderer.control_media(&surface.container, command) {
                warn!(widget = %self.name, error = %e, "Video transport command failed");
            }
        }
    }

    fn on_tick(&self, elapsed_ms: u64) {
        if !self.playing.swap(true, Ordering::SeqCst) {
            self.command(MediaCommand::Play {
                offset_ms: elapsed_ms,
            });
        }
    }
}

fn probed_duration(name: &str, slot: &AssetSlot, deps: &WidgetDeps) -> DurationFuture {
    let name = name.to_string();
    let slot = slot.clone();
    let probe = Arc::clone(&deps.probe);
    let limit = deps.config.metadata_timeout();
    let fallback = deps.config.default_item_duration_ms;
    lazy_duration(async move {
        let probed = timeout(limit, async {
            let url = slot.acquire().await.ok()?;
            probe.probe(&url).await.ok()?.duration_ms
        })
        .await;
        match probed {
            Ok(Some(ms)) => ms,
            Ok(None) => {
                debug!(widget = %name, fallback, "Video duration unknown");
                fallback
            }
            Err(_) => {
                warn!(widget = %name, fallback, "Timed out probing video duration");
                fallback
            }
        }
    })
}

#[async_trait]
impl Playable for VideoWidget {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(widget = %self.name, uri = redact_uri(&self.opts.uri)))]
    async fn load(&self) -> Result<()> {
        self.slot.acquire().await?;
        Ok(())
    }

    fn unload(&self) {
        self.slot.release();
    }

    fn duration(&self) -> DurationFuture {
        self.duration.clone()
    }

    fn play(self: Arc<Self>, clock: TickStream) -> PlayStream {
        self.playing.store(false, Ordering::SeqCst);
        let this = Arc::clone(&self);
        let clock = clock.inspect(move |tick| this.on_tick(tick.elapsed_ms)).boxed();
        leaf_play(clock, self.duration.clone())
    }

    fn stop(&self) {
        if self.playing.swap(false, Ordering::SeqCst) {
            self.command(MediaCommand::Pause);
        }
    }

    fn seek(&self, offset_ms: u64) -> SeekResult {
        let offset_ms = match peek_duration(&self.duration) {
            Some(end) if end > 0 => offset_ms.min(end),
            _ => offset_ms,
        };
        self.playing.store(false, Ordering::SeqCst);
        self.command(MediaCommand::Seek { offset_ms });
        SeekResult::new(offset_ms, 0)
    }

    async fn show(&self, surface: &Surface, offset_ms: u64) -> ShowOutcome {
        let url = match self.slot.acquire().await {
            Ok(url) => url,
            Err(e) => return ShowOutcome::Error(e.to_string()),
        };
        let node = self.presentation.node(NodeContent::Video {
            url,
            muted: self.opts.muted,
            looped: self.opts.looped,
        });
        if let Err(e) = surface.renderer.mount(&surface.container, node).await {
            return ShowOutcome::Error(e.to_string());
        }
        self.mount.set(surface.clone());
        if offset_ms > 0 {
            self.command(MediaCommand::Seek { offset_ms });
        }
        ShowOutcome::Shown
    }

    fn hide(&self) {
        self.stop();
        self.mount.clear();
    }
}
