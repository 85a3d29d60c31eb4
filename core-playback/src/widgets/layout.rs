//! Layout: like a group, but every child gets its own styled region.
//!
//! Child `i` is mounted into `region-{i}/content`; `region-{i}` carries the
//! style from `opts.regions[i]`.

use super::{load_all, show_all, MountPoint, Presentation};
use crate::error::Result;
use crate::traits::{
    combine_durations, fan_out, max_of, DurationFuture, Playable, PlayStream, SeekResult,
    ShowOutcome, Surface, TickStream,
};
use async_trait::async_trait;
use bridge_traits::{NodeContent, RenderNode};
use futures::future;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LayoutOptions {
    #[serde(default)]
    pub regions: Vec<Map<String, Value>>,
}

pub struct Layout {
    name: String,
    presentation: Presentation,
    regions: Vec<Map<String, Value>>,
    children: Vec<Arc<dyn Playable>>,
    duration: DurationFuture,
    mount: MountPoint,
}

impl Layout {
    pub fn new(
        name: impl Into<String>,
        opts: LayoutOptions,
        presentation: Presentation,
        children: Vec<Arc<dyn Playable>>,
    ) -> Self {
        let duration = combine_durations(children.iter().map(|c| c.duration()).collect(), max_of);
        Self {
            name: name.into(),
            presentation,
            regions: opts.regions,
            children,
            duration,
            mount: MountPoint::default(),
        }
    }

    fn region_node(&self, index: usize) -> RenderNode {
        let style = self.regions.get(index).cloned().unwrap_or_default();
        RenderNode::new(NodeContent::Region).with_style(style)
    }
}

#[async_trait]
impl Playable for Layout {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(widget = %self.name, regions = self.children.len()))]
    async fn load(&self) -> Result<()> {
        load_all(&self.children).await
    }

    fn unload(&self) {
        self.children.iter().for_each(|c| c.unload());
    }

    fn duration(&self) -> DurationFuture {
        self.duration.clone()
    }

    fn play(self: Arc<Self>, clock: TickStream) -> PlayStream {
        fan_out(clock, &self.children)
    }

    fn stop(&self) {
        self.children.iter().for_each(|c| c.stop());
    }

    fn seek(&self, offset_ms: u64) -> SeekResult {
        for child in &self.children {
            child.seek(offset_ms);
        }
        SeekResult::new(offset_ms, 0)
    }

    async fn show(&self, surface: &Surface, offset_ms: u64) -> ShowOutcome {
        let root = self.presentation.node(NodeContent::Region);
        if let Err(e) = surface.renderer.mount(&surface.container, root).await {
            return ShowOutcome::Error(e.to_string());
        }
        self.mount.set(surface.clone());

        let regions: Vec<Surface> = (0..self.children.len())
            .map(|i| surface.child(format!("region-{i}")))
            .collect();
        let mounted = future::join_all(regions.iter().enumerate().map(|(i, region)| {
            region
                .renderer
                .mount(&region.container, self.region_node(i))
        }))
        .await;
        if let Some(Err(e)) = mounted.into_iter().find(|r| r.is_err()) {
            return ShowOutcome::Error(e.to_string());
        }

        let contents = regions.iter().map(|r| r.child("content")).collect();
        show_all(&self.children, contents, offset_ms).await
    }

    fn hide(&self) {
        self.children.iter().for_each(|c| c.hide());
        if let Some(surface) = self.mount.get() {
            for i in 0..self.children.len() {
                surface
                    .renderer
                    .unmount(&surface.container.child(format!("region-{i}")));
            }
        }
        self.mount.clear();
    }
}
