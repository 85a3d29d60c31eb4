//! Group: children overlap in time and share the parent's region.

use super::{load_all, show_all, MountPoint, Presentation};
use crate::error::Result;
use crate::traits::{
    combine_durations, fan_out, max_of, DurationFuture, Playable, PlayStream, SeekResult,
    ShowOutcome, Surface, TickStream,
};
use async_trait::async_trait;
use bridge_traits::NodeContent;
use std::sync::Arc;
use tracing::instrument;

pub struct Group {
    name: String,
    presentation: Presentation,
    children: Vec<Arc<dyn Playable>>,
    duration: DurationFuture,
    mount: MountPoint,
}

impl Group {
    pub fn new(
        name: impl Into<String>,
        presentation: Presentation,
        children: Vec<Arc<dyn Playable>>,
    ) -> Self {
        let duration = combine_durations(children.iter().map(|c| c.duration()).collect(), max_of);
        Self {
            name: name.into(),
            presentation,
            children,
            duration,
            mount: MountPoint::default(),
        }
    }

    pub fn children(&self) -> &[Arc<dyn Playable>] {
        &self.children
    }
}

#[async_trait]
impl Playable for Group {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(widget = %self.name, children = self.children.len()))]
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
        let region = self.presentation.node(NodeContent::Region);
        if let Err(e) = surface.renderer.mount(&surface.container, region).await {
            return ShowOutcome::Error(e.to_string());
        }
        self.mount.set(surface.clone());
        let surfaces = (0..self.children.len())
            .map(|i| surface.child(format!("child-{i}")))
            .collect();
        show_all(&self.children, surfaces, offset_ms).await
    }

    fn hide(&self) {
        self.children.iter().for_each(|c| c.hide());
        self.mount.clear();
    }
}
