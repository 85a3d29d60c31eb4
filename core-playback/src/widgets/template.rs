//! Nested template: a whole widget tree behind a single playable.

use crate::error::Result;
use crate::traits::{
    DurationFuture, Playable, PlayStream, SeekResult, ShowOutcome, Surface, TickStream,
};
use async_trait::async_trait;
use std::sync::Arc;

pub struct TemplateWidget {
    name: String,
    root: Arc<dyn Playable>,
}

impl TemplateWidget {
    pub fn new(name: impl Into<String>, root: Arc<dyn Playable>) -> Self {
        Self {
            name: name.into(),
            root,
        }
    }

    pub fn root(&self) -> &Arc<dyn Playable> {
        &self.root
    }
}

#[async_trait]
impl Playable for TemplateWidget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<()> {
        self.root.load().await
    }

    fn unload(&self) {
        self.root.unload();
    }

    fn duration(&self) -> DurationFuture {
        self.root.duration()
    }

    fn play(self: Arc<Self>, clock: TickStream) -> PlayStream {
        Arc::clone(&self.root).play(clock)
    }

    fn stop(&self) {
        self.root.stop();
    }

    fn seek(&self, offset_ms: u64) -> SeekResult {
        self.root.seek(offset_ms)
    }

    async fn show(&self, surface: &Surface, offset_ms: u64) -> ShowOutcome {
        self.root.show(surface, offset_ms).await
    }

    fn hide(&self) {
        self.root.hide();
    }
}
