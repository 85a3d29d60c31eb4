//! List: one child per bound item, shown a page at a time.
//!
//! The factory expands the item template once per entry of `opts.items`, so
//! by the time a `List` is built its children are concrete widgets. Pages
//! turn every `pageDuration` milliseconds; the children of the visible page
//! receive page-local ticks and restart on every turn.

use super::{load_all, show_all, MountPoint, Presentation};
use crate::error::Result;
use crate::traits::{
    ready_duration, ChildClocks, DurationFuture, Playable, PlaySignal, PlayStream, SeekResult,
    ShowOutcome, Surface, Tick, TickStream,
};
use async_trait::async_trait;
use bridge_traits::NodeContent;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    /// Items to iterate; usually a binding such as `{{ menu.items }}`.
    #[serde(default)]
    pub items: Value,
    /// Name each item is bound to in its child's context.
    #[serde(default = "default_item_name", rename = "as")]
    pub item_name: String,
    /// Name the zero-based item index is bound to.
    #[serde(default = "default_index_name", rename = "index")]
    pub index_name: String,
    #[serde(default = "default_items_per_page")]
    pub items_per_page: usize,
    #[serde(default = "default_page_duration")]
    pub page_duration: u64,
}

fn default_item_name() -> String {
    "item".to_string()
}

fn default_index_name() -> String {
    "index".to_string()
}

fn default_items_per_page() -> usize {
    1
}

fn default_page_duration() -> u64 {
    5000
}

pub struct List {
    name: String,
    presentation: Presentation,
    children: Vec<Arc<dyn Playable>>,
    per_page: usize,
    page_duration: u64,
    pages: usize,
    duration: DurationFuture,
    page: AtomicUsize,
    mount: MountPoint,
}

enum Wake {
    Tick(Option<Tick>),
    Child,
}

struct Paging {
    clock: TickStream,
    kids: ChildClocks,
    page: usize,
    pending: Option<PlaySignal>,
}

impl List {
    pub fn new(
        name: impl Into<String>,
        opts: ListOptions,
        presentation: Presentation,
        children: Vec<Arc<dyn Playable>>,
    ) -> Self {
        let per_page = opts.items_per_page.max(1);
        let pages = children.len().div_ceil(per_page);
        Self {
            name: name.into(),
            presentation,
            per_page,
            page_duration: opts.page_duration,
            pages,
            duration: ready_duration((pages as u64).saturating_mul(opts.page_duration)),
            children,
            page: AtomicUsize::new(0),
            mount: MountPoint::default(),
        }
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn page_at(&self, offset_ms: u64) -> usize {
        if self.pages == 0 || self.page_duration == 0 {
            return 0;
        }
        ((offset_ms / self.page_duration) as usize).min(self.pages - 1)
    }

    fn page_start(&self, page: usize) -> u64 {
        (page as u64).saturating_mul(self.page_duration)
    }

    fn page_children(&self, page: usize) -> &[Arc<dyn Playable>] {
        let start = (page * self.per_page).min(self.children.len());
        let end = (start + self.per_page).min(self.children.len());
        &self.children[start..end]
    }

    async fn show_page(&self, surface: &Surface, page: usize, local_ms: u64) -> ShowOutcome {
        let kids = self.page_children(page);
        let surfaces = (0..kids.len())
            .map(|j| surface.child(format!("item-{j}")))
            .collect();
        show_all(kids, surfaces, local_ms).await
    }

    async fn turn_page(&self, from: usize, to: usize) {
        debug!(widget = %self.name, from, to, "Turning page");
        self.page_children(from).iter().for_each(|c| c.hide());
        self.page.store(to, Ordering::SeqCst);
        if let Some(surface) = self.mount.get() {
            for kid in self.page_children(to) {
                kid.seek(0);
            }
            if let ShowOutcome::Error(message) = self.show_page(&surface, to, 0).await {
                debug!(widget = %self.name, page = to, error = %message, "Page failed to show");
            }
        }
    }
}

#[async_trait]
impl Playable for List {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(widget = %self.name, items = self.children.len()))]
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
        let page = self.page.load(Ordering::SeqCst);
        let paging = Paging {
            clock,
            kids: ChildClocks::start(self.page_children(page)),
            page,
            pending: None,
        };
        stream::unfold(Some(paging), move |state| {
            let list = Arc::clone(&self);
            async move {
                let mut s = state?;
                if let Some(signal) = s.pending.take() {
                    return Some((signal, Some(s)));
                }
                loop {
                    let wake = core_async::select! {
                        tick = s.clock.next() => Wake::Tick(tick),
                        _ = s.kids.next_signal() => Wake::Child,
                    };
                    let tick = match wake {
                        Wake::Tick(Some(tick)) => tick,
                        Wake::Tick(None) => return Some((PlaySignal::Ended, None)),
                        // Item-level progress is not surfaced above the page.
                        Wake::Child => continue,
                    };

                    let page = list.page_at(tick.elapsed_ms);
                    let local = tick.elapsed_ms.saturating_sub(list.page_start(page));
                    if page != s.page {
                        list.turn_page(s.page, page).await;
                        s.kids.restart(list.page_children(page));
                        s.kids.forward(Tick::at(local));
                        s.page = page;
                        s.pending = Some(PlaySignal::Progress(tick.elapsed_ms));
                        return Some((PlaySignal::Internal(page as u64), Some(s)));
                    }
                    s.kids.forward(Tick::at(local));
                    return Some((PlaySignal::Progress(tick.elapsed_ms), Some(s)));
                }
            }
        })
        .boxed()
    }

    fn stop(&self) {
        self.children.iter().for_each(|c| c.stop());
    }

    fn seek(&self, offset_ms: u64) -> SeekResult {
        let total = (self.pages as u64).saturating_mul(self.page_duration);
        let offset_ms = offset_ms.min(total);
        let page = self.page_at(offset_ms);
        let local = offset_ms.saturating_sub(self.page_start(page));
        for kid in self.page_children(page) {
            kid.seek(local);
        }
        SeekResult::new(offset_ms, page as u64)
    }

    async fn show(&self, surface: &Surface, offset_ms: u64) -> ShowOutcome {
        let region = self.presentation.node(NodeContent::Region);
        if let Err(e) = surface.renderer.mount(&surface.container, region).await {
            return ShowOutcome::Error(e.to_string());
        }
        self.mount.set(surface.clone());
        let page = self.page_at(offset_ms);
        self.page.store(page, Ordering::SeqCst);
        let local = offset_ms.saturating_sub(self.page_start(page));
        self.show_page(surface, page, local).await
    }

    fn hide(&self) {
        self.children.iter().for_each(|c| c.hide());
        self.mount.clear();
    }
}
