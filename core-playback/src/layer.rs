//! # Layer
//!
//! A layer is the unit the timeline schedules: one widget (or none), an
//! optional transition, and the visual overrides applied while it is on
//! screen.
//!
//! ## Duration
//!
//! - fixed `duration` configured: `fixed + transition`, the widget is not asked
//! - no widget: `slack + transition`
//! - otherwise: `widget + slack + transition`, where a widget that never
//!   reports a duration is treated as zero after `duration_resolve_timeout_ms`
//!
//! ## Error Containment
//!
//! `show()` never propagates widget failures, panics included. They are
//! logged with the layer id, widget name and an option summary and turned
//! into [`ShowOutcome::Error`].

use crate::config::PlaybackConfig;
use crate::context::TemplateContext;
use crate::error::{PlaybackError, Result};
use crate::traits::{
    fan_out, lazy_duration, peek_duration, ready_duration, DurationFuture, Playable, PlaySignal,
    PlayStream, SeekResult, ShowOutcome, Surface, TickStream,
};
use crate::transition::{transition_from_json, Transition, VisualPatch};
use crate::tree::WidgetTree;
use crate::widgets::WidgetDeps;
use async_trait::async_trait;
use bridge_traits::VisualState;
use core_async::sync::OperationGate;
use core_async::time::{timeout, Duration};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, instrument, warn};

const SUMMARY_LIMIT: usize = 160;

/// Document form of a playlist item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LayerSpec {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub widget_id: Option<String>,
    /// Fixed duration in milliseconds; overrides the widget's own length.
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub slack: u64,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub z_index: i32,
    #[serde(default)]
    pub css: BTreeMap<String, String>,
    #[serde(default)]
    pub transition: Value,
    #[serde(default)]
    pub widget: Option<Value>,
    /// Extra bindings for this item's widget tree.
    #[serde(default)]
    pub context: Map<String, Value>,
}

fn default_opacity() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerStatus {
    NotReady,
    Ready,
    Error,
}

pub struct Layer {
    id: String,
    widget_id: Option<String>,
    base: VisualState,
    slack: u64,
    fixed: Option<u64>,
    transition: Option<Arc<dyn Transition>>,
    widget: Option<Arc<dyn Playable>>,
    summary: String,
    resolve_timeout: Duration,
    status: Mutex<LayerStatus>,
    offset: AtomicU64,
    surface: Mutex<Option<Surface>>,
    gate: OperationGate,
    duration: OnceLock<DurationFuture>,
}

impl Layer {
    /// A layer around `widget`; a missing id gets a generated one.
    pub fn new(id: Option<String>, widget: Option<Arc<dyn Playable>>) -> Self {
        Self {
            id: id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            widget_id: None,
            base: VisualState::default(),
            slack: 0,
            fixed: None,
            transition: None,
            widget,
            summary: String::new(),
            resolve_timeout: PlaybackConfig::default().duration_resolve_timeout(),
            status: Mutex::new(LayerStatus::NotReady),
            offset: AtomicU64::new(0),
            surface: Mutex::new(None),
            gate: OperationGate::new(),
            duration: OnceLock::new(),
        }
    }

    pub fn with_slack(mut self, slack_ms: u64) -> Self {
        self.slack = slack_ms;
        self
    }

    pub fn with_fixed_duration(mut self, duration_ms: Option<u64>) -> Self {
        self.fixed = duration_ms;
        self
    }

    pub fn with_transition(mut self, transition: Option<Arc<dyn Transition>>) -> Self {
        self.transition = transition;
        self
    }

    pub fn with_visual(mut self, base: VisualState) -> Self {
        self.base = base;
        self
    }

    pub fn with_widget_id(mut self, widget_id: Option<String>) -> Self {
        self.widget_id = widget_id;
        self
    }

    pub fn with_resolve_timeout(mut self, limit: Duration) -> Self {
        self.resolve_timeout = limit;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Build a layer from one playlist item.
    ///
    /// The item is either a layer object with a nested `widget`, or a widget
    /// node that carries the layer fields itself.
    pub fn from_json(
        item: &Value,
        index: usize,
        ctx: &TemplateContext,
        deps: &WidgetDeps,
    ) -> Result<Self> {
        let path = format!("$.items[{index}]");
        let spec: LayerSpec = serde_json::from_value(item.clone())
            .map_err(|e| PlaybackError::MalformedDocument(format!("{path}: {e}")))?;
        let transition = transition_from_json(&spec.transition)?;

        let (widget_doc, widget_path) = match &spec.widget {
            Some(doc) => (Some(doc), format!("{path}.widget")),
            None if item.get("type").is_some() => (Some(item), path.clone()),
            None => (None, path.clone()),
        };
        let widget = widget_doc
            .map(|doc| {
                let scope = ctx.merged(&spec.context);
                WidgetTree::build_at(doc, &scope, deps, &widget_path).map(|tree| tree.root())
            })
            .transpose()?;
        let summary = widget_doc.map(summarize).unwrap_or_default();

        let base = VisualState {
            opacity: spec.opacity,
            rotation: spec.rotation,
            z_index: spec.z_index,
            css: spec.css,
            ..VisualState::default()
        };

        Ok(Layer::new(spec.id, widget)
            .with_widget_id(spec.widget_id)
            .with_slack(spec.slack)
            .with_fixed_duration(spec.duration)
            .with_transition(transition)
            .with_visual(base)
            .with_resolve_timeout(deps.config.duration_resolve_timeout())
            .with_summary(summary))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn widget_id(&self) -> Option<&str> {
        self.widget_id.as_deref()
    }

    pub fn widget(&self) -> Option<&Arc<dyn Playable>> {
        self.widget.as_ref()
    }

    pub fn status(&self) -> LayerStatus {
        *self.status.lock()
    }

    pub fn slack(&self) -> u64 {
        self.slack
    }

    pub fn fixed_duration(&self) -> Option<u64> {
        self.fixed
    }

    pub fn transition(&self) -> Option<&Arc<dyn Transition>> {
        self.transition.as_ref()
    }

    pub fn transition_ms(&self) -> u64 {
        self.transition.as_ref().map(|t| t.duration_ms()).unwrap_or(0)
    }

    /// Last offset passed to `seek` or `show`.
    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::SeqCst)
    }

    pub fn base_visual(&self) -> &VisualState {
        &self.base
    }

    /// Effective duration, if already resolved.
    pub fn resolved_duration(&self) -> Option<u64> {
        peek_duration(&self.duration())
    }

    pub fn is_mounted(&self) -> bool {
        self.surface.lock().is_some()
    }

    /// Render one transition frame over the layer's resting visual state.
    pub fn apply_patch(&self, patch: &VisualPatch) {
        let Some(surface) = self.surface.lock().clone() else {
            return;
        };
        let state = patch.apply_to(&self.base);
        if let Err(e) = surface.renderer.apply_visual(&surface.container, &state) {
            debug!(layer = %self.id, error = %e, "Failed to apply transition frame");
        }
    }

    fn compute_duration(&self) -> DurationFuture {
        let transition_ms = self.transition_ms();
        if let Some(fixed) = self.fixed {
            return ready_duration(fixed.saturating_add(transition_ms).max(self.slack));
        }
        let pad = self.slack.saturating_add(transition_ms);
        let Some(widget) = &self.widget else {
            return ready_duration(pad);
        };
        let inner = widget.duration();
        if let Some(ms) = peek_duration(&inner) {
            return ready_duration(ms.saturating_add(pad));
        }
        let limit = self.resolve_timeout;
        let id = self.id.clone();
        lazy_duration(async move {
            match timeout(limit, inner).await {
                Ok(ms) => ms.saturating_add(pad),
                Err(_) => {
                    warn!(layer = %id, "Widget duration did not resolve; treating it as zero");
                    pad
                }
            }
        })
    }

    fn set_status(&self, status: LayerStatus) {
        *self.status.lock() = status;
    }
}

#[async_trait]
impl Playable for Layer {
    fn name(&self) -> &str {
        match &self.widget {
            Some(widget) => widget.name(),
            None => &self.id,
        }
    }

    #[instrument(skip(self), fields(layer = %self.id))]
    async fn load(&self) -> Result<()> {
        match &self.widget {
            Some(widget) => widget.load().await,
            None => Ok(()),
        }
    }

    fn unload(&self) {
        if let Some(widget) = &self.widget {
            widget.unload();
        }
        self.set_status(LayerStatus::NotReady);
    }

    fn duration(&self) -> DurationFuture {
        self.duration.get_or_init(|| self.compute_duration()).clone()
    }

    /// Always ends with exactly one `Ended` once the clock completes, even if
    /// the widget stops producing signals earlier.
    fn play(self: Arc<Self>, clock: TickStream) -> PlayStream {
        match &self.widget {
            Some(widget) => fan_out(clock, std::slice::from_ref(widget)),
            None => clock
                .map(|tick| PlaySignal::Progress(tick.elapsed_ms))
                .chain(stream::once(async { PlaySignal::Ended }))
                .boxed(),
        }
    }

    fn stop(&self) {
        if let Some(widget) = &self.widget {
            widget.stop();
        }
    }

    fn seek(&self, offset_ms: u64) -> SeekResult {
        self.offset.store(offset_ms, Ordering::SeqCst);
        match &self.widget {
            Some(widget) => widget.seek(offset_ms),
            None => SeekResult::new(offset_ms, 0),
        }
    }

    #[instrument(skip(self, surface), fields(layer = %self.id))]
    async fn show(&self, surface: &Surface, offset_ms: u64) -> ShowOutcome {
        let ticket = self.gate.begin();
        self.offset.store(offset_ms, Ordering::SeqCst);

        let Some(widget) = &self.widget else {
            *self.surface.lock() = Some(surface.clone());
            self.set_status(LayerStatus::Ready);
            return ShowOutcome::Shown;
        };

        let outcome = AssertUnwindSafe(widget.show(surface, offset_ms))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| ShowOutcome::Error(panic_message(panic.as_ref())));

        if !self.gate.is_current(&ticket) {
            // A newer show or a hide ran meanwhile; this frame is stale.
            widget.hide();
            return ShowOutcome::Error("superseded".to_string());
        }

        match outcome {
            ShowOutcome::Shown => {
                if let Err(e) = surface.renderer.apply_visual(&surface.container, &self.base) {
                    warn!(layer = %self.id, error = %e, "Failed to apply layer visual state");
                }
                *self.surface.lock() = Some(surface.clone());
                self.set_status(LayerStatus::Ready);
                ShowOutcome::Shown
            }
            ShowOutcome::Error(message) => {
                warn!(
                    layer = %self.id,
                    widget = widget.name(),
                    options = %self.summary,
                    error = %message,
                    "Layer failed to show"
                );
                widget.hide();
                self.set_status(LayerStatus::Error);
                ShowOutcome::Error(message)
            }
        }
    }

    fn hide(&self) {
        self.gate.supersede();
        if let Some(widget) = &self.widget {
            widget.hide();
        }
        self.surface.lock().take();
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("widget", &self.widget.as_ref().map(|w| w.name()))
            .field("slack", &self.slack)
            .field("fixed", &self.fixed)
            .field("transition", &self.transition)
            .field("status", &self.status())
            .finish()
    }
}

fn summarize(doc: &Value) -> String {
    let mut text = doc.to_string();
    if text.len() > SUMMARY_LIMIT {
        let mut cut = SUMMARY_LIMIT;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    text
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("widget panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("widget panicked: {s}")
    } else {
        "widget panicked".to_string()
    }
}
