//! Host doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    Container, FontFace, MediaCommand, MediaMetadata, MediaProbe, NodeContent, RenderNode,
    Renderer, ResourceManager, VisualState,
};
use core_async::time::{sleep, Duration};
use core_playback::{PlaybackConfig, Surface, Timeline, WidgetDeps};
use core_runtime::events::{CoreEvent, EventBus, EventStream, PlaybackEvent};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

// ============================================================================
// Renderer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    Mount { container: String, content: NodeContent },
    Unmount(String),
    Visual { container: String, state: VisualState },
    Media { container: String, command: MediaCommand },
    LoadFont(String),
    UnloadFont(String),
}

/// Keeps an in-memory screen and a log of every call.
#[derive(Default)]
pub struct RecordingRenderer {
    calls: Mutex<Vec<RenderCall>>,
    screen: Mutex<BTreeMap<Container, NodeContent>>,
}

impl RecordingRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Currently mounted content keyed by container path.
    pub fn screen(&self) -> BTreeMap<String, NodeContent> {
        self.screen
            .lock()
            .iter()
            .map(|(container, content)| (container.id().to_string(), content.clone()))
            .collect()
    }

    pub fn is_showing(&self, url: &str) -> bool {
        self.screen.lock().values().any(|content| match content {
            NodeContent::Image { url: shown, .. } | NodeContent::Video { url: shown, .. } => {
                shown == url
            }
            _ => false,
        })
    }

    pub fn texts(&self) -> Vec<String> {
        self.screen
            .lock()
            .values()
            .filter_map(|content| match content {
                NodeContent::Text { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn font_loads(&self) -> usize {
        self.count(|call| matches!(call, RenderCall::LoadFont(_)))
    }

    pub fn font_unloads(&self) -> usize {
        self.count(|call| matches!(call, RenderCall::UnloadFont(_)))
    }

    pub fn visuals_for(&self, prefix: &str) -> Vec<VisualState> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RenderCall::Visual { container, state } if container.starts_with(prefix) => {
                    Some(state.clone())
                }
                _ => None,
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&RenderCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }
}

#[async_trait]
impl Renderer for RecordingRenderer {
    async fn mount(&self, container: &Container, node: RenderNode) -> BridgeResult<()> {
        self.calls.lock().push(RenderCall::Mount {
            container: container.id().to_string(),
            content: node.content.clone(),
        });
        self.screen.lock().insert(container.clone(), node.content);
        Ok(())
    }

    fn unmount(&self, container: &Container) {
        self.calls
            .lock()
            .push(RenderCall::Unmount(container.id().to_string()));
        self.screen.lock().retain(|mounted, _| !mounted.is_within(container));
    }

    fn apply_visual(&self, container: &Container, state: &VisualState) -> BridgeResult<()> {
        self.calls.lock().push(RenderCall::Visual {
            container: container.id().to_string(),
            state: state.clone(),
        });
        Ok(())
    }

    fn control_media(&self, container: &Container, command: MediaCommand) -> BridgeResult<()> {
        self.calls.lock().push(RenderCall::Media {
            container: container.id().to_string(),
            command,
        });
        Ok(())
    }

    async fn load_font(&self, face: &FontFace, _url: &str) -> BridgeResult<()> {
        self.calls
            .lock()
            .push(RenderCall::LoadFont(face.family.clone()));
        Ok(())
    }

    fn unload_font(&self, face: &FontFace) {
        self.calls
            .lock()
            .push(RenderCall::UnloadFont(face.family.clone()));
    }
}

// ============================================================================
// Resources and Probe
// ============================================================================

/// Resolves `uri` to `local://uri` unless told otherwise.
#[derive(Default)]
pub struct MapResources {
    missing: HashSet<String>,
    failing: HashSet<String>,
    latency: Duration,
    gets: Mutex<Vec<String>>,
    releases: Mutex<Vec<String>>,
}

impl MapResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_missing(mut self, uri: &str) -> Self {
        self.missing.insert(uri.to_string());
        self
    }

    pub fn with_failure(mut self, uri: &str) -> Self {
        self.failing.insert(uri.to_string());
        self
    }

    pub fn with_latency(mut self, ms: u64) -> Self {
        self.latency = Duration::from_millis(ms);
        self
    }

    pub fn requested(&self, uri: &str) -> usize {
        self.gets.lock().iter().filter(|u| *u == uri).count()
    }

    pub fn released(&self, uri: &str) -> usize {
        self.releases.lock().iter().filter(|u| *u == uri).count()
    }
}

#[async_trait]
impl ResourceManager for MapResources {
    async fn get_media(&self, uri: &str) -> BridgeResult<Option<String>> {
        self.gets.lock().push(uri.to_string());
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        if self.failing.contains(uri) {
            return Err(BridgeError::OperationFailed(format!("fetch failed: {uri}")));
        }
        if self.missing.contains(uri) {
            return Ok(None);
        }
        Ok(Some(format!("local://{uri}")))
    }

    fn release_media(&self, uri: &str) {
        self.releases.lock().push(uri.to_string());
    }
}

/// Reports fixed durations keyed by resolved URL.
#[derive(Default)]
pub struct FixedProbe {
    durations: HashMap<String, u64>,
}

impl FixedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, duration_ms: u64) -> Self {
        self.durations.insert(url.to_string(), duration_ms);
        self
    }
}

#[async_trait]
impl MediaProbe for FixedProbe {
    async fn probe(&self, url: &str) -> BridgeResult<MediaMetadata> {
        Ok(self
            .durations
            .get(url)
            .map(|ms| MediaMetadata::with_duration(*ms))
            .unwrap_or_default())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub renderer: Arc<RecordingRenderer>,
    pub resources: Arc<MapResources>,
    pub deps: WidgetDeps,
    pub events: EventBus,
    stream: EventStream,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(MapResources::new(), FixedProbe::new())
    }

    pub fn with(resources: MapResources, probe: FixedProbe) -> Self {
        let renderer = RecordingRenderer::new();
        let resources = Arc::new(resources);
        let deps = WidgetDeps::new(
            resources.clone(),
            Arc::new(probe),
            renderer.clone(),
            Arc::new(PlaybackConfig::default()),
        );
        let events = EventBus::new(4096);
        let stream = EventStream::new(events.subscribe());
        Self {
            renderer,
            resources,
            deps,
            events,
            stream,
        }
    }

    pub fn surface(&self) -> Surface {
        Surface::new(self.renderer.clone(), Container::new("screen"))
    }

    pub fn timeline(&self, doc: &Value, prefetch: bool) -> Timeline {
        Timeline::from_document(doc, &self.deps, self.surface(), self.events.clone(), prefetch)
            .expect("playlist should build")
    }

    /// Playback events emitted since the last call.
    pub fn playback_events(&mut self) -> Vec<PlaybackEvent> {
        self.stream
            .drain()
            .into_iter()
            .filter_map(|event| match event {
                CoreEvent::Playback(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    pub fn all_events(&mut self) -> Vec<CoreEvent> {
        self.stream.drain()
    }
}

pub fn started(events: &[PlaybackEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            PlaybackEvent::ItemStarted { layer_id, .. } => Some(layer_id.clone()),
            _ => None,
        })
        .collect()
}

pub fn times(events: &[PlaybackEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|event| match event {
            PlaybackEvent::Time { elapsed_ms } => Some(*elapsed_ms),
            _ => None,
        })
        .collect()
}
