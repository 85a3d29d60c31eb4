//! # Timeline
//!
//! The scheduler. A [`Timeline`] is a cheap, cloneable handle to one actor
//! task that owns every piece of playback state: the layer list, the cursor,
//! the master clock, the active and outgoing layers and the prefetch task.
//!
//! ## Commands
//!
//! Commands are processed strictly in order, so each one is atomic from the
//! caller's point of view. A command that arrives while a `load()`/`show()`
//! is in flight supersedes it: the in-flight future is dropped, the partly
//! mounted layer is hidden and the new command runs (last write wins).
//! `play`, `pause` and `set_loop` only change intent and never supersede.
//!
//! ## Clock
//!
//! A Tokio interval at `tick_interval_ms` drives playback. Elapsed time is
//! measured against a monotonic [`Instant`] so late ticks do not drift; each
//! tick advances the slot-local offset, crosses slot boundaries (possibly
//! several), renders transition frames, forwards the tick to the active
//! layer and emits a `Time` event with the timeline position.
//!
//! ## Failure Handling
//!
//! A layer whose `show()` fails is skipped: it counts as zero-length for the
//! rest of the pass and an `ItemSkipped` event is emitted. Broken scheduling
//! invariants are fatal: playback stops in the `Error` state until the next
//! `play()` or `seek()`.

use crate::config::PlaybackConfig;
use crate::context::TemplateContext;
use crate::error::{PlaybackError, Result};
use crate::layer::Layer;
use crate::schedule::{self, LatencyEstimator};
use crate::traits::{
    DurationFuture, Playable, PlaySignal, PlayStream, ShowOutcome, Surface, Tick,
};
use crate::transition::{Transition, VisualPatch};
use crate::widgets::WidgetDeps;
use core_async::sync::{mpsc, oneshot, watch, CancellationToken, DropGuard};
use core_async::task::JoinHandle;
use core_async::time::{interval_at, Duration, Instant, Interval, MissedTickBehavior};
use core_runtime::events::{
    AssetEvent, CoreEvent, EventBus, EventStream, PlaybackEvent, PlaybackState,
};
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::future;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

// ============================================================================
// Public Types
// ============================================================================

/// Snapshot of the timeline, published after every state change and tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineStatus {
    pub state: PlaybackState,
    /// Position on the timeline in milliseconds.
    pub current_time_ms: u64,
    /// Cursor position; `None` for an empty playlist.
    pub index: Option<usize>,
    /// Best-effort total; unresolved layers count as zero.
    pub duration_ms: u64,
    pub loop_enabled: bool,
}

/// Parsed playlist document.
pub struct Playlist {
    pub layers: Vec<Layer>,
    pub loop_enabled: bool,
}

impl Playlist {
    /// Parse `{ "loop": bool, "context": {...}, "items": [...] }` or a bare
    /// array of items.
    pub fn from_json(doc: &Value, deps: &WidgetDeps) -> Result<Self> {
        let (items, loop_enabled, ctx) = match doc {
            Value::Array(items) => (items, false, TemplateContext::default()),
            Value::Object(map) => {
                let items = map
                    .get("items")
                    .or_else(|| map.get("layers"))
                    .and_then(Value::as_array)
                    .ok_or_else(|| {
                        PlaybackError::MalformedDocument("playlist has no items array".to_string())
                    })?;
                let loop_enabled = map.get("loop").and_then(Value::as_bool).unwrap_or(false);
                let ctx = map
                    .get("context")
                    .map(TemplateContext::from_value)
                    .unwrap_or_default();
                (items, loop_enabled, ctx)
            }
            other => {
                return Err(PlaybackError::MalformedDocument(format!(
                    "expected a playlist object or array, got {other}"
                )))
            }
        };

        let layers = items
            .iter()
            .enumerate()
            .map(|(i, item)| Layer::from_json(item, i, &ctx, deps))
            .collect::<Result<Vec<_>>>()?;

        let mut seen = HashSet::new();
        for layer in &layers {
            if !seen.insert(layer.id()) {
                return Err(PlaybackError::MalformedDocument(format!(
                    "duplicate layer id '{}'",
                    layer.id()
                )));
            }
        }

        Ok(Self {
            layers,
            loop_enabled,
        })
    }
}

// ============================================================================
// Handle
// ============================================================================

enum Command {
    Play(oneshot::Sender<Result<()>>),
    Pause(oneshot::Sender<Result<()>>),
    Stop(oneshot::Sender<Result<()>>),
    Seek(u64, oneshot::Sender<Result<u64>>),
    SetLoop(bool, oneshot::Sender<Result<()>>),
    Insert {
        index: usize,
        layer: Arc<Layer>,
        reply: oneshot::Sender<Result<()>>,
    },
    Remove {
        id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Dispose(oneshot::Sender<Result<()>>),
}

/// Handle to a running timeline. Clones control the same timeline.
///
/// The timeline task exits on `dispose()` or when every handle is dropped.
#[derive(Clone)]
pub struct Timeline {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<TimelineStatus>,
    events: EventBus,
}

impl Timeline {
    /// Parse `doc` and start a timeline for it. Must be called inside a
    /// runtime.
    pub fn from_document(
        doc: &Value,
        deps: &WidgetDeps,
        surface: Surface,
        events: EventBus,
        prefetch: bool,
    ) -> Result<Self> {
        let playlist = Playlist::from_json(doc, deps)?;
        Ok(Self::spawn(
            playlist,
            surface,
            events,
            Arc::clone(&deps.config),
            prefetch,
        ))
    }

    /// Start the timeline task for an already built playlist.
    pub fn spawn(
        playlist: Playlist,
        surface: Surface,
        events: EventBus,
        config: Arc<PlaybackConfig>,
        prefetch: bool,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let layers: Vec<Arc<Layer>> = playlist.layers.into_iter().map(Arc::new).collect();

        let initial = TimelineStatus {
            state: PlaybackState::Idle,
            current_time_ms: 0,
            index: if layers.is_empty() { None } else { Some(0) },
            duration_ms: 0,
            loop_enabled: playlist.loop_enabled,
        };
        let (status_tx, status_rx) = watch::channel(initial);

        let period = config.tick_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let actor = Actor {
            estimator: LatencyEstimator::new(&config),
            layers,
            surface,
            events: events.clone(),
            status_tx,
            commands: commands_rx,
            notices_tx,
            notices_rx,
            config,
            prefetch_enabled: prefetch,
            loop_enabled: playlist.loop_enabled,
            state: PlaybackState::Idle,
            want_playing: false,
            index: 0,
            local: 0,
            pass: 0,
            skipped: HashSet::new(),
            active: None,
            outgoing: None,
            ticking: false,
            ticker,
            last_tick: Instant::now(),
            prefetch: None,
            prefetched: HashSet::new(),
            watchers: HashMap::new(),
            pending: VecDeque::new(),
            completed_emitted: false,
            disposed: false,
        };
        core_async::spawn(actor.run());

        Self {
            commands: commands_tx,
            status: status_rx,
            events,
        }
    }

    pub async fn play(&self) -> Result<()> {
        self.request(Command::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(Command::Pause).await
    }

    /// Stop and unmount, keeping the position for the next `play()`.
    pub async fn stop(&self) -> Result<()> {
        self.request(Command::Stop).await
    }

    /// Jump to `target_ms`, clamped to the timeline. Returns the applied
    /// position.
    pub async fn seek(&self, target_ms: u64) -> Result<u64> {
        self.request(|reply| Command::Seek(target_ms, reply)).await
    }

    pub async fn set_loop(&self, enabled: bool) -> Result<()> {
        self.request(|reply| Command::SetLoop(enabled, reply)).await
    }

    /// Insert `layer` at `index` (clamped to the end) while playing.
    pub async fn insert_layer(&self, index: usize, layer: Layer) -> Result<()> {
        let layer = Arc::new(layer);
        self.request(|reply| Command::Insert {
            index,
            layer,
            reply,
        })
        .await
    }

    /// Remove the layer with `id`. Removing the active layer activates the
    /// layer that takes its place.
    pub async fn remove_layer(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.request(|reply| Command::Remove { id, reply }).await
    }

    /// Unload every layer and stop the timeline task.
    pub async fn dispose(&self) -> Result<()> {
        match self.request(Command::Dispose).await {
            Err(PlaybackError::TimelineClosed) => Ok(()),
            other => other,
        }
    }

    pub fn status(&self) -> TimelineStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<TimelineStatus> {
        self.status.clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<Result<T>>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| PlaybackError::TimelineClosed)?;
        rx.await.map_err(|_| PlaybackError::TimelineClosed)?
    }
}

impl std::fmt::Debug for Timeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeline")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Actor
// ============================================================================

/// Why the current command or tick stopped early.
enum Halt {
    /// A newer command is queued in `pending`.
    Superseded,
    /// Every handle is gone or `dispose()` ran.
    Closed,
}

type Step<T> = std::result::Result<T, Halt>;

enum Raced<T> {
    Done(T),
    Superseded,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    Shown,
    Failed,
}

enum Notice {
    DurationResolved { layer_id: String, duration_ms: u64 },
    Prefetched { layer_id: String, elapsed_ms: u64 },
    PrefetchFailed { layer_id: String, message: String },
}

enum Wake {
    Command(Option<Command>),
    Tick,
    Notice(Notice),
    Signal(Option<PlaySignal>),
}

struct ActiveLayer {
    layer: Arc<Layer>,
    clock: Option<UnboundedSender<Tick>>,
    signals: Option<PlayStream>,
    internal: u64,
}

impl ActiveLayer {
    fn new(layer: Arc<Layer>, internal: u64) -> Self {
        Self {
            layer,
            clock: None,
            signals: None,
            internal,
        }
    }

    fn ensure_clock(&mut self) {
        if self.clock.is_none() {
            let (tx, rx) = unbounded();
            self.signals = Some(Arc::clone(&self.layer).play(rx.boxed()));
            self.clock = Some(tx);
        }
    }

    fn stop_clock(&mut self) {
        self.clock = None;
        self.signals = None;
    }

    fn forward(&self, local_ms: u64) {
        if let Some(tx) = &self.clock {
            let _ = tx.unbounded_send(Tick::at(local_ms));
        }
    }
}

struct Outgoing {
    layer: Arc<Layer>,
    transition: Arc<dyn Transition>,
}

struct Prefetch {
    layer_id: String,
    handle: JoinHandle<()>,
}

struct Actor {
    layers: Vec<Arc<Layer>>,
    surface: Surface,
    events: EventBus,
    status_tx: watch::Sender<TimelineStatus>,
    commands: mpsc::UnboundedReceiver<Command>,
    notices_tx: mpsc::UnboundedSender<Notice>,
    notices_rx: mpsc::UnboundedReceiver<Notice>,
    config: Arc<PlaybackConfig>,
    prefetch_enabled: bool,
    loop_enabled: bool,

    state: PlaybackState,
    /// Whether playback should run once the current activation settles.
    want_playing: bool,
    index: usize,
    /// Offset inside the current slot.
    local: u64,
    pass: u64,
    /// Layers that failed to show during the current pass.
    skipped: HashSet<String>,
    active: Option<ActiveLayer>,
    outgoing: Option<Outgoing>,

    ticking: bool,
    ticker: Interval,
    last_tick: Instant,

    estimator: LatencyEstimator,
    prefetch: Option<Prefetch>,
    prefetched: HashSet<String>,
    /// Dropping a guard stops that layer's duration watcher.
    watchers: HashMap<String, DropGuard>,

    pending: VecDeque<Command>,
    completed_emitted: bool,
    disposed: bool,
}

async fn next_signal(active: &mut Option<ActiveLayer>) -> Option<PlaySignal> {
    match active.as_mut().and_then(|a| a.signals.as_mut()) {
        Some(signals) => signals.next().await,
        None => future::pending().await,
    }
}

impl Actor {
    async fn run(mut self) {
        info!(layers = self.layers.len(), loop_enabled = self.loop_enabled, "Timeline started");
        self.publish();

        loop {
            let step = match self.pending.pop_front() {
                Some(command) => self.handle(command).await,
                None => {
                    let wake = core_async::select! {
                        command = self.commands.recv() => Wake::Command(command),
                        _ = self.ticker.tick(), if self.ticking => Wake::Tick,
                        Some(notice) = self.notices_rx.recv() => Wake::Notice(notice),
                        signal = next_signal(&mut self.active) => Wake::Signal(signal),
                    };
                    match wake {
                        Wake::Command(Some(command)) => self.handle(command).await,
                        Wake::Command(None) => Err(Halt::Closed),
                        Wake::Tick => self.on_tick().await,
                        Wake::Notice(notice) => self.on_notice(notice).await,
                        Wake::Signal(signal) => {
                            self.on_signal(signal);
                            Ok(())
                        }
                    }
                }
            };
            if let Err(Halt::Closed) = step {
                break;
            }
        }

        self.shutdown();
        info!("Timeline task exited");
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    async fn handle(&mut self, command: Command) -> Step<()> {
        match command {
            Command::Play(reply) => {
                let outcome = self.play().await;
                answer(reply, outcome)
            }
            Command::Pause(reply) => answer(reply, Ok(self.pause())),
            Command::Stop(reply) => answer(reply, Ok(self.stop())),
            Command::Seek(target, reply) => {
                let outcome = self.seek(target).await;
                answer(reply, outcome)
            }
            Command::SetLoop(enabled, reply) => {
                self.set_loop(enabled);
                answer(reply, Ok(Ok(())))
            }
            Command::Insert {
                index,
                layer,
                reply,
            } => answer(reply, Ok(self.insert(index, layer))),
            Command::Remove { id, reply } => {
                let outcome = self.remove(&id).await;
                answer(reply, outcome)
            }
            Command::Dispose(reply) => {
                self.shutdown();
                let _ = reply.send(Ok(()));
                Err(Halt::Closed)
            }
        }
    }

    #[instrument(skip(self), fields(state = %self.state))]
    async fn play(&mut self) -> Step<Result<()>> {
        self.want_playing = true;
        match self.state {
            PlaybackState::Playing | PlaybackState::Loading | PlaybackState::Showing => {
                return Ok(Ok(()));
            }
            _ => {}
        }
        if self.layers.is_empty() {
            self.complete();
            return Ok(Ok(()));
        }

        if self.state == PlaybackState::Completed {
            self.clear_screen();
            self.index = 0;
            self.local = 0;
            self.pass = 0;
            self.skipped.clear();
            self.completed_emitted = false;
        }

        if self.active.is_some() {
            self.start_ticking();
        } else {
            self.activate(self.index, self.local).await?;
        }
        Ok(Ok(()))
    }

    fn pause(&mut self) -> Result<()> {
        self.want_playing = false;
        if self.state != PlaybackState::Playing {
            return Ok(());
        }
        self.halt();
        self.finish_transition();
        self.set_state(PlaybackState::Paused);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.want_playing = false;
        self.halt();
        self.abort_prefetch();
        self.clear_screen();
        self.set_state(PlaybackState::Stopped);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn seek(&mut self, target_ms: u64) -> Step<Result<u64>> {
        if self.layers.is_empty() {
            return Ok(Ok(0));
        }
        self.skipped.clear();

        // Durations up to the target must be known to locate it.
        let mut durations = Vec::with_capacity(self.layers.len());
        let mut reached = 0u64;
        for layer in self.layers.clone() {
            let duration = match layer.resolved_duration() {
                Some(ms) => ms,
                None if reached <= target_ms => match self.race(layer.duration()).await {
                    Raced::Done(ms) => ms,
                    Raced::Superseded => return Err(Halt::Superseded),
                    Raced::Closed => return Err(Halt::Closed),
                },
                None => 0,
            };
            reached = reached.saturating_add(duration);
            durations.push(duration);
        }

        let total = schedule::total(&durations);
        if target_ms > total {
            let report = PlaybackError::SeekOutOfRange {
                target_ms,
                total_ms: total,
            };
            debug!(error = %report, "Clamping seek target");
        }
        let Some((index, local, start)) = schedule::locate(&durations, target_ms) else {
            return Ok(Ok(0));
        };

        self.halt();
        self.abort_prefetch();
        self.clear_screen();
        self.completed_emitted = false;

        self.activate(index, local).await?;
        let position = start.saturating_add(local);
        self.emit(PlaybackEvent::Time {
            elapsed_ms: position,
        });
        self.publish();
        Ok(Ok(position))
    }

    fn set_loop(&mut self, enabled: bool) {
        if self.loop_enabled != enabled {
            debug!(enabled, "Loop changed");
            self.loop_enabled = enabled;
            self.publish();
        }
    }

    fn insert(&mut self, index: usize, layer: Arc<Layer>) -> Result<()> {
        if self.layers.iter().any(|l| l.id() == layer.id()) {
            return Err(PlaybackError::InvalidOptions {
                widget: "layer".to_string(),
                path: layer.id().to_string(),
                message: "duplicate layer id".to_string(),
            });
        }
        let at = index.min(self.layers.len());
        info!(layer = layer.id(), at, "Inserting layer");
        self.layers.insert(at, layer);
        if self.state != PlaybackState::Idle && self.layers.len() > 1 && at <= self.index {
            self.index += 1;
        }
        self.emit(PlaybackEvent::DurationChanged {
            total_ms: self.total_estimate(),
        });
        self.publish();
        Ok(())
    }

    async fn remove(&mut self, id: &str) -> Step<Result<()>> {
        let Some(pos) = self.layers.iter().position(|l| l.id() == id) else {
            return Ok(Err(PlaybackError::InvalidOptions {
                widget: "layer".to_string(),
                path: id.to_string(),
                message: "no layer with this id".to_string(),
            }));
        };
        info!(layer = id, pos, "Removing layer");

        let removed = self.layers.remove(pos);
        self.skipped.remove(id);
        self.prefetched.remove(id);
        self.watchers.remove(id);
        if self.prefetch.as_ref().is_some_and(|p| p.layer_id == id) {
            self.abort_prefetch();
        }
        if self.outgoing.as_ref().is_some_and(|o| o.layer.id() == id) {
            self.outgoing = None;
        }
        let was_active = match self.active.take() {
            Some(mut active) if active.layer.id() == id => {
                active.stop_clock();
                true
            }
            other => {
                self.active = other;
                false
            }
        };
        removed.stop();
        removed.hide();
        removed.unload();

        if pos < self.index {
            self.index -= 1;
        } else if pos == self.index {
            self.local = 0;
            if self.layers.is_empty() {
                self.index = 0;
                if was_active {
                    self.complete();
                }
            } else if self.index >= self.layers.len() {
                if self.loop_enabled && was_active {
                    self.index = 0;
                    self.activate(0, 0).await?;
                } else {
                    self.index = self.layers.len() - 1;
                    if was_active {
                        self.local = self.layers[self.index].resolved_duration().unwrap_or(0);
                        self.complete();
                    }
                }
            } else if was_active {
                self.activate(self.index, 0).await?;
            }
        }

        self.emit(PlaybackEvent::DurationChanged {
            total_ms: self.total_estimate(),
        });
        self.publish();
        Ok(Ok(()))
    }

    // ------------------------------------------------------------------------
    // Activation
    // ------------------------------------------------------------------------

    /// Load, seek and show layer `index` at `local`, then settle into
    /// `Playing` or `Paused` according to the current intent.
    async fn activate(&mut self, index: usize, local: u64) -> Step<Activation> {
        let layer = Arc::clone(&self.layers[index]);
        self.index = index;
        self.local = local;
        self.prefetched.remove(layer.id());

        self.set_state(PlaybackState::Loading);
        let loading = Arc::clone(&layer);
        match self.race(async move { loading.load().await }).await {
            Raced::Done(Ok(())) => {}
            Raced::Done(Err(e)) => {
                warn!(layer = layer.id(), error = %e, "Layer failed to load");
            }
            Raced::Superseded => {
                self.discard(&layer);
                return Err(Halt::Superseded);
            }
            Raced::Closed => {
                self.discard(&layer);
                return Err(Halt::Closed);
            }
        }

        self.set_state(PlaybackState::Showing);
        let seek = layer.seek(local);
        let showing = Arc::clone(&layer);
        let surface = self.surface_for(&layer);
        let outcome = match self
            .race(async move { showing.show(&surface, local).await })
            .await
        {
            Raced::Done(outcome) => outcome,
            Raced::Superseded => {
                self.discard(&layer);
                return Err(Halt::Superseded);
            }
            Raced::Closed => {
                self.discard(&layer);
                return Err(Halt::Closed);
            }
        };

        let layer_id = layer.id().to_string();
        let activation = match outcome {
            ShowOutcome::Shown => {
                info!(layer = %layer_id, index, local, "Layer started");
                self.emit(PlaybackEvent::ItemStarted {
                    index,
                    layer_id: layer_id.clone(),
                });
                self.emit(PlaybackEvent::Offset {
                    layer_id,
                    offset_ms: seek.offset_ms,
                    internal_offset: seek.internal_offset,
                });
                self.active = Some(ActiveLayer::new(layer, seek.internal_offset));
                self.ensure_watcher(index);
                Activation::Shown
            }
            ShowOutcome::Error(reason) => {
                warn!(layer = %layer_id, index, reason = %reason, "Skipping layer");
                layer.hide();
                self.skipped.insert(layer_id.clone());
                self.emit(PlaybackEvent::ItemSkipped {
                    index,
                    layer_id,
                    reason,
                });
                if let Some(old) = self.outgoing.take() {
                    self.retire(&old.layer);
                }
                Activation::Failed
            }
        };

        if self.want_playing {
            self.start_ticking();
        } else {
            self.ticking = false;
            self.set_state(PlaybackState::Paused);
        }
        Ok(activation)
    }

    /// Run `fut` while still accepting commands.
    async fn race<F: Future>(&mut self, fut: F) -> Raced<F::Output> {
        futures::pin_mut!(fut);
        loop {
            let command = core_async::select! {
                output = &mut fut => return Raced::Done(output),
                command = self.commands.recv() => command,
            };
            match command {
                None => return Raced::Closed,
                Some(Command::Play(reply)) => {
                    self.want_playing = true;
                    let _ = reply.send(Ok(()));
                }
                Some(Command::Pause(reply)) => {
                    self.want_playing = false;
                    let _ = reply.send(Ok(()));
                }
                Some(Command::SetLoop(enabled, reply)) => {
                    self.set_loop(enabled);
                    let _ = reply.send(Ok(()));
                }
                Some(command @ (Command::Insert { .. } | Command::Remove { .. })) => {
                    self.pending.push_back(command);
                }
                Some(command) => {
                    debug!("In-flight activation superseded");
                    self.pending.push_back(command);
                    return Raced::Superseded;
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Clock
    // ------------------------------------------------------------------------

    async fn on_tick(&mut self) -> Step<()> {
        let now = Instant::now();
        let elapsed_ms = now.saturating_duration_since(self.last_tick).as_millis() as u64;
        // Keep the sub-millisecond remainder for the next tick.
        self.last_tick += Duration::from_millis(elapsed_ms);
        self.local = self.local.saturating_add(elapsed_ms);

        if let Err(fault) = self.advance().await? {
            self.fault(fault);
            return Ok(());
        }
        if self.state != PlaybackState::Playing {
            return Ok(());
        }

        self.render_transition();
        if let Some(active) = &self.active {
            active.forward(self.local);
        }
        self.emit(PlaybackEvent::Time {
            elapsed_ms: self.position(),
        });
        self.maybe_prefetch();
        self.publish();
        Ok(())
    }

    /// Move the cursor past every slot the local offset has overrun.
    ///
    /// Whole loop passes that fit inside one tick are folded away, so the
    /// walk between two wraps never visits more than every layer once.
    async fn advance(&mut self) -> Step<Result<()>> {
        let limit = self.layers.len() + 2;
        let mut steps = 0;
        let mut last_wrap: Option<u64> = None;
        loop {
            if self.layers.is_empty() {
                self.complete();
                return Ok(Ok(()));
            }
            steps += 1;
            if steps > limit {
                return Ok(Err(PlaybackError::ClockFault(format!(
                    "cursor did not settle after {limit} steps"
                ))));
            }
            let Some(duration) = self.effective(self.index) else {
                // Wait for the duration; the watcher re-runs this.
                self.ensure_watcher(self.index);
                return Ok(Ok(()));
            };
            if self.local < duration {
                return Ok(Ok(()));
            }

            let mut overshoot = self.local - duration;
            let next = self.index + 1;
            if next < self.layers.len() {
                self.switch_to(next, overshoot).await?;
                continue;
            }
            if !self.loop_enabled {
                self.local = duration;
                self.complete();
                return Ok(Ok(()));
            }
            self.skipped.clear();
            // A wrap that consumed nothing means every layer failed to show.
            let stalled = last_wrap.is_some_and(|previous| overshoot >= previous);
            if stalled || !self.has_playable_content() {
                return Ok(Err(PlaybackError::ClockFault(
                    "loop pass has no playable content".to_string(),
                )));
            }
            let mut passes = 1;
            if let Some(total) = self.pass_total().filter(|&total| total > 0) {
                passes += overshoot / total;
                overshoot %= total;
            }
            last_wrap = Some(overshoot);
            steps = 0;
            self.pass = self.pass.saturating_add(passes);
            info!(pass = self.pass, "Timeline looped");
            self.emit(PlaybackEvent::Looped { pass: self.pass });
            self.switch_to(0, overshoot).await?;
        }
    }

    async fn switch_to(&mut self, next: usize, local: u64) -> Step<()> {
        let incoming = Arc::clone(&self.layers[next]);
        // The cursor moves first so `retire` sees the incoming layer as current.
        self.index = next;
        if let Some(old) = self.outgoing.take() {
            self.retire(&old.layer);
        }
        if let Some(mut current) = self.active.take() {
            current.stop_clock();
            current.layer.stop();
            let same = current.layer.id() == incoming.id();
            let transition = self
                .pick_transition(&current.layer, &incoming)
                .filter(|t| !same && t.duration_ms() > local);
            match transition {
                Some(transition) => {
                    self.outgoing = Some(Outgoing {
                        layer: current.layer,
                        transition,
                    })
                }
                None if same => current.layer.hide(),
                None => self.retire(&current.layer),
            }
        }
        self.activate(next, local).await?;
        Ok(())
    }

    fn pick_transition(&self, outgoing: &Layer, incoming: &Layer) -> Option<Arc<dyn Transition>> {
        if !self.config.enable_transitions {
            return None;
        }
        incoming
            .transition()
            .or_else(|| outgoing.transition())
            .cloned()
    }

    fn render_transition(&mut self) {
        let Some((transition, done)) = self
            .outgoing
            .as_ref()
            .map(|o| (Arc::clone(&o.transition), self.local >= o.transition.duration_ms()))
        else {
            return;
        };
        if done {
            self.finish_transition();
            return;
        }
        let frame = transition.frame_at(self.local);
        if let Some(outgoing) = &self.outgoing {
            outgoing.layer.apply_patch(&frame.outgoing);
        }
        if let Some(active) = &self.active {
            active.layer.apply_patch(&frame.incoming);
        }
    }

    fn finish_transition(&mut self) {
        if let Some(old) = self.outgoing.take() {
            self.retire(&old.layer);
            if let Some(active) = &self.active {
                active.layer.apply_patch(&VisualPatch::default());
            }
        }
    }

    fn start_ticking(&mut self) {
        self.ticking = true;
        self.ticker.reset();
        self.last_tick = Instant::now();
        if let Some(active) = &mut self.active {
            active.ensure_clock();
        }
        self.set_state(PlaybackState::Playing);
    }

    /// Stop the clock and the active layer's playback; keep it mounted.
    fn halt(&mut self) {
        self.ticking = false;
        if let Some(active) = &mut self.active {
            active.stop_clock();
            active.layer.stop();
        }
    }

    fn complete(&mut self) {
        self.halt();
        self.want_playing = false;
        self.abort_prefetch();
        if let Some(old) = self.outgoing.take() {
            self.retire(&old.layer);
        }
        self.set_state(PlaybackState::Completed);
        if !self.completed_emitted {
            self.completed_emitted = true;
            info!("Timeline completed");
            self.emit(PlaybackEvent::Completed);
        }
        self.publish();
    }

    fn fault(&mut self, fault: PlaybackError) {
        error!(error = %fault, "Playback stopped");
        self.halt();
        self.want_playing = false;
        self.abort_prefetch();
        self.set_state(PlaybackState::Error);
        self.emit(PlaybackEvent::Error {
            message: fault.to_string(),
            recoverable: !fault.is_fatal(),
        });
    }

    // ------------------------------------------------------------------------
    // Notices and Signals
    // ------------------------------------------------------------------------

    async fn on_notice(&mut self, notice: Notice) -> Step<()> {
        match notice {
            Notice::DurationResolved {
                layer_id,
                duration_ms,
            } => {
                debug!(layer = %layer_id, duration_ms, "Layer duration resolved");
                self.emit(PlaybackEvent::DurationChanged {
                    total_ms: self.total_estimate(),
                });
                if self.state == PlaybackState::Playing {
                    if let Err(fault) = self.advance().await? {
                        self.fault(fault);
                    }
                }
                self.publish();
            }
            Notice::Prefetched {
                layer_id,
                elapsed_ms,
            } => {
                debug!(layer = %layer_id, elapsed_ms, "Layer prefetched");
                self.estimator.observe(elapsed_ms);
                if self.prefetch.as_ref().is_some_and(|p| p.layer_id == layer_id) {
                    self.prefetch = None;
                }
                if self.layers.iter().any(|l| l.id() == layer_id) {
                    self.prefetched.insert(layer_id.clone());
                }
                self.events
                    .emit(CoreEvent::Asset(AssetEvent::Prefetched {
                        layer_id,
                        elapsed_ms,
                    }))
                    .ok();
            }
            Notice::PrefetchFailed { layer_id, message } => {
                warn!(layer = %layer_id, error = %message, "Prefetch failed");
                if self.prefetch.as_ref().is_some_and(|p| p.layer_id == layer_id) {
                    self.prefetch = None;
                }
                self.events
                    .emit(CoreEvent::Asset(AssetEvent::PrefetchFailed { layer_id, message }))
                    .ok();
            }
        }
        Ok(())
    }

    fn on_signal(&mut self, signal: Option<PlaySignal>) {
        let local = self.local;
        let Some(active) = &mut self.active else {
            return;
        };
        let event = match signal {
            Some(PlaySignal::Internal(value)) if value != active.internal => {
                active.internal = value;
                Some(PlaybackEvent::Offset {
                    layer_id: active.layer.id().to_string(),
                    offset_ms: local,
                    internal_offset: value,
                })
            }
            Some(PlaySignal::Internal(_)) | Some(PlaySignal::Progress(_)) => None,
            Some(PlaySignal::Ended) | None => {
                active.signals = None;
                None
            }
        };
        if let Some(event) = event {
            self.emit(event);
        }
    }

    // ------------------------------------------------------------------------
    // Prefetch and Duration Watchers
    // ------------------------------------------------------------------------

    fn maybe_prefetch(&mut self) {
        if !self.prefetch_enabled || self.state != PlaybackState::Playing || self.layers.len() < 2 {
            return;
        }
        let Some(duration) = self.effective(self.index) else {
            return;
        };
        let remaining = duration.saturating_sub(self.local);
        let lookahead = self.estimator.lookahead_ms();
        if remaining > lookahead {
            return;
        }
        let next = if self.index + 1 < self.layers.len() {
            self.index + 1
        } else if self.loop_enabled {
            0
        } else {
            return;
        };

        let layer = Arc::clone(&self.layers[next]);
        let layer_id = layer.id().to_string();
        if self.prefetched.contains(&layer_id)
            || self.prefetch.as_ref().is_some_and(|p| p.layer_id == layer_id)
        {
            return;
        }
        self.abort_prefetch();
        self.ensure_watcher(next);
        debug!(layer = %layer_id, remaining, lookahead, "Prefetching next layer");

        let notices = self.notices_tx.clone();
        let id = layer_id.clone();
        let handle = core_async::spawn(async move {
            let started = Instant::now();
            let notice = match layer.load().await {
                Ok(()) => Notice::Prefetched {
                    layer_id: id,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                },
                Err(e) => Notice::PrefetchFailed {
                    layer_id: id,
                    message: e.to_string(),
                },
            };
            let _ = notices.send(notice);
        });
        self.prefetch = Some(Prefetch { layer_id, handle });
    }

    fn abort_prefetch(&mut self) {
        if let Some(prefetch) = self.prefetch.take() {
            debug!(layer = %prefetch.layer_id, "Aborting prefetch");
            prefetch.handle.abort();
        }
    }

    /// Report layer `index`'s duration once it resolves.
    fn ensure_watcher(&mut self, index: usize) {
        let Some(layer) = self.layers.get(index) else {
            return;
        };
        if layer.resolved_duration().is_some() || self.watchers.contains_key(layer.id()) {
            return;
        }
        let guard = watch_duration(
            layer.id().to_string(),
            layer.duration(),
            self.notices_tx.clone(),
        );
        self.watchers.insert(layer.id().to_string(), guard);
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Duration of slot `index` for this pass; skipped layers count as zero.
    fn effective(&self, index: usize) -> Option<u64> {
        let layer = self.layers.get(index)?;
        if self.skipped.contains(layer.id()) {
            return Some(0);
        }
        layer.resolved_duration()
    }

    /// Length of one full pass, once every duration is known.
    fn pass_total(&self) -> Option<u64> {
        (0..self.layers.len())
            .try_fold(0u64, |sum, i| Some(sum.saturating_add(self.effective(i)?)))
    }

    fn estimates(&self) -> Vec<u64> {
        (0..self.layers.len())
            .map(|i| self.effective(i).unwrap_or(0))
            .collect()
    }

    fn total_estimate(&self) -> u64 {
        schedule::total(&self.estimates())
    }

    fn position(&self) -> u64 {
        schedule::start_of(&self.estimates(), self.index).saturating_add(self.local)
    }

    /// Unresolved layers might still have content.
    fn has_playable_content(&self) -> bool {
        (0..self.layers.len()).any(|i| self.effective(i) != Some(0))
    }

    fn surface_for(&self, layer: &Layer) -> Surface {
        self.surface.child(format!("layer-{}", layer.id()))
    }

    /// Hide a layer that left the screen, unloading it unless it is next.
    fn retire(&mut self, layer: &Arc<Layer>) {
        layer.hide();
        let upcoming = self
            .layers
            .get(self.index)
            .is_some_and(|l| l.id() == layer.id());
        if self.config.unload_inactive && !upcoming {
            layer.unload();
            self.prefetched.remove(layer.id());
        }
    }

    /// Hide a layer whose activation was abandoned, including anything its
    /// dropped `show()` mounted.
    fn discard(&mut self, layer: &Arc<Layer>) {
        layer.hide();
        let surface = self.surface_for(layer);
        surface.renderer.unmount(&surface.container);
    }

    fn clear_screen(&mut self) {
        if let Some(old) = self.outgoing.take() {
            self.retire(&old.layer);
        }
        if let Some(mut active) = self.active.take() {
            active.stop_clock();
            active.layer.stop();
            active.layer.hide();
        }
    }

    fn shutdown(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.halt();
        self.abort_prefetch();
        self.watchers.clear();
        self.outgoing = None;
        self.active = None;
        for layer in &self.layers {
            layer.stop();
            layer.hide();
            layer.unload();
        }
        self.set_state(PlaybackState::Stopped);
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state == state {
            return;
        }
        debug!(from = %self.state, to = %state, "Timeline state changed");
        self.state = state;
        self.emit(PlaybackEvent::StateChanged { state });
        self.publish();
    }

    fn emit(&self, event: PlaybackEvent) {
        self.events.emit(CoreEvent::Playback(event)).ok();
    }

    fn publish(&self) {
        self.status_tx.send_replace(TimelineStatus {
            state: self.state,
            current_time_ms: self.position(),
            index: if self.layers.is_empty() {
                None
            } else {
                Some(self.index)
            },
            duration_ms: self.total_estimate(),
            loop_enabled: self.loop_enabled,
        });
    }
}

/// Report `duration` as a notice once it resolves, unless the returned guard
/// is dropped first.
fn watch_duration(
    layer_id: String,
    duration: DurationFuture,
    notices: mpsc::UnboundedSender<Notice>,
) -> DropGuard {
    let token = CancellationToken::new();
    let cancelled = token.clone();
    core_async::spawn(async move {
        core_async::select! {
            _ = cancelled.cancelled() => {
                debug!(layer = %layer_id, "Duration watcher cancelled");
            }
            duration_ms = duration => {
                let _ = notices.send(Notice::DurationResolved {
                    layer_id,
                    duration_ms,
                });
            }
        }
    });
    token.drop_guard()
}

fn answer<T>(reply: oneshot::Sender<Result<T>>, outcome: Step<Result<T>>) -> Step<()> {
    match outcome {
        Ok(result) => {
            let _ = reply.send(result);
            Ok(())
        }
        Err(Halt::Superseded) => {
            let _ = reply.send(Err(PlaybackError::Superseded));
            Ok(())
        }
        Err(Halt::Closed) => {
            let _ = reply.send(Err(PlaybackError::TimelineClosed));
            Err(Halt::Closed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{
        Container, FontFace, MediaCommand, NoopProbe, RenderNode, Renderer, ResourceManager,
        VisualState,
    };
    use crate::traits::{lazy_duration, ready_duration};
    use core_async::time::sleep;
    use mockall::mock;
    use serde_json::json;

    mock! {
        Screen {}

        #[async_trait::async_trait]
        impl Renderer for Screen {
            async fn mount(&self, container: &Container, node: RenderNode) -> BridgeResult<()>;
            fn unmount(&self, container: &Container);
            fn apply_visual(&self, container: &Container, state: &VisualState) -> BridgeResult<()>;
            fn control_media(&self, container: &Container, command: MediaCommand) -> BridgeResult<()>;
            async fn load_font(&self, face: &FontFace, url: &str) -> BridgeResult<()>;
            fn unload_font(&self, face: &FontFace);
        }
    }

    mock! {
        Cache {}

        #[async_trait::async_trait]
        impl ResourceManager for Cache {
            async fn get_media(&self, uri: &str) -> BridgeResult<Option<String>>;
            fn release_media(&self, uri: &str);
        }
    }

    fn screen() -> Arc<dyn Renderer> {
        let mut screen = MockScreen::new();
        screen.expect_mount().returning(|_, _| Ok(()));
        screen.expect_unmount().returning(|_| ());
        screen.expect_apply_visual().returning(|_, _| Ok(()));
        screen.expect_control_media().returning(|_, _| Ok(()));
        Arc::new(screen)
    }

    fn slot(id: &str, ms: u64) -> Layer {
        Layer::new(Some(id.to_string()), None).with_slack(ms)
    }

    fn start(layers: Vec<Layer>, loop_enabled: bool) -> (Timeline, EventStream) {
        let events = EventBus::new(1024);
        let stream = EventStream::new(events.subscribe());
        let timeline = Timeline::spawn(
            Playlist {
                layers,
                loop_enabled,
            },
            Surface::new(screen(), Container::new("screen")),
            events,
            Arc::new(PlaybackConfig::default()),
            false,
        );
        (timeline, stream)
    }

    fn playback(events: &mut EventStream) -> Vec<PlaybackEvent> {
        events
            .drain()
            .into_iter()
            .filter_map(|event| match event {
                CoreEvent::Playback(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    fn started(events: &[PlaybackEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|event| match event {
                PlaybackEvent::ItemStarted { layer_id, .. } => Some(layer_id.clone()),
                _ => None,
            })
            .collect()
    }

    #[core_async::test(start_paused)]
    async fn test_plays_every_layer_then_completes_once() {
        let (timeline, mut events) = start(vec![slot("a", 1000), slot("b", 1000)], false);
        timeline.play().await.unwrap();
        sleep(Duration::from_millis(3000)).await;

        let seen = playback(&mut events);
        assert_eq!(started(&seen), vec!["a", "b"]);
        let completed = seen
            .iter()
            .filter(|e| matches!(e, PlaybackEvent::Completed))
            .count();
        assert_eq!(completed, 1);
        assert_eq!(timeline.status().state, PlaybackState::Completed);
    }

    #[core_async::test(start_paused)]
    async fn test_loop_wraps_to_first_layer() {
        let (timeline, mut events) = start(vec![slot("a", 500), slot("b", 500)], true);
        timeline.play().await.unwrap();
        sleep(Duration::from_millis(2200)).await;

        let seen = playback(&mut events);
        assert_eq!(&started(&seen)[..4], ["a", "b", "a", "b"]);
        assert!(seen.contains(&PlaybackEvent::Looped { pass: 1 }));
        assert!(!seen.contains(&PlaybackEvent::Completed));
        assert_eq!(timeline.status().state, PlaybackState::Playing);
    }

    #[core_async::test(start_paused)]
    async fn test_loop_shorter_than_a_tick_keeps_playing() {
        let (timeline, mut events) = start(vec![slot("a", 5), slot("b", 5), slot("c", 5)], true);
        timeline.play().await.unwrap();
        sleep(Duration::from_millis(1000)).await;

        let seen = playback(&mut events);
        assert!(!seen
            .iter()
            .any(|e| matches!(e, PlaybackEvent::Error { .. })));
        assert!(seen
            .iter()
            .any(|e| matches!(e, PlaybackEvent::Looped { pass } if *pass > 1)));
        let status = timeline.status();
        assert_eq!(status.state, PlaybackState::Playing);
        assert!(status.current_time_ms < 15);
    }

    #[core_async::test(start_paused)]
    async fn test_huge_durations_do_not_stop_the_timeline() {
        let half = u64::MAX / 2 + 1;
        let (timeline, _events) = start(vec![slot("a", half), slot("b", half)], false);

        assert_eq!(timeline.seek(10).await.unwrap(), 10);
        assert_eq!(timeline.status().duration_ms, u64::MAX);
        timeline.play().await.unwrap();
        sleep(Duration::from_millis(200)).await;
        assert_eq!(timeline.status().state, PlaybackState::Playing);
        assert_eq!(timeline.seek(half + 5).await.unwrap(), half + 5);
        assert_eq!(timeline.status().index, Some(1));
    }

    #[core_async::test]
    async fn test_duration_watcher_reports_once_resolved() {
        let (notices, mut received) = mpsc::unbounded_channel();
        let _guard = watch_duration("intro".to_string(), ready_duration(1200), notices);

        assert!(matches!(
            received.recv().await,
            Some(Notice::DurationResolved { ref layer_id, duration_ms: 1200 }) if layer_id == "intro"
        ));
    }

    #[core_async::test]
    async fn test_dropping_watcher_guard_stops_waiting() {
        let (notices, mut received) = mpsc::unbounded_channel();
        let guard = watch_duration(
            "stalled".to_string(),
            lazy_duration(future::pending::<u64>()),
            notices,
        );

        drop(guard);
        // The watcher task exits and drops the only sender.
        assert!(received.recv().await.is_none());
    }

    #[core_async::test(start_paused)]
    async fn test_seek_lands_in_slot_and_clamps() {
        let (timeline, _events) = start(vec![slot("a", 2000), slot("b", 3000)], false);

        assert_eq!(timeline.seek(2500).await.unwrap(), 2500);
        let status = timeline.status();
        assert_eq!(status.index, Some(1));
        assert_eq!(status.current_time_ms, 2500);
        assert_eq!(status.state, PlaybackState::Paused);

        assert_eq!(timeline.seek(99_000).await.unwrap(), 5000);
    }

    #[core_async::test(start_paused)]
    async fn test_seek_while_playing_keeps_playing() {
        let (timeline, _events) = start(vec![slot("a", 2000), slot("b", 3000)], false);
        timeline.play().await.unwrap();
        sleep(Duration::from_millis(200)).await;

        timeline.seek(3000).await.unwrap();
        assert_eq!(timeline.status().state, PlaybackState::Playing);
        sleep(Duration::from_millis(500)).await;
        assert!(timeline.status().current_time_ms >= 3400);
    }

    #[core_async::test(start_paused)]
    async fn test_empty_playlist_completes_on_play() {
        let (timeline, mut events) = start(Vec::new(), false);
        timeline.play().await.unwrap();

        assert_eq!(timeline.status().state, PlaybackState::Completed);
        assert_eq!(timeline.status().index, None);
        assert!(playback(&mut events).contains(&PlaybackEvent::Completed));
    }

    #[core_async::test(start_paused)]
    async fn test_insert_and_remove_layers() {
        let (timeline, mut events) = start(vec![slot("a", 1000)], false);
        let err = timeline.insert_layer(0, slot("a", 500)).await.unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidOptions { .. }));

        timeline.insert_layer(9, slot("b", 500)).await.unwrap();
        assert_eq!(timeline.status().duration_ms, 1500);

        timeline.play().await.unwrap();
        timeline.remove_layer("a").await.unwrap();
        assert_eq!(started(&playback(&mut events)), vec!["a", "b"]);
        assert_eq!(timeline.status().index, Some(0));

        let err = timeline.remove_layer("missing").await.unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidOptions { .. }));
    }

    #[core_async::test(start_paused)]
    async fn test_commands_fail_after_dispose() {
        let (timeline, _events) = start(vec![slot("a", 1000)], false);
        timeline.dispose().await.unwrap();

        assert!(matches!(
            timeline.play().await,
            Err(PlaybackError::TimelineClosed)
        ));
        assert!(timeline.dispose().await.is_ok());
    }

    #[core_async::test]
    async fn test_playlist_from_document() {
        let deps = WidgetDeps::new(
            Arc::new(MockCache::new()),
            Arc::new(NoopProbe),
            screen(),
            Arc::new(PlaybackConfig::default()),
        );
        let doc = json!({
            "loop": true,
            "items": [
                { "id": "x", "duration": 1000, "widget": { "type": "image", "opts": { "uri": "a.png" } } },
                { "type": "text", "opts": { "text": "hello" } }
            ]
        });
        let playlist = Playlist::from_json(&doc, &deps).unwrap();
        assert!(playlist.loop_enabled);
        assert_eq!(playlist.layers.len(), 2);
        assert_eq!(playlist.layers[0].id(), "x");
        assert_eq!(playlist.layers[0].resolved_duration(), Some(1000));

        let duplicate = json!([
            { "id": "x", "type": "text", "opts": { "text": "a" } },
            { "id": "x", "type": "text", "opts": { "text": "b" } }
        ]);
        assert!(matches!(
            Playlist::from_json(&duplicate, &deps),
            Err(PlaybackError::MalformedDocument(_))
        ));
        assert!(matches!(
            Playlist::from_json(&json!("nope"), &deps),
            Err(PlaybackError::MalformedDocument(_))
        ));
    }
}
