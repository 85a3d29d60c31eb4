//! # Event Bus System
//!
//! Typed event channel between the playback engine and the code around it
//! (UI chrome, telemetry, the device event log), built on
//! `core_async::sync::broadcast`.
//!
//! ```text
//! ┌──────────┐   emit    ┌───────────┐   subscribe   ┌────────────┐
//! │ Timeline ├──────────>│           ├──────────────>│ Seek bar   │
//! └──────────┘           │ EventBus  │               └────────────┘
//! ┌──────────┐   emit    │ (broadcast│   subscribe   ┌────────────┐
//! │ Prefetch ├──────────>│  channel) ├──────────────>│ Telemetry  │
//! └──────────┘           └───────────┘               └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
//!
//! let bus = EventBus::new(64);
//! let mut rx = bus.subscribe();
//! bus.emit(CoreEvent::Playback(PlaybackEvent::Time { elapsed_ms: 50 })).ok();
//! assert!(matches!(
//!     rx.try_recv(),
//!     Ok(CoreEvent::Playback(PlaybackEvent::Time { elapsed_ms: 50 }))
//! ));
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events. `Time`
//!   events are emitted on every clock tick, so slow consumers will see
//!   this; it is not fatal.
//! - **`RecvError::Closed`**: every sender is gone, the player shut down.
//!
//! `emit` fails only when nobody is subscribed; producers call `.ok()` on it.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Sized for several seconds of 50 ms `Time` events.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Playback(PlaybackEvent),
    Asset(AssetEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Asset(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Playback(PlaybackEvent::Error {
                recoverable: false, ..
            }) => EventSeverity::Error,
            CoreEvent::Playback(PlaybackEvent::Error { .. })
            | CoreEvent::Playback(PlaybackEvent::ItemSkipped { .. })
            | CoreEvent::Asset(AssetEvent::PrefetchFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Playback(PlaybackEvent::Completed)
            | CoreEvent::Playback(PlaybackEvent::StateChanged { .. })
            | CoreEvent::Playback(PlaybackEvent::ItemStarted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Whether this is the per-tick `Time` event.
    ///
    /// Subscribers that only care about state transitions filter these out.
    pub fn is_tick(&self) -> bool {
        matches!(self, CoreEvent::Playback(PlaybackEvent::Time { .. }))
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Playback State
// ============================================================================

/// Lifecycle of one playback session.
///
/// `Idle → Loading → Showing → Playing ⇄ Paused → Completed`, with
/// `Stopped` and `Error` reachable from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Loading,
    Showing,
    Playing,
    Paused,
    Stopped,
    Completed,
    Error,
}

impl PlaybackState {
    /// The clock is (or is about to be) advancing.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PlaybackState::Loading | PlaybackState::Showing | PlaybackState::Playing
        )
    }

    /// Playback needs an explicit `play()` or `seek()` to continue.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlaybackState::Stopped | PlaybackState::Completed | PlaybackState::Error
        )
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading => "loading",
            PlaybackState::Showing => "showing",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
            PlaybackState::Completed => "completed",
            PlaybackState::Error => "error",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Playback Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// Session state transition.
    StateChanged { state: PlaybackState },
    /// Master clock tick; `elapsed_ms` is the timeline position.
    Time { elapsed_ms: u64 },
    /// Position inside the active layer, emitted after seeks and when a
    /// container reports internal progress (carousel slide, list page).
    Offset {
        layer_id: String,
        offset_ms: u64,
        internal_offset: u64,
    },
    /// A layer became the active, mounted layer.
    ItemStarted { index: usize, layer_id: String },
    /// A layer failed to show and was skipped for this pass.
    ItemSkipped {
        index: usize,
        layer_id: String,
        reason: String,
    },
    /// Best-effort total duration changed as children resolved.
    DurationChanged { total_ms: u64 },
    /// Playback wrapped back to the first layer.
    Looped { pass: u64 },
    /// The playlist reached its end with looping disabled. Emitted once.
    Completed,
    Error { message: String, recoverable: bool },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::StateChanged { .. } => "Playback state changed",
            PlaybackEvent::Time { .. } => "Clock tick",
            PlaybackEvent::Offset { .. } => "Layer offset changed",
            PlaybackEvent::ItemStarted { .. } => "Layer started",
            PlaybackEvent::ItemSkipped { .. } => "Layer skipped",
            PlaybackEvent::DurationChanged { .. } => "Timeline duration changed",
            PlaybackEvent::Looped { .. } => "Timeline looped",
            PlaybackEvent::Completed => "Timeline completed",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }
}

// ============================================================================
// Asset Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AssetEvent {
    /// The next layer finished loading ahead of its slot.
    Prefetched { layer_id: String, elapsed_ms: u64 },
    PrefetchFailed { layer_id: String, message: String },
}

impl AssetEvent {
    fn description(&self) -> &str {
        match self {
            AssetEvent::Prefetched { .. } => "Layer prefetched",
            AssetEvent::PrefetchFailed { .. } => "Layer prefetch failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus. Clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    ///
    /// A subscriber that falls more than `capacity` events behind receives
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// when there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new receiver. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream};
///
/// let bus = EventBus::new(16);
/// let transitions = EventStream::new(bus.subscribe()).filter(|e| !e.is_tick());
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    /// Drains every buffered matching event, skipping over lag gaps.
    pub fn drain(&mut self) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        while let Some(result) = self.try_recv() {
            match result {
                Ok(event) => events.push(event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        events
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
