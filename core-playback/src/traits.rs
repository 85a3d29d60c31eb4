//! # Playable Contract
//!
//! Every widget and every [`Layer`](crate::layer::Layer) implements [`Playable`].
//! The contract is uniform so containers can treat leaves and nested containers
//! the same way.
//!
//! ## Clock Model
//!
//! Playback is driven by a stream of [`Tick`]s. Each tick carries the elapsed
//! time *within the receiver's own slot*, so a widget never needs to know where
//! it sits on the master timeline. `play()` returns a [`PlayStream`] of
//! [`PlaySignal`]s that ends when the clock ends or the widget reaches its own
//! end condition.
//!
//! ## Durations
//!
//! `duration()` returns a [`DurationFuture`]: a cloneable, single-value future.
//! Statically known durations are already resolved (see [`ready_duration`]) and
//! can be read synchronously with [`peek_duration`]; media-dependent durations
//! resolve after metadata is available.
//!
//! ```rust,ignore
//! let duration = widget.duration();
//! let estimate = peek_duration(&duration).unwrap_or(0);
//! let exact = duration.await;
//! ```

use crate::error::Result;
use async_trait::async_trait;
use bridge_traits::{Container, Renderer};
use futures::channel::mpsc;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use futures::stream::{self, BoxStream, SelectAll, StreamExt};
use std::future::Future;
use std::sync::Arc;

// ============================================================================
// Durations
// ============================================================================

/// Lazy, cloneable, single-value duration in milliseconds.
pub type DurationFuture = Shared<BoxFuture<'static, u64>>;

/// A duration that is known up front.
///
/// The returned future is already complete, so [`peek_duration`] sees it.
pub fn ready_duration(ms: u64) -> DurationFuture {
    let duration = future::ready(ms).boxed().shared();
    // Drive the shared state to completion so `peek()` works immediately.
    let _ = duration.clone().now_or_never();
    duration
}

/// A duration that resolves once `fut` completes.
pub fn lazy_duration<F>(fut: F) -> DurationFuture
where
    F: Future<Output = u64> + Send + 'static,
{
    fut.boxed().shared()
}

/// The resolved value, if the duration is already known.
pub fn peek_duration(duration: &DurationFuture) -> Option<u64> {
    duration.peek().copied()
}

/// Combine several durations with `reduce`.
///
/// Stays synchronously readable when every input is.
pub fn combine_durations(parts: Vec<DurationFuture>, reduce: fn(&[u64]) -> u64) -> DurationFuture {
    let known: Option<Vec<u64>> = parts.iter().map(peek_duration).collect();
    match known {
        Some(values) => ready_duration(reduce(&values)),
        None => lazy_duration(async move {
            let values = future::join_all(parts).await;
            reduce(&values)
        }),
    }
}

pub(crate) fn max_of(values: &[u64]) -> u64 {
    values.iter().copied().max().unwrap_or(0)
}

// ============================================================================
// Clock and Signals
// ============================================================================

/// One clock tick: elapsed milliseconds within the receiver's slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub elapsed_ms: u64,
}

impl Tick {
    pub fn at(elapsed_ms: u64) -> Self {
        Self { elapsed_ms }
    }
}

pub type TickStream = BoxStream<'static, Tick>;

/// Signal produced while a playable is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaySignal {
    /// Position reached, in milliseconds.
    Progress(u64),
    /// Sub-component position changed (slide, page).
    Internal(u64),
    /// The playable reached its end.
    Ended,
}

pub type PlayStream = BoxStream<'static, PlaySignal>;

/// Result of a seek: where the playable landed and its sub-component index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeekResult {
    pub offset_ms: u64,
    pub internal_offset: u64,
}

impl SeekResult {
    pub fn new(offset_ms: u64, internal_offset: u64) -> Self {
        Self {
            offset_ms,
            internal_offset,
        }
    }
}

/// Completion signal of `show()`.
///
/// Rendering failures are reported as a token instead of an error so the
/// owner can skip the item and keep going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowOutcome {
    Shown,
    Error(String),
}

impl ShowOutcome {
    pub fn is_shown(&self) -> bool {
        matches!(self, ShowOutcome::Shown)
    }
}

/// Where a playable mounts itself: renderer handle plus target container.
#[derive(Clone)]
pub struct Surface {
    pub renderer: Arc<dyn Renderer>,
    pub container: Container,
}

impl Surface {
    pub fn new(renderer: Arc<dyn Renderer>, container: Container) -> Self {
        Self {
            renderer,
            container,
        }
    }

    /// Surface for a nested region of this one.
    pub fn child(&self, name: impl AsRef<str>) -> Self {
        Self {
            renderer: Arc::clone(&self.renderer),
            container: self.container.child(name),
        }
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Playable
// ============================================================================

/// Capability contract shared by every widget, container and layer.
#[async_trait]
pub trait Playable: Send + Sync {
    /// Widget name used in logs.
    fn name(&self) -> &str;

    /// Begin acquiring assets. Idempotent; concurrent calls share one load.
    async fn load(&self) -> Result<()>;

    /// Release acquired assets. Safe to call when never loaded.
    fn unload(&self);

    /// Playback length in milliseconds. Always resolves, falling back to a
    /// configured default when the asset cannot be inspected.
    fn duration(&self) -> DurationFuture;

    /// Start driving playback from `clock`.
    ///
    /// Dropping the returned stream cancels playback without further side
    /// effects.
    fn play(self: Arc<Self>, clock: TickStream) -> PlayStream;

    /// Halt playback. Idempotent.
    fn stop(&self);

    /// Reposition to `offset_ms` without starting playback.
    fn seek(&self, offset_ms: u64) -> SeekResult;

    /// Mount into `surface` starting at `offset_ms`.
    async fn show(&self, surface: &Surface, offset_ms: u64) -> ShowOutcome;

    /// Unmount. Safe to call repeatedly.
    fn hide(&self);
}

// ============================================================================
// Stream Helpers
// ============================================================================

/// Progress stream for a leaf with a known or lazily known duration.
///
/// Emits `Progress` per tick and a single `Ended` once the duration is
/// reached. A zero or unresolved duration never ends on its own.
pub fn leaf_play(clock: TickStream, duration: DurationFuture) -> PlayStream {
    clock
        .flat_map(move |tick| {
            let signals = match peek_duration(&duration).filter(|d| *d > 0) {
                Some(end) if tick.elapsed_ms >= end => {
                    vec![PlaySignal::Progress(end), PlaySignal::Ended]
                }
                _ => vec![PlaySignal::Progress(tick.elapsed_ms)],
            };
            stream::iter(signals)
        })
        .scan(false, |ended, signal| {
            if *ended {
                return future::ready(None);
            }
            *ended = signal == PlaySignal::Ended;
            future::ready(Some(signal))
        })
        .boxed()
}

/// Per-child clocks fed from one parent clock.
///
/// Every child receives the same tick; closing the parent closes every child.
pub struct ChildClocks {
    senders: Vec<mpsc::UnboundedSender<Tick>>,
    streams: SelectAll<PlayStream>,
}

impl ChildClocks {
    pub fn start(children: &[Arc<dyn Playable>]) -> Self {
        let mut clocks = Self {
            senders: Vec::with_capacity(children.len()),
            streams: SelectAll::new(),
        };
        clocks.restart(children);
        clocks
    }

    /// Drop the current child clocks and start `children` on fresh ones.
    pub fn restart(&mut self, children: &[Arc<dyn Playable>]) {
        self.senders.clear();
        self.streams = SelectAll::new();
        for child in children {
            let (tx, rx) = mpsc::unbounded();
            self.senders.push(tx);
            self.streams.push(Arc::clone(child).play(rx.boxed()));
        }
    }

    pub fn forward(&self, tick: Tick) {
        for tx in &self.senders {
            // A child that already ended has dropped its receiver.
            let _ = tx.unbounded_send(tick);
        }
    }

    pub fn is_idle(&self) -> bool {
        self.streams.is_empty()
    }

    /// Next child signal; pending forever when no child is playing.
    pub async fn next_signal(&mut self) -> Option<PlaySignal> {
        if self.streams.is_empty() {
            return future::pending().await;
        }
        self.streams.next().await
    }
}

enum FanWake {
    Tick(Option<Tick>),
    Child(Option<PlaySignal>),
}

/// Drive `children` from `clock`, all on the same tick.
///
/// Yields `Progress` per parent tick, forwards children's `Internal` signals
/// and emits exactly one `Ended` when the parent clock completes.
pub fn fan_out(clock: TickStream, children: &[Arc<dyn Playable>]) -> PlayStream {
    let kids = ChildClocks::start(children);
    stream::unfold(Some((clock, kids)), |state| async move {
        let (mut clock, mut kids) = state?;
        loop {
            let wake = core_async::select! {
                tick = clock.next() => FanWake::Tick(tick),
                signal = kids.next_signal() => FanWake::Child(signal),
            };
            match wake {
                FanWake::Tick(Some(tick)) => {
                    kids.forward(tick);
                    return Some((PlaySignal::Progress(tick.elapsed_ms), Some((clock, kids))));
                }
                FanWake::Tick(None) => return Some((PlaySignal::Ended, None)),
                FanWake::Child(Some(PlaySignal::Internal(value))) => {
                    return Some((PlaySignal::Internal(value), Some((clock, kids))));
                }
                FanWake::Child(Some(_)) => {}
                // Every child finished; only the parent clock matters now.
                FanWake::Child(None) => kids.restart(&[]),
            }
        }
    })
    .boxed()
}
