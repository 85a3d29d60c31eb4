//! # Asset Acquisition
//!
//! Widgets never talk to the resource manager directly. Each media URI a
//! widget needs is held in an [`AssetSlot`], and every font face goes through
//! the shared [`FontRegistry`].
//!
//! ## Slots
//!
//! `acquire()` is idempotent: concurrent callers share the same in-flight
//! lookup, a resolved slot answers immediately, and a failed slot retries on
//! the next call. `release()` hands the logical interest back to the host.
//!
//! ## Fonts
//!
//! Font faces are shared by every text widget on screen, so they are
//! reference counted by identity. A face is unloaded from the renderer only
//! when the last widget using it releases it.

use crate::error::{PlaybackError, Result};
use bridge_traits::{FontFace, Renderer, ResourceManager};
use core_runtime::logging::redact_uri;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

// ============================================================================
// Asset Slot
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum AssetFailure {
    Unavailable,
    Failed(String),
}

type SharedLookup = Shared<BoxFuture<'static, std::result::Result<String, AssetFailure>>>;

enum SlotState {
    Idle,
    Loading(SharedLookup),
    /// Released while the lookup was still running.
    Orphaned(SharedLookup),
    Ready(String),
    Failed(AssetFailure),
}

struct SlotInner {
    uri: String,
    resources: Arc<dyn ResourceManager>,
    state: Mutex<SlotState>,
}

/// One media URI a widget depends on.
#[derive(Clone)]
pub struct AssetSlot {
    inner: Arc<SlotInner>,
}

impl AssetSlot {
    pub fn new(uri: impl Into<String>, resources: Arc<dyn ResourceManager>) -> Self {
        Self {
            inner: Arc::new(SlotInner {
                uri: uri.into(),
                resources,
                state: Mutex::new(SlotState::Idle),
            }),
        }
    }

    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    /// Resolved local URL, if the slot is ready.
    pub fn url(&self) -> Option<String> {
        match &*self.inner.state.lock() {
            SlotState::Ready(url) => Some(url.clone()),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.inner.state.lock(), SlotState::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(&*self.inner.state.lock(), SlotState::Failed(_))
    }

    /// Why the last lookup failed, until the next `acquire()` or `release()`.
    pub fn last_error(&self) -> Option<PlaybackError> {
        match &*self.inner.state.lock() {
            SlotState::Failed(failure) => Some(self.error(failure.clone())),
            _ => None,
        }
    }

    /// Resolve the URI through the resource manager.
    pub async fn acquire(&self) -> Result<String> {
        let lookup = {
            let mut state = self.inner.state.lock();
            match &*state {
                SlotState::Ready(url) => return Ok(url.clone()),
                SlotState::Loading(lookup) => lookup.clone(),
                SlotState::Orphaned(lookup) => {
                    let lookup = lookup.clone();
                    *state = SlotState::Loading(lookup.clone());
                    lookup
                }
                SlotState::Idle | SlotState::Failed(_) => {
                    if let SlotState::Failed(previous) = &*state {
                        debug!(
                            uri = redact_uri(&self.inner.uri),
                            previous = ?previous,
                            "Retrying media lookup"
                        );
                    }
                    let lookup = self.start_lookup();
                    *state = SlotState::Loading(lookup.clone());
                    lookup
                }
            }
        };

        let outcome = lookup.clone().await;

        {
            let mut state = self.inner.state.lock();
            match &*state {
                // Only the lookup we awaited may settle the slot.
                SlotState::Loading(current) if current.ptr_eq(&lookup) => {
                    *state = match &outcome {
                        Ok(url) => SlotState::Ready(url.clone()),
                        Err(failure) => SlotState::Failed(failure.clone()),
                    };
                }
                SlotState::Orphaned(current) if current.ptr_eq(&lookup) => {
                    if outcome.is_ok() {
                        self.inner.resources.release_media(&self.inner.uri);
                    }
                    *state = SlotState::Idle;
                }
                _ => {}
            }
        }

        outcome.map_err(|failure| self.error(failure))
    }

    /// Give the interest back. Safe to call in any state.
    pub fn release(&self) {
        let mut state = self.inner.state.lock();
        match std::mem::replace(&mut *state, SlotState::Idle) {
            SlotState::Ready(_) => {
                debug!(uri = redact_uri(&self.inner.uri), "Releasing media");
                self.inner.resources.release_media(&self.inner.uri);
            }
            SlotState::Loading(lookup) | SlotState::Orphaned(lookup) => {
                *state = SlotState::Orphaned(lookup);
            }
            SlotState::Idle | SlotState::Failed(_) => {}
        }
    }

    fn start_lookup(&self) -> SharedLookup {
        let resources = Arc::clone(&self.inner.resources);
        let uri = self.inner.uri.clone();
        async move {
            match resources.get_media(&uri).await {
                Ok(Some(url)) => Ok(url),
                Ok(None) => Err(AssetFailure::Unavailable),
                Err(e) => Err(AssetFailure::Failed(e.to_string())),
            }
        }
        .boxed()
        .shared()
    }

    fn error(&self, failure: AssetFailure) -> PlaybackError {
        let uri = redact_uri(&self.inner.uri).to_string();
        match failure {
            AssetFailure::Unavailable => PlaybackError::AssetUnavailable(uri),
            AssetFailure::Failed(message) => PlaybackError::AssetLoad { uri, message },
        }
    }
}

impl std::fmt::Debug for AssetSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetSlot")
            .field("uri", &redact_uri(&self.inner.uri))
            .field("ready", &self.is_ready())
            .finish()
    }
}

// ============================================================================
// Font Registry
// ============================================================================

type SharedFontLoad = Shared<BoxFuture<'static, std::result::Result<(), String>>>;

struct FontEntry {
    refs: usize,
    load: SharedFontLoad,
}

/// Reference-counted font faces shared by all text widgets.
pub struct FontRegistry {
    renderer: Arc<dyn Renderer>,
    resources: Arc<dyn ResourceManager>,
    entries: Mutex<HashMap<FontFace, FontEntry>>,
}

impl FontRegistry {
    pub fn new(renderer: Arc<dyn Renderer>, resources: Arc<dyn ResourceManager>) -> Self {
        Self {
            renderer,
            resources,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Take one reference on `face`, loading it on first use.
    ///
    /// On failure the reference is not kept.
    pub async fn acquire(&self, face: &FontFace) -> Result<()> {
        let load = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(face.clone()).or_insert_with(|| FontEntry {
                refs: 0,
                load: self.start_load(face),
            });
            // A previous attempt failed; try again.
            if matches!(entry.load.peek(), Some(Err(_))) {
                entry.load = self.start_load(face);
            }
            entry.refs += 1;
            entry.load.clone()
        };

        // Released if this future is dropped before the load settles.
        let lease = FontLease {
            registry: self,
            face,
            armed: true,
        };

        match load.await {
            Ok(()) => {
                lease.keep();
                Ok(())
            }
            Err(message) => {
                warn!(family = %face.family, error = %message, "Font load failed");
                Err(PlaybackError::AssetLoad {
                    uri: redact_uri(&face.uri).to_string(),
                    message,
                })
            }
        }
    }

    /// Drop one reference; the face is unloaded when none remain.
    pub fn release(&self, face: &FontFace) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(face) else {
            return;
        };
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs > 0 {
            return;
        }
        if let Some(entry) = entries.remove(face) {
            if matches!(entry.load.peek(), Some(Ok(()))) {
                debug!(family = %face.family, "Unloading font face");
                self.renderer.unload_font(face);
                self.resources.release_media(&face.uri);
            }
        }
    }

    /// Current reference count of `face`.
    pub fn refs(&self, face: &FontFace) -> usize {
        self.entries.lock().get(face).map(|e| e.refs).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn start_load(&self, face: &FontFace) -> SharedFontLoad {
        let renderer = Arc::clone(&self.renderer);
        let resources = Arc::clone(&self.resources);
        let face = face.clone();
        async move {
            let url = match resources.get_media(&face.uri).await {
                Ok(Some(url)) => url,
                Ok(None) => return Err(format!("{} is not available", redact_uri(&face.uri))),
                Err(e) => return Err(e.to_string()),
            };
            if let Err(e) = renderer.load_font(&face, &url).await {
                resources.release_media(&face.uri);
                return Err(e.to_string());
            }
            Ok(())
        }
        .boxed()
        .shared()
    }
}

struct FontLease<'a> {
    registry: &'a FontRegistry,
    face: &'a FontFace,
    armed: bool,
}

impl FontLease<'_> {
    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for FontLease<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.release(self.face);
        }
    }
}
