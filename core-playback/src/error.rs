//! # Playback Error Types
//!
//! Errors are grouped by how far they are allowed to travel:
//! construction errors abort document loading, asset errors are contained by
//! the owning layer, timing errors are clamped, and fatal errors stop the
//! timeline until it is explicitly restarted.

use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Construction Errors
    // ========================================================================
    /// The `type` discriminant does not name a known widget.
    #[error("Unknown widget type '{tag}' at {path}")]
    UnknownWidgetType { tag: String, path: String },

    /// Widget options failed to parse or validate.
    #[error("Invalid options for {widget} at {path}: {message}")]
    InvalidOptions {
        widget: String,
        path: String,
        message: String,
    },

    /// The document is not shaped like a playlist or widget tree.
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Unknown transition: {0}")]
    UnknownTransition(String),

    #[error("Widget tree exceeds {limit} nodes")]
    TreeTooLarge { limit: usize },

    // ========================================================================
    // Asset Errors
    // ========================================================================
    /// The resource manager has no local copy of the asset.
    #[error("Asset unavailable: {0}")]
    AssetUnavailable(String),

    #[error("Failed to load asset {uri}: {message}")]
    AssetLoad { uri: String, message: String },

    // ========================================================================
    // Timing Errors
    // ========================================================================
    /// Reported only; seeks clamp into range instead of failing.
    #[error("Seek target {target_ms}ms is outside 0..={total_ms}ms")]
    SeekOutOfRange { target_ms: u64, total_ms: u64 },

    /// A newer command replaced this one before it completed.
    #[error("Operation superseded by a newer command")]
    Superseded,

    // ========================================================================
    // Fatal Errors
    // ========================================================================
    /// The scheduler's clock state is inconsistent.
    #[error("Clock fault: {0}")]
    ClockFault(String),

    /// The timeline task is gone (disposed or panicked).
    #[error("Timeline is closed")]
    TimelineClosed,

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Errors raised while turning a document into widgets.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::UnknownWidgetType { .. }
                | PlaybackError::InvalidOptions { .. }
                | PlaybackError::MalformedDocument(_)
                | PlaybackError::UnknownTransition(_)
                | PlaybackError::TreeTooLarge { .. }
                | PlaybackError::Json(_)
        )
    }

    pub fn is_asset_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::AssetUnavailable(_) | PlaybackError::AssetLoad { .. }
        )
    }

    /// Errors that stop playback until `play()` or `seek()` is called.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PlaybackError::ClockFault(_) | PlaybackError::TimelineClosed
        )
    }

    /// Returns `true` if retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            PlaybackError::AssetLoad { .. } | PlaybackError::Superseded => true,
            PlaybackError::Bridge(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
