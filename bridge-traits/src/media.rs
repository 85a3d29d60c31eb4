//! Media resolution and probing contracts.
//!
//! The device shell owns the media cache. The core only asks it to resolve a
//! source URI into something the renderer can display, and tells it when that
//! interest goes away. De-duplication and eviction stay on the host side.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Resolves remote media URIs into locally playable URLs.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::media::ResourceManager;
///
/// async fn resolve(resources: &dyn ResourceManager) {
///     match resources.get_media("https://cdn.example.com/a.png").await {
///         Ok(Some(url)) => println!("cached at {url}"),
///         Ok(None) => println!("not available"),
///         Err(e) => eprintln!("lookup failed: {e}"),
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait ResourceManager: Send + Sync {
    /// Resolve `uri` to a local URL, or `None` when the asset is unavailable.
    async fn get_media(&self, uri: &str) -> Result<Option<String>>;

    /// Drop one unit of logical interest in `uri`.
    ///
    /// Called once for every successful `get_media` when the owning widget
    /// unloads. The default does nothing.
    fn release_media(&self, _uri: &str) {}
}

/// Intrinsic properties of a decoded media file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub duration_ms: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl MediaMetadata {
    pub fn with_duration(duration_ms: u64) -> Self {
        Self {
            duration_ms: Some(duration_ms),
            ..Self::default()
        }
    }
}

/// Reads intrinsic metadata (mainly video duration) from a resolved URL.
#[async_trait::async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<MediaMetadata>;
}

/// Probe used when the host has no way to inspect media.
///
/// Always reports empty metadata, so widgets fall back to configured or
/// default durations.
#[derive(Debug, Clone, Default)]
pub struct NoopProbe;

#[async_trait::async_trait]
impl MediaProbe for NoopProbe {
    async fn probe(&self, _url: &str) -> Result<MediaMetadata> {
        Ok(MediaMetadata::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use mockall::mock;

    mock! {
        Resources {}

        #[async_trait::async_trait]
        impl ResourceManager for Resources {
            async fn get_media(&self, uri: &str) -> Result<Option<String>>;
            fn release_media(&self, uri: &str);
        }
    }

    #[core_async::test]
    async fn noop_probe_reports_nothing() {
        let meta = NoopProbe.probe("file:///clip.mp4").await.unwrap();
        assert_eq!(meta, MediaMetadata::default());
        assert!(meta.duration_ms.is_none());
    }

    #[core_async::test]
    async fn resource_manager_is_object_safe() {
        let mut mock = MockResources::new();
        mock.expect_get_media()
            .withf(|uri| uri == "https://cdn/a.png")
            .returning(|_| Ok(Some("file:///cache/a.png".to_string())));
        mock.expect_get_media()
            .withf(|uri| uri != "https://cdn/a.png")
            .returning(|uri| Err(BridgeError::MediaNotFound(uri.to_string())));

        let resources: Box<dyn ResourceManager> = Box::new(mock);
        assert_eq!(
            resources.get_media("https://cdn/a.png").await.unwrap(),
            Some("file:///cache/a.png".to_string())
        );
        assert!(resources.get_media("https://cdn/missing.png").await.is_err());
    }
}
