//! # Core Configuration Module
//!
//! Builder for [`CoreConfig`], the bundle of host bridges and runtime
//! settings the player core is started with. The builder fails fast: a
//! configuration without the required bridges never reaches playback.
//!
//! ## Required Dependencies
//!
//! - `ResourceManager` - Resolves media URIs through the host cache
//! - `Renderer` - Owns the screen
//!
//! ## Optional Dependencies
//!
//! - `MediaProbe` - Intrinsic media metadata (default: [`NoopProbe`])
//! - `LoggerSink` - Host log pipeline
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .resource_manager(Arc::new(HostCache::new()))
//!     .renderer(Arc::new(DomRenderer::new()))
//!     .event_buffer_size(512)
//!     .enable_prefetch(true)
//!     .build()?;
//! ```

use crate::device_log::DEFAULT_DEVICE_LOG_CAPACITY;
use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{LoggerSink, MediaProbe, NoopProbe, Renderer, ResourceManager};
use std::sync::Arc;

/// Host bridges and runtime settings for one player instance.
#[derive(Clone)]
pub struct CoreConfig {
    pub resource_manager: Arc<dyn ResourceManager>,

    pub renderer: Arc<dyn Renderer>,

    /// Media metadata reader; falls back to [`NoopProbe`]
    pub media_probe: Arc<dyn MediaProbe>,

    /// Host log pipeline (optional)
    pub logger_sink: Option<Arc<dyn LoggerSink>>,

    /// Per-subscriber event buffer
    pub event_buffer_size: usize,

    /// Rows kept by the in-memory device event log
    pub device_log_capacity: usize,

    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("resource_manager", &"ResourceManager { ... }")
            .field("renderer", &"Renderer { ... }")
            .field("media_probe", &"MediaProbe { ... }")
            .field(
                "logger_sink",
                &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"),
            )
            .field("event_buffer_size", &self.event_buffer_size)
            .field("device_log_capacity", &self.device_log_capacity)
            .field("features", &self.features)
            .finish()
    }
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Load the next layer during the tail of the current one
    pub enable_prefetch: bool,

    /// Mirror logs and state events into the device event log
    pub enable_device_log: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_prefetch: true,
            enable_device_log: true,
        }
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size > 65_536 {
            return Err(Error::Config(
                "Event buffer size exceeds maximum of 65,536 events".to_string(),
            ));
        }

        if self.features.enable_device_log && self.device_log_capacity == 0 {
            return Err(Error::Config(
                "Device log enabled but capacity is 0. \
                 Disable the feature or set a positive capacity."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    resource_manager: Option<Arc<dyn ResourceManager>>,
    renderer: Option<Arc<dyn Renderer>>,
    media_probe: Option<Arc<dyn MediaProbe>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
    event_buffer_size: Option<usize>,
    device_log_capacity: Option<usize>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    pub fn resource_manager(mut self, resources: Arc<dyn ResourceManager>) -> Self {
        self.resource_manager = Some(resources);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn media_probe(mut self, probe: Arc<dyn MediaProbe>) -> Self {
        self.media_probe = Some(probe);
        self
    }

    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    /// Default: [`DEFAULT_EVENT_BUFFER_SIZE`]
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Default: [`DEFAULT_DEVICE_LOG_CAPACITY`]
    pub fn device_log_capacity(mut self, capacity: usize) -> Self {
        self.device_log_capacity = Some(capacity);
        self
    }

    pub fn enable_prefetch(mut self, enable: bool) -> Self {
        self.features.enable_prefetch = enable;
        self
    }

    pub fn enable_device_log(mut self, enable: bool) -> Self {
        self.features.enable_device_log = enable;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when `ResourceManager` or `Renderer`
    ///   was not provided
    /// - [`Error::Config`] when a setting is out of range
    pub fn build(self) -> Result<CoreConfig> {
        let resource_manager = self.resource_manager.ok_or_else(|| {
            Error::missing(
                "ResourceManager",
                "A ResourceManager is required to resolve media URIs. \
                 Inject the device shell's media cache adapter.",
            )
        })?;

        let renderer = self.renderer.ok_or_else(|| {
            Error::missing(
                "Renderer",
                "A Renderer is required to mount widgets on screen. \
                 Inject the device shell's renderer adapter.",
            )
        })?;

        let config = CoreConfig {
            resource_manager,
            renderer,
            media_probe: self.media_probe.unwrap_or_else(|| Arc::new(NoopProbe)),
            logger_sink: self.logger_sink,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            device_log_capacity: self
                .device_log_capacity
                .unwrap_or(DEFAULT_DEVICE_LOG_CAPACITY),
            features: self.features,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{Container, FontFace, MediaCommand, RenderNode, VisualState};

    struct NullResources;

    #[async_trait]
    impl ResourceManager for NullResources {
        async fn get_media(&self, uri: &str) -> BridgeResult<Option<String>> {
            Ok(Some(uri.to_string()))
        }
    }

    struct NullRenderer;

    #[async_trait]
    impl Renderer for NullRenderer {
        async fn mount(&self, _: &Container, _: RenderNode) -> BridgeResult<()> {
            Ok(())
        }
        fn unmount(&self, _: &Container) {}
        fn apply_visual(&self, _: &Container, _: &VisualState) -> BridgeResult<()> {
            Ok(())
        }
        fn control_media(&self, _: &Container, _: MediaCommand) -> BridgeResult<()> {
            Ok(())
        }
        async fn load_font(&self, _: &FontFace, _: &str) -> BridgeResult<()> {
            Ok(())
        }
        fn unload_font(&self, _: &FontFace) {}
    }

    fn complete_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .resource_manager(Arc::new(NullResources))
            .renderer(Arc::new(NullRenderer))
    }

    #[test]
    fn test_builder_defaults() {
        let config = complete_builder().build().unwrap();
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert_eq!(config.device_log_capacity, DEFAULT_DEVICE_LOG_CAPACITY);
        assert!(config.features.enable_prefetch);
        assert!(config.logger_sink.is_none());
    }

    #[test]
    fn test_missing_renderer_fails_fast() {
        let err = CoreConfig::builder()
            .resource_manager(Arc::new(NullResources))
            .build()
            .unwrap_err();

        match err {
            Error::CapabilityMissing { capability, .. } => assert_eq!(capability, "Renderer"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_resource_manager_fails_fast() {
        let err = CoreConfig::builder()
            .renderer(Arc::new(NullRenderer))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("ResourceManager"));
    }

    #[test]
    fn test_zero_event_buffer_rejected() {
        let err = complete_builder().event_buffer_size(0).build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_device_log_capacity_checked_only_when_enabled() {
        assert!(complete_builder().device_log_capacity(0).build().is_err());
        assert!(complete_builder()
            .device_log_capacity(0)
            .enable_device_log(false)
            .build()
            .is_ok());
    }

    #[test]
    fn test_debug_hides_bridges() {
        let config = complete_builder().build().unwrap();
        let debug = format!("{config:?}");
        assert!(debug.contains("Renderer { ... }"));
    }
}
