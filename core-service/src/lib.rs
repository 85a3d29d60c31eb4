//! Player service façade.
//!
//! Wires the host bridges from a [`CoreConfig`] into the playback engine and
//! owns the single active [`Timeline`]. Loading a new playlist builds it
//! completely before the previous one is disposed, so a malformed document
//! never blanks the screen.
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .resource_manager(Arc::new(HostCache::new()))
//!     .renderer(Arc::new(DomRenderer::new()))
//!     .build()?;
//! let player = PlayerService::new(config, PlaybackConfig::default())?;
//! player.init_logging()?;
//! let timeline = player.load_playlist(&playlist_json).await?;
//! timeline.play().await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use bridge_traits::Container;
use core_async::task::JoinHandle;
use core_playback::{PlaybackConfig, Surface, Timeline, WidgetDeps};
use core_runtime::config::CoreConfig;
use core_runtime::device_log::DeviceEventLog;
use core_runtime::events::{EventBus, EventStream, RecvError};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Container every timeline mounts its layers under.
pub const ROOT_CONTAINER: &str = "screen";

/// Primary façade exposed to device shells.
pub struct PlayerService {
    config: CoreConfig,
    deps: WidgetDeps,
    events: EventBus,
    device_log: Option<Arc<DeviceEventLog>>,
    recorder: Mutex<Option<JoinHandle<()>>>,
    active: Mutex<Option<Timeline>>,
}

impl PlayerService {
    /// Validate both configurations and start the device log recorder.
    ///
    /// Must be called inside a runtime.
    pub fn new(config: CoreConfig, playback: PlaybackConfig) -> Result<Self> {
        config.validate()?;
        playback
            .validate()
            .map_err(CoreError::InitializationFailed)?;

        let events = EventBus::new(config.event_buffer_size);
        let deps = WidgetDeps::new(
            Arc::clone(&config.resource_manager),
            Arc::clone(&config.media_probe),
            Arc::clone(&config.renderer),
            Arc::new(playback),
        );

        let device_log = config
            .features
            .enable_device_log
            .then(|| Arc::new(DeviceEventLog::new(config.device_log_capacity)));
        let recorder = device_log
            .as_ref()
            .map(|log| spawn_recorder(&events, Arc::clone(log)));

        info!(
            prefetch = config.features.enable_prefetch,
            device_log = device_log.is_some(),
            "Player service ready"
        );
        Ok(Self {
            config,
            deps,
            events,
            device_log,
            recorder: Mutex::new(recorder),
            active: Mutex::new(None),
        })
    }

    /// Logging setup for this player; JSON lines with the `json-logs` feature.
    pub fn logging_config(&self) -> LoggingConfig {
        let mut logging = LoggingConfig::default();
        if cfg!(feature = "json-logs") {
            logging = logging.with_format(LogFormat::Json);
        }
        match (&self.config.logger_sink, &self.device_log) {
            (Some(sink), _) => logging.with_logger_sink(Arc::clone(sink)),
            (None, Some(log)) => logging.with_logger_sink(log.clone()),
            (None, None) => logging,
        }
    }

    /// Install the global tracing subscriber. Call once per process.
    pub fn init_logging(&self) -> Result<()> {
        init_logging(self.logging_config())?;
        Ok(())
    }

    /// Build a timeline for `doc` and make it the active one.
    ///
    /// Construction errors are returned before anything changes on screen.
    /// The previous timeline is disposed only once the new one is built.
    pub async fn load_playlist(&self, doc: &Value) -> Result<Timeline> {
        let surface = Surface::new(
            Arc::clone(&self.config.renderer),
            Container::new(ROOT_CONTAINER),
        );
        let timeline = Timeline::from_document(
            doc,
            &self.deps,
            surface,
            self.events.clone(),
            self.config.features.enable_prefetch,
        )?;

        let previous = self.active.lock().replace(timeline.clone());
        if let Some(previous) = previous {
            debug!("Disposing previous timeline");
            if let Err(e) = previous.dispose().await {
                warn!(error = %e, "Previous timeline did not dispose cleanly");
            }
        }
        info!("Playlist loaded");
        Ok(timeline)
    }

    pub fn active_timeline(&self) -> Option<Timeline> {
        self.active.lock().clone()
    }

    pub async fn play(&self) -> Result<()> {
        Ok(self.require_timeline()?.play().await?)
    }

    pub async fn pause(&self) -> Result<()> {
        Ok(self.require_timeline()?.pause().await?)
    }

    pub async fn stop(&self) -> Result<()> {
        Ok(self.require_timeline()?.stop().await?)
    }

    pub async fn seek(&self, target_ms: u64) -> Result<u64> {
        Ok(self.require_timeline()?.seek(target_ms).await?)
    }

    /// Subscribe to playback and asset events of every timeline.
    pub fn events(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub fn device_log(&self) -> Option<Arc<DeviceEventLog>> {
        self.device_log.clone()
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn playback_config(&self) -> &PlaybackConfig {
        &self.deps.config
    }

    /// Dispose the active timeline and stop background tasks.
    pub async fn shutdown(&self) -> Result<()> {
        let active = self.active.lock().take();
        if let Some(timeline) = active {
            timeline.dispose().await?;
        }
        if let Some(recorder) = self.recorder.lock().take() {
            recorder.abort();
        }
        info!("Player service shut down");
        Ok(())
    }

    fn require_timeline(&self) -> Result<Timeline> {
        self.active_timeline().ok_or(CoreError::NoPlaylist)
    }
}

impl Drop for PlayerService {
    fn drop(&mut self) {
        if let Some(recorder) = self.recorder.get_mut().take() {
            recorder.abort();
        }
    }
}

/// Mirror every non-tick bus event into the device log.
fn spawn_recorder(events: &EventBus, log: Arc<DeviceEventLog>) -> JoinHandle<()> {
    let mut stream = EventStream::new(events.subscribe()).filter(|event| !event.is_tick());
    core_async::spawn(async move {
        loop {
            match stream.recv().await {
                Ok(event) => log.record_event(&event),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Device log recorder fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
