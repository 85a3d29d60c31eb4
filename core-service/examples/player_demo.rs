//! Console player demonstration
//!
//! Plays a small playlist against a renderer that prints every screen change.
//!
//! Run with:
//! ```bash
//! cargo run -p core-service --example player_demo
//!
//! # JSON log lines
//! cargo run -p core-service --example player_demo --features json-logs
//! ```

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    Container, FontFace, MediaCommand, MediaMetadata, MediaProbe, NodeContent, RenderNode,
    Renderer, ResourceManager, VisualState,
};
use core_async::time::{sleep, Duration};
use core_playback::PlaybackConfig;
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, PlaybackEvent};
use core_service::PlayerService;
use serde_json::json;
use std::sync::Arc;

struct ConsoleRenderer;

#[async_trait]
impl Renderer for ConsoleRenderer {
    async fn mount(&self, container: &Container, node: RenderNode) -> BridgeResult<()> {
        let what = match &node.content {
            NodeContent::Image { url, .. } => format!("image {url}"),
            NodeContent::Video { url, .. } => format!("video {url}"),
            NodeContent::Text { text, .. } => format!("text {text:?}"),
            NodeContent::Region => "region".to_string(),
        };
        println!("  mount   {container} <- {what}");
        Ok(())
    }

    fn unmount(&self, container: &Container) {
        println!("  unmount {container}");
    }

    fn apply_visual(&self, container: &Container, state: &VisualState) -> BridgeResult<()> {
        if state.opacity < 1.0 {
            println!("  visual  {container} opacity={:.2}", state.opacity);
        }
        Ok(())
    }

    fn control_media(&self, container: &Container, command: MediaCommand) -> BridgeResult<()> {
        println!("  media   {container} {command:?}");
        Ok(())
    }

    async fn load_font(&self, face: &FontFace, url: &str) -> BridgeResult<()> {
        println!("  font    {} from {url}", face.family);
        Ok(())
    }

    fn unload_font(&self, face: &FontFace) {
        println!("  font    {} released", face.family);
    }
}

struct LocalCache;

#[async_trait]
impl ResourceManager for LocalCache {
    async fn get_media(&self, uri: &str) -> BridgeResult<Option<String>> {
        sleep(Duration::from_millis(40)).await;
        Ok(Some(format!("file:///var/cache/signage/{uri}")))
    }
}

struct FixedProbe;

#[async_trait]
impl MediaProbe for FixedProbe {
    async fn probe(&self, _url: &str) -> BridgeResult<MediaMetadata> {
        Ok(MediaMetadata::with_duration(2_000))
    }
}

#[core_async::main]
async fn main() -> core_service::Result<()> {
    let config = CoreConfig::builder()
        .resource_manager(Arc::new(LocalCache))
        .renderer(Arc::new(ConsoleRenderer))
        .media_probe(Arc::new(FixedProbe))
        .build()?;
    let player = PlayerService::new(config, PlaybackConfig::default())?;
    player.init_logging()?;

    let playlist = json!({
        "loop": false,
        "context": { "store": "Downtown" },
        "items": [
            {
                "id": "welcome",
                "widget": { "type": "text", "opts": { "text": "Welcome to {{store}}", "duration": 1500 } }
            },
            {
                "id": "promo",
                "transition": { "type": "fade", "duration": 300 },
                "widget": { "type": "video", "opts": { "uri": "promo.mp4" } }
            },
            {
                "id": "gallery",
                "transition": "slide",
                "widget": {
                    "type": "image-carousel",
                    "opts": { "images": ["a.jpg", "b.jpg"], "imageDuration": 700 }
                }
            }
        ]
    });

    let mut events = player.events().filter(|event| !event.is_tick());
    let timeline = player.load_playlist(&playlist).await?;
    timeline.play().await?;

    while let Ok(event) = events.recv().await {
        println!("{}", event.description());
        if matches!(event, CoreEvent::Playback(PlaybackEvent::Completed)) {
            break;
        }
    }

    player.shutdown().await
}
