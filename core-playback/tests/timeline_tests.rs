//! End-to-end playback scenarios against recording host doubles.
//!
//! Every test runs on paused time, so the tick clock advances exactly as far
//! as the test sleeps.

mod common;

use common::{started, times, FixedProbe, Harness, MapResources};
use core_async::time::{sleep, Duration};
use core_playback::{PlaybackError, PlaybackState, Timeline};
use core_runtime::events::{AssetEvent, CoreEvent, PlaybackEvent};
use serde_json::{json, Value};

fn image(id: &str, uri: &str, duration: u64) -> Value {
    json!({
        "id": id,
        "widget": { "type": "image", "opts": { "uri": uri, "duration": duration } }
    })
}

async fn wait(ms: u64) {
    sleep(Duration::from_millis(ms)).await;
}

#[core_async::test(start_paused)]
async fn test_second_image_is_active_after_first_slot() {
    let harness = Harness::new();
    let doc = json!({ "items": [image("a", "a.png", 2000), image("b", "b.png", 3000)] });
    let timeline = harness.timeline(&doc, false);

    timeline.play().await.unwrap();
    assert_eq!(timeline.status().duration_ms, 5000);
    assert!(harness.renderer.is_showing("local://a.png"));

    wait(2500).await;
    let status = timeline.status();
    assert_eq!(status.index, Some(1));
    assert!(harness.renderer.is_showing("local://b.png"));
    assert!(!harness.renderer.is_showing("local://a.png"));
}

#[core_async::test(start_paused)]
async fn test_unknown_widget_type_fails_before_playback() {
    let harness = Harness::new();
    let doc = json!([
        image("a", "a.png", 1000),
        { "id": "bad", "widget": { "type": "group", "children": [{ "type": "foo" }] } }
    ]);

    let err = Timeline::from_document(&doc, &harness.deps, harness.surface(), harness.events.clone(), false)
        .unwrap_err();
    assert!(matches!(err, PlaybackError::UnknownWidgetType { ref tag, .. } if tag == "foo"));
    assert!(err.to_string().contains("$.items[1].widget.children[0]"));
    assert!(harness.renderer.calls().is_empty());
}

#[core_async::test(start_paused)]
async fn test_failed_asset_is_skipped_and_playback_continues() {
    let mut harness = Harness::with(MapResources::new().with_failure("a.png"), FixedProbe::new());
    let doc = json!([image("a", "a.png", 2000), image("b", "b.png", 2000)]);
    let timeline = harness.timeline(&doc, false);

    timeline.play().await.unwrap();
    wait(200).await;

    let events = harness.playback_events();
    assert!(events.iter().any(|e| matches!(
        e,
        PlaybackEvent::ItemSkipped { index: 0, layer_id, .. } if layer_id == "a"
    )));
    assert_eq!(started(&events), vec!["b"]);
    assert!(harness.renderer.is_showing("local://b.png"));
    assert_eq!(timeline.status().state, PlaybackState::Playing);
}

#[core_async::test(start_paused)]
async fn test_loop_with_no_showable_layer_faults() {
    let mut harness = Harness::with(
        MapResources::new()
            .with_failure("a.png")
            .with_failure("b.png"),
        FixedProbe::new(),
    );
    let doc = json!({ "loop": true, "items": [image("a", "a.png", 20), image("b", "b.png", 20)] });
    let timeline = harness.timeline(&doc, false);

    let _ = timeline.play().await;
    wait(200).await;

    assert_eq!(timeline.status().state, PlaybackState::Error);
    let events = harness.playback_events();
    assert!(events.iter().any(|e| matches!(
        e,
        PlaybackEvent::Error { message, recoverable: false } if message.contains("no playable content")
    )));
}

#[core_async::test(start_paused)]
async fn test_short_looping_images_keep_playing() {
    let mut harness = Harness::new();
    let doc = json!({
        "loop": true,
        "items": [image("a", "a.png", 5), image("b", "b.png", 5), image("c", "c.png", 5)]
    });
    let timeline = harness.timeline(&doc, false);

    timeline.play().await.unwrap();
    wait(1000).await;

    assert_eq!(timeline.status().state, PlaybackState::Playing);
    let events = harness.playback_events();
    assert!(!events
        .iter()
        .any(|e| matches!(e, PlaybackEvent::Error { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, PlaybackEvent::Looped { pass } if *pass > 1)));
}

#[core_async::test(start_paused)]
async fn test_completed_fires_exactly_once() {
    let mut harness = Harness::new();
    let doc = json!([image("a", "a.png", 500), image("b", "b.png", 500)]);
    let timeline = harness.timeline(&doc, false);

    timeline.play().await.unwrap();
    wait(3000).await;

    let events = harness.playback_events();
    let completed = events
        .iter()
        .filter(|e| matches!(e, PlaybackEvent::Completed))
        .count();
    assert_eq!(completed, 1);
    assert_eq!(timeline.status().state, PlaybackState::Completed);

    // A second pass may complete again, once.
    timeline.play().await.unwrap();
    wait(1500).await;
    let events = harness.playback_events();
    assert_eq!(started(&events), vec!["a", "b"]);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, PlaybackEvent::Completed))
            .count(),
        1
    );
}

#[core_async::test(start_paused)]
async fn test_loop_wraps_time_without_completing() {
    let mut harness = Harness::new();
    let doc = json!({
        "loop": true,
        "items": [image("a", "a.png", 500), image("b", "b.png", 500)]
    });
    let timeline = harness.timeline(&doc, false);

    timeline.play().await.unwrap();
    wait(1600).await;

    let events = harness.playback_events();
    let elapsed = times(&events);
    assert!(elapsed.windows(2).any(|pair| pair[1] < pair[0]));
    assert!(!events.contains(&PlaybackEvent::Completed));
    assert!(events.contains(&PlaybackEvent::Looped { pass: 1 }));
    assert_eq!(timeline.status().state, PlaybackState::Playing);
}

#[core_async::test(start_paused)]
async fn test_seek_twice_is_idempotent() {
    let harness = Harness::new();
    let doc = json!([image("a", "a.png", 2000), image("b", "b.png", 3000)]);
    let timeline = harness.timeline(&doc, false);

    assert_eq!(timeline.seek(2500).await.unwrap(), 2500);
    let first_screen = harness.renderer.screen();
    let first_status = timeline.status();

    assert_eq!(timeline.seek(2500).await.unwrap(), 2500);
    assert_eq!(harness.renderer.screen(), first_screen);
    assert_eq!(timeline.status(), first_status);
    assert!(harness.renderer.is_showing("local://b.png"));
}

#[core_async::test(start_paused)]
async fn test_seek_past_end_clamps() {
    let harness = Harness::new();
    let doc = json!([image("a", "a.png", 2000), image("b", "b.png", 3000)]);
    let timeline = harness.timeline(&doc, false);

    assert_eq!(timeline.seek(60_000).await.unwrap(), 5000);
    assert_eq!(timeline.status().index, Some(1));
}

#[core_async::test(start_paused)]
async fn test_stop_then_play_resumes_from_stop_position() {
    let mut harness = Harness::new();
    let doc = json!([image("a", "a.png", 5000), image("b", "b.png", 5000)]);
    let timeline = harness.timeline(&doc, false);

    timeline.play().await.unwrap();
    wait(700).await;
    timeline.stop().await.unwrap();
    let stopped_at = timeline.status().current_time_ms;
    assert!(stopped_at >= 600);
    assert!(harness.renderer.screen().is_empty());
    harness.playback_events();

    timeline.play().await.unwrap();
    wait(300).await;
    let elapsed = times(&harness.playback_events());
    assert!(!elapsed.is_empty());
    assert!(elapsed.iter().all(|t| *t >= stopped_at));
    assert!(elapsed.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[core_async::test(start_paused)]
async fn test_pause_holds_position() {
    let harness = Harness::new();
    let doc = json!([image("a", "a.png", 5000)]);
    let timeline = harness.timeline(&doc, false);

    timeline.play().await.unwrap();
    wait(500).await;
    timeline.pause().await.unwrap();
    let paused_at = timeline.status().current_time_ms;

    wait(1000).await;
    assert_eq!(timeline.status().current_time_ms, paused_at);
    assert_eq!(timeline.status().state, PlaybackState::Paused);
    assert!(harness.renderer.is_showing("local://a.png"));
}

#[core_async::test(start_paused)]
async fn test_next_layer_is_prefetched_before_current_ends() {
    let mut harness = Harness::with(MapResources::new().with_latency(100), FixedProbe::new());
    let doc = json!([
        image("a", "a.png", 3000),
        image("b", "b.png", 3000),
        image("c", "c.png", 3000)
    ]);
    let timeline = harness.timeline(&doc, true);

    timeline.play().await.unwrap();
    assert_eq!(harness.resources.requested("b.png"), 0);

    wait(1500).await;
    assert_eq!(harness.resources.requested("b.png"), 1);
    let prefetched = harness.all_events().into_iter().any(|event| {
        matches!(
            event,
            CoreEvent::Asset(AssetEvent::Prefetched { ref layer_id, .. }) if layer_id == "b"
        )
    });
    assert!(prefetched);

    // The prefetched asset is reused when the layer becomes active.
    wait(2000).await;
    assert!(harness.renderer.is_showing("local://b.png"));
    assert_eq!(harness.resources.requested("b.png"), 1);
}

#[core_async::test(start_paused)]
async fn test_fade_overlaps_both_layers() {
    let harness = Harness::new();
    let doc = json!([
        image("a", "a.png", 2000),
        {
            "id": "b",
            "transition": { "type": "fade", "duration": 500 },
            "widget": { "type": "image", "opts": { "uri": "b.png", "duration": 2000 } }
        }
    ]);
    let timeline = harness.timeline(&doc, false);

    timeline.play().await.unwrap();
    wait(2200).await;
    assert!(harness.renderer.is_showing("local://a.png"));
    assert!(harness.renderer.is_showing("local://b.png"));
    let fading_in = harness.renderer.visuals_for("screen/layer-b");
    assert!(fading_in.iter().any(|v| v.opacity > 0.0 && v.opacity < 1.0));

    wait(400).await;
    assert!(!harness.renderer.is_showing("local://a.png"));
    assert!(harness.renderer.is_showing("local://b.png"));
}

#[core_async::test(start_paused)]
async fn test_removing_active_layer_shows_replacement() {
    let mut harness = Harness::new();
    let doc = json!([image("a", "a.png", 5000), image("b", "b.png", 5000)]);
    let timeline = harness.timeline(&doc, false);

    timeline.play().await.unwrap();
    timeline.remove_layer("a").await.unwrap();

    assert!(harness.renderer.is_showing("local://b.png"));
    assert!(!harness.renderer.is_showing("local://a.png"));
    assert_eq!(harness.resources.released("a.png"), 1);
    assert_eq!(started(&harness.playback_events()), vec!["a", "b"]);
    assert_eq!(timeline.status().duration_ms, 5000);
}

#[core_async::test(start_paused)]
async fn test_superseded_show_is_not_rendered() {
    let harness = Harness::with(MapResources::new().with_latency(1000), FixedProbe::new());
    let doc = json!([image("a", "a.png", 2000), image("b", "b.png", 3000)]);
    let timeline = harness.timeline(&doc, false);

    let first = timeline.clone();
    let slow = core_async::spawn(async move { first.seek(500).await });
    wait(10).await;
    let applied = timeline.seek(2500).await.unwrap();

    assert_eq!(applied, 2500);
    assert!(matches!(slow.await.unwrap(), Err(PlaybackError::Superseded)));
    assert!(harness.renderer.is_showing("local://b.png"));
    assert!(!harness.renderer.is_showing("local://a.png"));
}
