//! Integration tests for the logging pipeline

use bridge_traits::error::Result as BridgeResult;
use bridge_traits::logging::{LogEntry, LogLevel, LoggerSink};
use core_runtime::device_log::DeviceEventLog;
use core_runtime::logging::{redact_uri, LogFormat, LoggerSinkLayer, LoggingConfig};
use mockall::mock;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;

mock! {
    Sink {}

    #[async_trait::async_trait]
    impl LoggerSink for Sink {
        async fn log(&self, entry: LogEntry) -> BridgeResult<()>;
        async fn flush(&self) -> BridgeResult<()>;
        fn min_level(&self) -> LogLevel;
    }
}

#[test]
fn test_logging_config_roundtrip() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(format!("{config:?}").contains("logger_sink: false"));
}

#[test]
fn test_sink_layer_calls_host_sink_once_per_event() {
    let mut sink = MockSink::new();
    sink.expect_min_level().return_const(LogLevel::Info);
    sink.expect_log()
        .withf(|entry| entry.message == "layer skipped" && entry.fields["index"] == "3")
        .times(1)
        .returning(|_| Ok(()));

    let sink: Arc<dyn LoggerSink> = Arc::new(sink);
    let subscriber = tracing_subscriber::registry().with(LoggerSinkLayer::new(Some(sink)));
    tracing::subscriber::with_default(subscriber, || {
        tracing::debug!("below threshold");
        tracing::warn!(index = 3u64, "layer skipped");
    });
}

#[test]
fn test_device_log_as_sink_keeps_recent_rows() {
    let log = Arc::new(DeviceEventLog::new(2));
    let sink: Arc<dyn LoggerSink> = log.clone();
    let subscriber = tracing_subscriber::registry().with(LoggerSinkLayer::new(Some(sink)));

    tracing::subscriber::with_default(subscriber, || {
        for n in 0..4u64 {
            tracing::info!(n, "item started");
        }
    });

    let rows = log.entries();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].fields["n"], "2");
    assert_eq!(rows[1].fields["n"], "3");
}

#[test]
fn test_redacted_uri_never_carries_signature() {
    let signed = "https://cdn.example.com/v/clip.mp4?X-Amz-Signature=deadbeef";
    assert!(!redact_uri(signed).contains("deadbeef"));
}
