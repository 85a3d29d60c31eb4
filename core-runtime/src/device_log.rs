//! Bounded in-memory device event log.
//!
//! Keeps the most recent N rows the way the backend's per-device event log
//! does, so the shell can upload a recent history on demand. It plugs into
//! logging as a regular [`LoggerSink`] and can also record bus events
//! directly.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::logging::{LogEntry, LogLevel, LoggerSink};
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::events::{CoreEvent, EventSeverity};

pub const DEFAULT_DEVICE_LOG_CAPACITY: usize = 100;

/// Ring of the `capacity` most recent log rows, oldest first.
#[derive(Debug)]
pub struct DeviceEventLog {
    capacity: usize,
    min_level: LogLevel,
    rows: Mutex<VecDeque<LogEntry>>,
}

impl DeviceEventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            min_level: LogLevel::Info,
            rows: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&self, entry: LogEntry) {
        let mut rows = self.rows.lock();
        if rows.len() == self.capacity {
            rows.pop_front();
        }
        rows.push_back(entry);
    }

    /// Records a bus event, skipping clock ticks and debug-level noise.
    pub fn record_event(&self, event: &CoreEvent) {
        let level = match event.severity() {
            EventSeverity::Debug => return,
            EventSeverity::Info => LogLevel::Info,
            EventSeverity::Warning => LogLevel::Warn,
            EventSeverity::Error => LogLevel::Error,
        };
        let mut entry = LogEntry::new(level, "core_runtime::events", event.description());
        if let Ok(payload) = serde_json::to_string(event) {
            entry = entry.with_field("event", payload);
        }
        self.push(entry);
    }

    /// Snapshot of the retained rows, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.rows.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    pub fn clear(&self) {
        self.rows.lock().clear();
    }
}

impl Default for DeviceEventLog {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE_LOG_CAPACITY)
    }
}

#[async_trait]
impl LoggerSink for DeviceEventLog {
    async fn log(&self, entry: LogEntry) -> BridgeResult<()> {
        if entry.level >= self.min_level {
            self.push(entry);
        }
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PlaybackEvent;

    fn row(n: usize) -> LogEntry {
        LogEntry::new(LogLevel::Info, "test", format!("row {n}"))
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let log = DeviceEventLog::new(3);
        for n in 0..5 {
            log.push(row(n));
        }

        let messages: Vec<_> = log.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["row 2", "row 3", "row 4"]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let log = DeviceEventLog::new(0);
        log.push(row(1));
        log.push(row(2));
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.entries()[0].message, "row 2");
    }

    #[test]
    fn test_record_event_skips_ticks() {
        let log = DeviceEventLog::default();
        log.record_event(&CoreEvent::Playback(PlaybackEvent::Time { elapsed_ms: 50 }));
        log.record_event(&CoreEvent::Playback(PlaybackEvent::ItemSkipped {
            index: 2,
            layer_id: "promo".into(),
            reason: "media unavailable".into(),
        }));

        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Warn);
        assert!(entries[0].fields["event"].contains("promo"));
    }

    #[core_async::test]
    async fn test_sink_filters_below_min_level() {
        let log = DeviceEventLog::new(10).with_min_level(LogLevel::Warn);
        log.log(LogEntry::new(LogLevel::Debug, "t", "noise")).await.unwrap();
        log.log(LogEntry::new(LogLevel::Error, "t", "fatal")).await.unwrap();

        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].message, "fatal");
    }
}
