//! Time-related abstractions.
//!
//! `Instant` is Tokio's monotonic instant so that code measuring elapsed
//! playback time follows the paused clock in tests.
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{interval, Duration, MissedTickBehavior};
//!
//! async fn example() {
//!     let mut ticker = interval(Duration::from_millis(50));
//!     ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
//!     ticker.tick().await;
//! }
//! ```

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};
pub use tokio::time::{
    error::Elapsed, interval, interval_at, sleep, sleep_until, timeout, Instant, Interval,
    MissedTickBehavior, Sleep, Timeout,
};

#[cfg(feature = "test-util")]
pub use tokio::time::{advance, pause, resume};

/// Returns the current wall-clock time as milliseconds since UNIX_EPOCH.
///
/// Falls back to 0 when the system clock reports a time before the epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Converts a millisecond count into a `Duration`.
pub fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
