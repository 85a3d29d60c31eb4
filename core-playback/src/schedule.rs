//! # Schedule Math
//!
//! Pure functions over layer durations, kept separate from the timeline task
//! so positioning rules can be tested without a clock.

use crate::config::PlaybackConfig;

/// Sum of all durations, saturating at `u64::MAX`.
pub fn total(durations: &[u64]) -> u64 {
    durations.iter().fold(0, |sum, &ms| sum.saturating_add(ms))
}

/// Start of slot `index` on the timeline.
pub fn start_of(durations: &[u64], index: usize) -> u64 {
    total(&durations[..index.min(durations.len())])
}

/// Slot containing `target`, as `(index, local_offset, slot_start)`.
///
/// Targets at or past the end clamp to the end of the last slot. Zero-length
/// slots never contain a position. Returns `None` for an empty schedule.
pub fn locate(durations: &[u64], target: u64) -> Option<(usize, u64, u64)> {
    let last = durations.len().checked_sub(1)?;
    let mut start = 0u64;
    for (index, &duration) in durations.iter().enumerate() {
        if target < start.saturating_add(duration) {
            return Some((index, target - start, start));
        }
        if index == last {
            break;
        }
        start = start.saturating_add(duration);
    }
    Some((last, durations[last], start))
}

/// Estimates how long loading a layer takes, to size the prefetch window.
///
/// Exponentially weighted moving average of observed load latencies.
#[derive(Debug, Clone)]
pub struct LatencyEstimator {
    ewma_ms: Option<f64>,
    alpha: f64,
    factor: f64,
    min_ms: u64,
    max_ms: u64,
}

impl LatencyEstimator {
    pub fn new(config: &PlaybackConfig) -> Self {
        Self {
            ewma_ms: None,
            alpha: 0.3,
            factor: config.lookahead_factor,
            min_ms: config.min_lookahead_ms,
            max_ms: config.max_lookahead_ms,
        }
    }

    pub fn observe(&mut self, latency_ms: u64) {
        let sample = latency_ms as f64;
        self.ewma_ms = Some(match self.ewma_ms {
            Some(avg) => avg + self.alpha * (sample - avg),
            None => sample,
        });
    }

    pub fn estimate_ms(&self) -> Option<u64> {
        self.ewma_ms.map(|avg| avg.round() as u64)
    }

    /// Remaining time at which the next layer should start loading.
    pub fn lookahead_ms(&self) -> u64 {
        let scaled = self
            .ewma_ms
            .map(|avg| (avg * self.factor).round() as u64)
            .unwrap_or(self.min_ms);
        scaled.clamp(self.min_ms, self.max_ms.max(self.min_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_inside_slots() {
        let durations = [2000, 3000];
        assert_eq!(total(&durations), 5000);
        assert_eq!(locate(&durations, 0), Some((0, 0, 0)));
        assert_eq!(locate(&durations, 1999), Some((0, 1999, 0)));
        assert_eq!(locate(&durations, 2500), Some((1, 500, 2000)));
        assert_eq!(start_of(&durations, 1), 2000);
    }

    #[test]
    fn test_locate_clamps_past_end() {
        let durations = [2000, 3000];
        assert_eq!(locate(&durations, 5000), Some((1, 3000, 2000)));
        assert_eq!(locate(&durations, 99_000), Some((1, 3000, 2000)));
        assert_eq!(locate(&[], 10), None);
    }

    #[test]
    fn test_locate_skips_zero_length_slots() {
        let durations = [1000, 0, 500];
        assert_eq!(locate(&durations, 1000), Some((2, 0, 1000)));
        assert_eq!(locate(&[0, 0], 0), Some((1, 0, 0)));
    }

    #[test]
    fn test_huge_durations_saturate() {
        let half = u64::MAX / 2 + 1;
        let durations = [half, half];
        assert_eq!(total(&durations), u64::MAX);
        assert_eq!(start_of(&durations, 2), u64::MAX);
        assert_eq!(locate(&durations, 10), Some((0, 10, 0)));
        assert_eq!(locate(&durations, half), Some((1, 0, half)));
    }

    #[test]
    fn test_lookahead_window() {
        let config = PlaybackConfig::default();
        let mut estimator = LatencyEstimator::new(&config);
        assert_eq!(estimator.lookahead_ms(), config.min_lookahead_ms);

        estimator.observe(1000);
        assert_eq!(estimator.estimate_ms(), Some(1000));
        assert_eq!(estimator.lookahead_ms(), 3000);

        estimator.observe(100_000);
        assert_eq!(estimator.lookahead_ms(), config.max_lookahead_ms);
    }
}
