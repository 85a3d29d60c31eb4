//! # Playback Configuration
//!
//! Tunables for the scheduler, widget defaults and timeouts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Playback engine configuration.
///
/// Controls the master clock resolution, the prefetch lookahead window,
/// fallback durations and how long the engine waits on slow collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Master clock resolution in milliseconds.
    ///
    /// Default: 50ms.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Lower bound of the prefetch window.
    ///
    /// The next item starts loading once the current item has no more than
    /// the lookahead window left to play.
    ///
    /// Default: 2 seconds.
    #[serde(default = "default_min_lookahead_ms")]
    pub min_lookahead_ms: u64,

    /// Upper bound of the prefetch window.
    ///
    /// Default: 15 seconds.
    #[serde(default = "default_max_lookahead_ms")]
    pub max_lookahead_ms: u64,

    /// Multiplier applied to the observed load latency to size the window.
    ///
    /// Default: 3.0.
    #[serde(default = "default_lookahead_factor")]
    pub lookahead_factor: f64,

    /// Duration of an image without an explicit `duration` option.
    ///
    /// Default: 5 seconds.
    #[serde(default = "default_image_duration_ms")]
    pub default_image_duration_ms: u64,

    /// Duration of a text widget without an explicit `duration` option.
    ///
    /// Default: 5 seconds.
    #[serde(default = "default_text_duration_ms")]
    pub default_text_duration_ms: u64,

    /// Fallback duration for media whose length cannot be determined.
    ///
    /// Default: 0 (the item is skipped over).
    #[serde(default = "default_item_duration_ms")]
    pub default_item_duration_ms: u64,

    /// Maximum time a layer waits for its widget to report a duration.
    ///
    /// Default: 10 seconds.
    #[serde(default = "default_duration_resolve_timeout_ms")]
    pub duration_resolve_timeout_ms: u64,

    /// Maximum time spent probing media metadata.
    ///
    /// Default: 10 seconds.
    #[serde(default = "default_metadata_timeout_ms")]
    pub metadata_timeout_ms: u64,

    /// Whether transitions between items are rendered.
    ///
    /// Transition durations still count toward layer durations when disabled.
    ///
    /// Default: true.
    #[serde(default = "default_enable_transitions")]
    pub enable_transitions: bool,

    /// Whether layers are unloaded once they stop being visible.
    ///
    /// Default: true.
    #[serde(default = "default_unload_inactive")]
    pub unload_inactive: bool,

    /// Maximum number of widget nodes a single document may expand to.
    ///
    /// Default: 10000.
    #[serde(default = "default_max_tree_nodes")]
    pub max_tree_nodes: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            min_lookahead_ms: default_min_lookahead_ms(),
            max_lookahead_ms: default_max_lookahead_ms(),
            lookahead_factor: default_lookahead_factor(),
            default_image_duration_ms: default_image_duration_ms(),
            default_text_duration_ms: default_text_duration_ms(),
            default_item_duration_ms: default_item_duration_ms(),
            duration_resolve_timeout_ms: default_duration_resolve_timeout_ms(),
            metadata_timeout_ms: default_metadata_timeout_ms(),
            enable_transitions: default_enable_transitions(),
            unload_inactive: default_unload_inactive(),
            max_tree_nodes: default_max_tree_nodes(),
        }
    }
}

impl PlaybackConfig {
    /// Create a configuration tuned for responsive seeking.
    ///
    /// - Finer clock (20ms)
    /// - Short duration timeouts
    pub fn low_latency() -> Self {
        Self {
            tick_interval_ms: 20,
            duration_resolve_timeout_ms: 3000,
            metadata_timeout_ms: 3000,
            ..Default::default()
        }
    }

    /// Create a configuration for constrained devices.
    ///
    /// - Coarser clock (100ms)
    /// - Narrow prefetch window so at most one upcoming item is resident
    pub fn low_memory() -> Self {
        Self {
            tick_interval_ms: 100,
            min_lookahead_ms: 1000,
            max_lookahead_ms: 5000,
            lookahead_factor: 2.0,
            unload_inactive: true,
            max_tree_nodes: 2000,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be > 0".to_string());
        }

        if self.min_lookahead_ms > self.max_lookahead_ms {
            return Err("min_lookahead_ms cannot exceed max_lookahead_ms".to_string());
        }

        if !self.lookahead_factor.is_finite() || self.lookahead_factor < 0.0 {
            return Err("lookahead_factor must be a finite, non-negative number".to_string());
        }

        if self.max_tree_nodes == 0 {
            return Err("max_tree_nodes must be > 0".to_string());
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn duration_resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.duration_resolve_timeout_ms)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_tick_interval_ms() -> u64 {
    50
}

fn default_min_lookahead_ms() -> u64 {
    2000
}

fn default_max_lookahead_ms() -> u64 {
    15_000
}

fn default_lookahead_factor() -> f64 {
    3.0
}

fn default_image_duration_ms() -> u64 {
    5000
}

fn default_text_duration_ms() -> u64 {
    5000
}

fn default_item_duration_ms() -> u64 {
    0
}

fn default_duration_resolve_timeout_ms() -> u64 {
    10_000
}

fn default_metadata_timeout_ms() -> u64 {
    10_000
}

fn default_enable_transitions() -> bool {
    true
}

fn default_unload_inactive() -> bool {
    true
}

fn default_max_tree_nodes() -> usize {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlaybackConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval_ms, 50);
        assert_eq!(config.default_image_duration_ms, 5000);
        assert_eq!(config.tick_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_presets() {
        let fast = PlaybackConfig::low_latency();
        assert!(fast.validate().is_ok());
        assert!(fast.tick_interval_ms < PlaybackConfig::default().tick_interval_ms);

        let small = PlaybackConfig::low_memory();
        assert!(small.validate().is_ok());
        assert!(small.max_lookahead_ms < PlaybackConfig::default().max_lookahead_ms);
    }

    #[test]
    fn test_config_validation() {
        let mut config = PlaybackConfig::default();

        config.tick_interval_ms = 0;
        assert!(config.validate().is_err());
        config.tick_interval_ms = 50;

        config.min_lookahead_ms = 20_000;
        assert!(config.validate().is_err());
        config.min_lookahead_ms = 2000;

        config.lookahead_factor = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PlaybackConfig =
            serde_json::from_str(r#"{ "tick_interval_ms": 25, "enable_transitions": false }"#)
                .unwrap();
        assert_eq!(config.tick_interval_ms, 25);
        assert!(!config.enable_transitions);
        assert_eq!(config.max_tree_nodes, 10_000);
    }
}
