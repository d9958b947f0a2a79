//! Test utilities for provider types
//!
//! Provides helper functions for creating test fixes and configs.

use bgloc_core::{AccuracyMode, LocationFix, TrackingConfig};

/// Creates a fix near Berlin at the given timestamp.
pub fn test_fix(timestamp_millis: u64) -> LocationFix {
    test_fix_at(52.520_008, 13.404_954, timestamp_millis)
}

/// Creates a fix at an explicit position.
///
/// # Arguments
/// * `latitude` - Degrees north
/// * `longitude` - Degrees east
/// * `timestamp_millis` - Provider timestamp
pub fn test_fix_at(latitude: f64, longitude: f64, timestamp_millis: u64) -> LocationFix {
    LocationFix::new(latitude, longitude, timestamp_millis).with_accuracy(5.0)
}

/// Creates fixes for each timestamp, walking slowly north.
pub fn test_fixes(timestamps: &[u64]) -> Vec<LocationFix> {
    timestamps
        .iter()
        .enumerate()
        .map(|(i, ts)| test_fix_at(52.52 + i as f64 * 0.0001, 13.405, *ts))
        .collect()
}

/// A 5-second, high-accuracy config with no distance filter.
pub fn test_config() -> TrackingConfig {
    TrackingConfig::default()
        .with_interval(5000, 5000)
        .with_distance_filter(0.0)
        .with_accuracy(AccuracyMode::High)
}
