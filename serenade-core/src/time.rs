//! Time and duration conversion utilities.
//!
//! This module provides safe conversion functions for durations,
//! avoiding truncation issues with explicit saturation behavior.

use std::time::Duration;

/// Extension trait for safe Duration conversions.
pub trait DurationExt {
    /// Convert duration to milliseconds as u64, saturating at `u64::MAX`.
    fn as_millis_u64(&self) -> u64;

    /// Whether this duration can drive clock-synced timing (non-zero).
    fn is_usable(&self) -> bool;

    /// Format as `mm:ss.t` for status output.
    fn to_clock_string(&self) -> String;
}

impl DurationExt for Duration {
    fn as_millis_u64(&self) -> u64 {
        u64::try_from(self.as_millis()).unwrap_or(u64::MAX)
    }

    fn is_usable(&self) -> bool {
        !self.is_zero()
    }

    fn to_clock_string(&self) -> String {
        let total_secs = self.as_secs();
        let minutes = total_secs / 60;
        let seconds = total_secs % 60;
        let tenths = self.subsec_millis() / 100;

        format!("{minutes:02}:{seconds:02}.{tenths}")
    }
}

/// Convert a floating point number of seconds into a duration.
///
/// Returns `None` for NaN, infinite or negative input, which is how audio
/// backends usually report an unknown duration.
#[must_use]
pub fn duration_from_secs_f64(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}
