//! Wall-clock helpers and payload timestamp skew detection.
//!
//! History is ordered by client-supplied timestamps, so a peer with a bad
//! clock can display out of order. Skew is reported, never rejected.

use std::fmt;

/// Default skew threshold in seconds (5 minutes).
pub const DEFAULT_SKEW_THRESHOLD_SECS: u64 = 300;

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A payload timestamp that is too far from the local wall clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockSkewWarning {
    pub payload_ms: i64,
    pub wall_ms: i64,
    /// Positive when the payload is in the future.
    pub skew_secs: i64,
    pub threshold_secs: u64,
}

impl fmt::Display for ClockSkewWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = if self.skew_secs > 0 { "future" } else { "past" };
        write!(
            f,
            "payload timestamp is {}s in the {direction} (threshold {}s)",
            self.skew_secs.unsigned_abs(),
            self.threshold_secs
        )
    }
}

/// Compare a payload timestamp against the wall clock.
///
/// Returns `Some` when the absolute difference exceeds `threshold_secs`.
#[must_use]
pub fn check_clock_skew(
    payload_ms: i64,
    wall_ms: i64,
    threshold_secs: u64,
) -> Option<ClockSkewWarning> {
    let skew_secs = payload_ms.saturating_sub(wall_ms) / 1000;
    (skew_secs.unsigned_abs() > threshold_secs).then_some(ClockSkewWarning {
        payload_ms,
        wall_ms,
        skew_secs,
        threshold_secs,
    })
}

/// Render epoch milliseconds as RFC 3339 for display.
#[must_use]
pub fn format_ms(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map_or_else(|| ms.to_string(), |dt| dt.to_rfc3339())
}
