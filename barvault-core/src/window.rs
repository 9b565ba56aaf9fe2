//! Date-range splitting for providers with bounded history windows.
//!
//! One logical fetch may span years while the provider accepts only ~100 days
//! per call. `split_range` cuts `[from, to]` into sequential sub-windows that
//! are contiguous, non-overlapping, and jointly cover the full span, each at
//! most `max_days` calendar days (inclusive of both endpoints).

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::timeframe::Timeframe;

/// Split `[from, to]` (inclusive) into sub-windows of at most `max_days` days.
///
/// Returns an empty vector when `from > to`. Consecutive windows touch:
/// each starts exactly one day after the previous one ends.
pub fn split_range(from: NaiveDate, to: NaiveDate, max_days: u32) -> Vec<(NaiveDate, NaiveDate)> {
    assert!(max_days > 0, "window limit must be positive");

    let mut windows = Vec::new();
    let mut start = from;
    while start <= to {
        let span_end = start + Duration::days(i64::from(max_days) - 1);
        let end = span_end.min(to);
        windows.push((start, end));
        start = end + Duration::days(1);
    }
    windows
}

/// Clamp a requested end date so the final window cannot ask for the current,
/// not-yet-closed daily bar. Intraday requests keep today: their earlier bars
/// of the day are already closed and the still-open one is filtered per bar.
pub fn clamp_request_end(to: NaiveDate, now: DateTime<Utc>, tf: Timeframe) -> NaiveDate {
    if tf.is_intraday() {
        return to;
    }
    let today = now.date_naive();
    if to >= today {
        today - Duration::days(1)
    } else {
        to
    }
}

/// True when the bar opening at `ts` has already closed as of `now_ts`.
pub fn bar_is_closed(ts: i64, now_ts: i64, tf: Timeframe) -> bool {
    ts + tf.interval_secs() <= now_ts
}
