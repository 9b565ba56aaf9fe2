//! Fetch-client adapter — turns one logical range into provider calls.
//!
//! Splits the requested span into provider-sized sub-windows, issues them in
//! chronological order with a minimum pacing delay between consecutive calls,
//! concatenates the results, and drops the still-open trailing bar unless the
//! caller opts in to partial candles.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::Bar;
use crate::provider::{FetchError, QuoteProvider};
use crate::timeframe::{Timeframe, WindowLimits};
use crate::window::{bar_is_closed, clamp_request_end, split_range};

/// Per-request knobs.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Keep the current, not-yet-closed bar in the result.
    pub include_open_bar: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            include_open_bar: false,
        }
    }
}

/// Range-splitting wrapper around a [`QuoteProvider`].
pub struct RangeFetcher<'a> {
    provider: &'a dyn QuoteProvider,
    limits: WindowLimits,
    /// Minimum delay between consecutive provider calls from this fetcher.
    pacing: Duration,
}

impl<'a> RangeFetcher<'a> {
    pub fn new(provider: &'a dyn QuoteProvider, limits: WindowLimits, pacing: Duration) -> Self {
        Self {
            provider,
            limits,
            pacing,
        }
    }

    /// Fetch all bars in `[from, to]` (inclusive dates, UTC).
    ///
    /// Sub-windows are issued strictly in chronological order, so the
    /// concatenated result arrives time-ordered before any downstream sort.
    pub fn fetch_range(
        &self,
        symbol: &str,
        tf: Timeframe,
        from: NaiveDate,
        to: NaiveDate,
        opts: &FetchOptions,
    ) -> Result<Vec<Bar>, FetchError> {
        self.fetch_range_at(symbol, tf, from, to, opts, Utc::now())
    }

    /// Same as [`fetch_range`](Self::fetch_range) with an explicit clock,
    /// for deterministic replay in tests.
    pub fn fetch_range_at(
        &self,
        symbol: &str,
        tf: Timeframe,
        from: NaiveDate,
        to: NaiveDate,
        opts: &FetchOptions,
        now: DateTime<Utc>,
    ) -> Result<Vec<Bar>, FetchError> {
        let effective_to = if opts.include_open_bar {
            to
        } else {
            clamp_request_end(to, now, tf)
        };

        let mut bars = Vec::new();
        let windows = split_range(from, effective_to, self.limits.days_for(tf));
        for (i, (lo, hi)) in windows.iter().enumerate() {
            if i > 0 && !self.pacing.is_zero() {
                std::thread::sleep(self.pacing);
            }
            let chunk = self.provider.fetch_window(symbol, tf, *lo, *hi)?;
            bars.extend(chunk);
        }

        if !opts.include_open_bar {
            let now_ts = now.timestamp();
            bars.retain(|b| bar_is_closed(b.ts, now_ts, tf));
        }

        Ok(bars)
    }
}
