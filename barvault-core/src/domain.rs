//! Core domain types — bars and series keys.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::timeframe::Timeframe;

/// A single OHLCV observation. `ts` is the bar-open time in epoch seconds, UTC.
///
/// Bars are immutable once stored; a later fetch covering the same timestamp
/// replaces the stored value only through the store's explicit write modes,
/// never implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    /// OHLC consistency: `low ≤ min(open, close)` and `max(open, close) ≤ high`,
    /// with all prices finite and strictly positive.
    pub fn is_consistent(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return false;
        }
        self.low <= self.open.min(self.close) && self.open.max(self.close) <= self.high
    }

    /// Bar-open instant as a UTC datetime. `None` for out-of-range timestamps.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.ts, 0)
    }

    /// Calendar date (UTC) of the bar open.
    pub fn date(&self) -> Option<NaiveDate> {
        self.datetime().map(|dt| dt.date_naive())
    }
}

/// Identifies one stored series: a symbol within a category at one granularity.
///
/// This is the unit of partitioning (together with year/month) and the unit
/// of ingestion work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub category: String,
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl SeriesKey {
    pub fn new(
        category: impl Into<String>,
        symbol: impl Into<String>,
        timeframe: Timeframe,
    ) -> Self {
        Self {
            category: category.into(),
            symbol: symbol.into(),
            timeframe,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.category, self.symbol, self.timeframe)
    }
}
