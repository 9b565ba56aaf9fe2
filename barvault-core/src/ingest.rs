//! Validation pipeline between the fetch adapter and the store.
//!
//! Every batch passes through here before it may be written: timestamps are
//! checked for sanity, OHLC consistency is enforced, duplicates within the
//! batch collapse (latest occurrence wins), and the output is sorted by
//! timestamp. A batch with integrity violations is rejected wholesale — bad
//! windows are never silently persisted.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

use crate::domain::Bar;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(
        "integrity check failed for {symbol}: {invalid_ohlc} inconsistent OHLC bar(s), \
         {malformed_ts} malformed timestamp(s)"
    )]
    Integrity {
        symbol: String,
        invalid_ohlc: usize,
        malformed_ts: usize,
    },

    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A validated, sorted, de-duplicated batch.
#[derive(Debug)]
pub struct IngestResult {
    pub bars: Vec<Bar>,
    /// In-batch duplicates collapsed (latest occurrence kept).
    pub duplicates_dropped: usize,
}

/// Validate and normalize a fetched batch.
///
/// Errors when any bar has a non-positive or out-of-range timestamp or
/// violates OHLC consistency; the caller decides what to do with the window
/// (typically: fail the task for manual review).
pub fn ingest(symbol: &str, bars: Vec<Bar>) -> Result<IngestResult, IngestError> {
    let mut invalid_ohlc = 0usize;
    let mut malformed_ts = 0usize;

    for bar in &bars {
        if bar.ts <= 0 || bar.datetime().is_none() {
            malformed_ts += 1;
        } else if !bar.is_consistent() {
            invalid_ohlc += 1;
        }
    }

    if invalid_ohlc > 0 || malformed_ts > 0 {
        return Err(IngestError::Integrity {
            symbol: symbol.to_string(),
            invalid_ohlc,
            malformed_ts,
        });
    }

    let total = bars.len();
    let mut by_ts: BTreeMap<i64, Bar> = BTreeMap::new();
    for bar in bars {
        by_ts.insert(bar.ts, bar);
    }
    let deduped: Vec<Bar> = by_ts.into_values().collect();
    let duplicates_dropped = total - deduped.len();

    Ok(IngestResult {
        bars: deduped,
        duplicates_dropped,
    })
}

/// Read bars from a CSV file with a `ts,open,high,low,close,volume` header.
///
/// Used by the operator-facing import path; the result still goes through
/// [`ingest`] before it reaches the store.
pub fn bars_from_csv(path: &Path) -> Result<Vec<Bar>, IngestError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut bars = Vec::new();
    for record in reader.deserialize() {
        let bar: Bar = record?;
        bars.push(bar);
    }
    Ok(bars)
}
