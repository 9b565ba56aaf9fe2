//! Partitioned Parquet store.
//!
//! Layout: `{root}/{category}/{symbol}/{timeframe}/{year}/{month:02}.parquet`,
//! plus a `meta.json` sidecar per series directory.
//!
//! Guarantees:
//! - Atomic writes (write to .tmp, rename into place)
//! - Append merges by timestamp, newest value wins, always re-sorted
//! - Per-series locking: concurrent writers to the same series serialize
//!   their read-merge-write cycle; different series never contend
//! - Corrupt partitions are quarantined on read ({file}.quarantined), never
//!   silently dropped

pub mod partition;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Bar, SeriesKey};
use crate::timeframe::Timeframe;
use partition::Month;

/// How a write treats data already present in the target partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Merge with existing rows; on timestamp conflict the new bar wins.
    Append,
    /// Replace the content of every touched partition wholesale.
    Overwrite,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("bar timestamp {0} is out of representable range")]
    BadTimestamp(i64),
}

fn io_err(path: &Path, source: io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Sidecar metadata for one series, refreshed on every write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesMeta {
    pub first_ts: i64,
    pub last_ts: i64,
    pub last_write_at: DateTime<Utc>,
    /// blake3 over the last written batch, for change detection.
    pub last_batch_hash: String,
}

/// Outcome of a write call.
#[derive(Debug, Clone, Copy)]
pub struct WriteSummary {
    pub written: usize,
    pub partitions_touched: usize,
}

/// Read-only diagnostic over one series.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub record_count: usize,
    pub null_counts: BTreeMap<String, usize>,
    pub duplicate_count: usize,
    pub invalid_ohlc_count: usize,
    pub unreadable_partitions: usize,
    pub ts_range: Option<(i64, i64)>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.duplicate_count == 0
            && self.invalid_ohlc_count == 0
            && self.unreadable_partitions == 0
            && self.null_counts.values().all(|&n| n == 0)
    }
}

const COLUMNS: [&str; 6] = ["ts", "open", "high", "low", "close", "volume"];

/// The partitioned time-series store.
pub struct PartitionedStore {
    root: PathBuf,
    write_locks: Mutex<HashMap<SeriesKey, Arc<Mutex<()>>>>,
}

impl PartitionedStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn series_dir(&self, key: &SeriesKey) -> PathBuf {
        self.root
            .join(&key.category)
            .join(&key.symbol)
            .join(key.timeframe.as_str())
    }

    fn partition_path(&self, key: &SeriesKey, month: Month) -> PathBuf {
        self.series_dir(key)
            .join(month.year.to_string())
            .join(month.file_name())
    }

    fn meta_path(&self, key: &SeriesKey) -> PathBuf {
        self.series_dir(key).join("meta.json")
    }

    /// The per-series lock guarding read-merge-write cycles.
    fn series_lock(&self, key: &SeriesKey) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().unwrap();
        locks.entry(key.clone()).or_default().clone()
    }

    /// Write `bars` into their month partitions. Empty batches are a no-op.
    pub fn write(
        &self,
        key: &SeriesKey,
        bars: &[Bar],
        mode: WriteMode,
    ) -> Result<WriteSummary, StoreError> {
        if bars.is_empty() {
            return Ok(WriteSummary {
                written: 0,
                partitions_touched: 0,
            });
        }

        let lock = self.series_lock(key);
        let _guard = lock.lock().unwrap();

        let mut by_month: BTreeMap<Month, Vec<Bar>> = BTreeMap::new();
        for bar in bars {
            let month = Month::of_ts(bar.ts).ok_or(StoreError::BadTimestamp(bar.ts))?;
            by_month.entry(month).or_default().push(*bar);
        }

        let mut written = 0usize;
        let partitions_touched = by_month.len();

        for (month, batch) in by_month {
            let path = self.partition_path(key, month);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }

            let mut merged: BTreeMap<i64, Bar> = BTreeMap::new();
            if mode == WriteMode::Append && path.exists() {
                for bar in read_partition(&path)? {
                    merged.insert(bar.ts, bar);
                }
            }
            for bar in batch {
                merged.insert(bar.ts, bar);
            }

            let rows: Vec<Bar> = merged.into_values().collect();
            written += rows.len();

            let df = bars_to_dataframe(&rows)?;
            let tmp = path.with_extension("parquet.tmp");
            write_parquet(&df, &tmp)?;
            fs::rename(&tmp, &path).map_err(|e| {
                let _ = fs::remove_file(&tmp);
                io_err(&path, e)
            })?;
        }

        self.refresh_meta(key, bars)?;

        Ok(WriteSummary {
            written,
            partitions_touched,
        })
    }

    fn refresh_meta(&self, key: &SeriesKey, batch: &[Bar]) -> Result<(), StoreError> {
        let batch_first = batch.iter().map(|b| b.ts).min().unwrap_or(0);
        let batch_last = batch.iter().map(|b| b.ts).max().unwrap_or(0);

        let previous = self.meta(key);
        let meta = SeriesMeta {
            first_ts: previous
                .as_ref()
                .map(|m| m.first_ts.min(batch_first))
                .unwrap_or(batch_first),
            last_ts: previous
                .as_ref()
                .map(|m| m.last_ts.max(batch_last))
                .unwrap_or(batch_last),
            last_write_at: Utc::now(),
            last_batch_hash: hash_bars(batch),
        };

        let path = self.meta_path(key);
        let json = serde_json::to_string_pretty(&meta)
            .map_err(|e| StoreError::Parquet(format!("meta serialization: {e}")))?;
        fs::write(&path, json).map_err(|e| io_err(&path, e))
    }

    /// Sidecar metadata, if the series has ever been written.
    pub fn meta(&self, key: &SeriesKey) -> Option<SeriesMeta> {
        let content = fs::read_to_string(self.meta_path(key)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Months that have a partition file on disk, ascending.
    fn months_present(&self, key: &SeriesKey) -> Vec<Month> {
        let dir = self.series_dir(key);
        let Ok(years) = fs::read_dir(&dir) else {
            return Vec::new();
        };

        let mut months = Vec::new();
        for year_entry in years.flatten() {
            let Ok(year) = year_entry.file_name().to_string_lossy().parse::<i32>() else {
                continue;
            };
            let Ok(files) = fs::read_dir(year_entry.path()) else {
                continue;
            };
            for file in files.flatten() {
                let name = file.file_name().to_string_lossy().into_owned();
                let Some(stem) = name.strip_suffix(".parquet") else {
                    continue;
                };
                if let Ok(month) = stem.parse::<u32>() {
                    if (1..=12).contains(&month) {
                        months.push(Month { year, month });
                    }
                }
            }
        }
        months.sort();
        months
    }

    /// Read all bars for `key` whose timestamp falls within the optional
    /// inclusive bounds, sorted and de-duplicated. The result is identical
    /// regardless of how many month partitions the range straddles.
    pub fn read_range(
        &self,
        key: &SeriesKey,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<Vec<Bar>, StoreError> {
        let mut merged: BTreeMap<i64, Bar> = BTreeMap::new();

        for month in self.months_present(key) {
            if !month.intersects(from, to) {
                continue;
            }
            let path = self.partition_path(key, month);
            match read_partition(&path) {
                Ok(bars) => {
                    for bar in bars {
                        merged.insert(bar.ts, bar);
                    }
                }
                Err(e) => {
                    let quarantine = path.with_extension("parquet.quarantined");
                    log::warn!(
                        "quarantining corrupt partition {} for {key}: {e}",
                        path.display()
                    );
                    let _ = fs::rename(&path, &quarantine);
                }
            }
        }

        let mut bars: Vec<Bar> = merged.into_values().collect();
        if let Some(from) = from {
            bars.retain(|b| b.ts >= from);
        }
        if let Some(to) = to {
            bars.retain(|b| b.ts <= to);
        }
        Ok(bars)
    }

    /// Maximum timestamp across all partitions, or `None` when no data
    /// exists. Drives incremental "fetch only the gap since last run".
    pub fn last_ts(&self, key: &SeriesKey) -> Result<Option<i64>, StoreError> {
        for month in self.months_present(key).into_iter().rev() {
            let path = self.partition_path(key, month);
            match read_partition(&path) {
                Ok(bars) => {
                    if let Some(max) = bars.iter().map(|b| b.ts).max() {
                        return Ok(Some(max));
                    }
                }
                Err(e) => {
                    log::warn!("skipping unreadable partition {}: {e}", path.display());
                }
            }
        }
        Ok(None)
    }

    /// Read-only diagnostic: schema/null/duplicate/OHLC checks over every
    /// partition of the series. Never mutates or quarantines.
    pub fn validate(&self, key: &SeriesKey) -> Result<ValidationReport, StoreError> {
        let mut null_counts: BTreeMap<String, usize> =
            COLUMNS.iter().map(|c| (c.to_string(), 0)).collect();
        let mut record_count = 0usize;
        let mut duplicate_count = 0usize;
        let mut invalid_ohlc_count = 0usize;
        let mut unreadable_partitions = 0usize;
        let mut ts_min: Option<i64> = None;
        let mut ts_max: Option<i64> = None;
        let mut seen: BTreeMap<i64, usize> = BTreeMap::new();

        for month in self.months_present(key) {
            let path = self.partition_path(key, month);
            let df = match open_dataframe(&path) {
                Ok(df) => df,
                Err(e) => {
                    log::warn!("unreadable partition {}: {e}", path.display());
                    unreadable_partitions += 1;
                    continue;
                }
            };

            record_count += df.height();
            for column in COLUMNS {
                match df.column(column) {
                    Ok(series) => {
                        *null_counts.get_mut(column).expect("seeded above") +=
                            series.null_count();
                    }
                    Err(_) => {
                        // A missing column nullifies every row of it.
                        *null_counts.get_mut(column).expect("seeded above") += df.height();
                    }
                }
            }

            if let Ok(bars) = dataframe_to_bars(&df) {
                for bar in &bars {
                    *seen.entry(bar.ts).or_insert(0) += 1;
                    if !bar.is_consistent() {
                        invalid_ohlc_count += 1;
                    }
                    ts_min = Some(ts_min.map_or(bar.ts, |m| m.min(bar.ts)));
                    ts_max = Some(ts_max.map_or(bar.ts, |m| m.max(bar.ts)));
                }
            }
        }

        duplicate_count += seen.values().filter(|&&n| n > 1).map(|&n| n - 1).sum::<usize>();

        Ok(ValidationReport {
            record_count,
            null_counts,
            duplicate_count,
            invalid_ohlc_count,
            unreadable_partitions,
            ts_range: ts_min.zip(ts_max),
        })
    }

    /// Categories present on disk, sorted.
    pub fn categories(&self) -> Vec<String> {
        list_dirs(&self.root)
    }

    /// Symbols within a category, sorted.
    pub fn symbols(&self, category: &str) -> Vec<String> {
        list_dirs(&self.root.join(category))
    }

    /// Timeframes stored for a symbol, sorted by granularity.
    pub fn timeframes(&self, category: &str, symbol: &str) -> Vec<Timeframe> {
        let mut timeframes: Vec<Timeframe> = list_dirs(&self.root.join(category).join(symbol))
            .iter()
            .filter_map(|name| name.parse().ok())
            .collect();
        timeframes.sort();
        timeframes
    }
}

fn list_dirs(path: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(path) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn hash_bars(bars: &[Bar]) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(&bar.ts.to_le_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
        hasher.update(&bar.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn bars_to_dataframe(bars: &[Bar]) -> Result<DataFrame, StoreError> {
    let ts: Vec<i64> = bars.iter().map(|b| b.ts).collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<u64> = bars.iter().map(|b| b.volume).collect();

    DataFrame::new(vec![
        Column::new("ts".into(), ts),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), StoreError> {
    let file = fs::File::create(path).map_err(|e| io_err(path, e))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| StoreError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

fn open_dataframe(path: &Path) -> Result<DataFrame, StoreError> {
    let file = fs::File::open(path).map_err(|e| io_err(path, e))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| StoreError::Parquet(format!("read parquet: {e}")))
}

fn read_partition(path: &Path) -> Result<Vec<Bar>, StoreError> {
    let df = open_dataframe(path)?;
    for column in COLUMNS {
        if df.column(column).is_err() {
            return Err(StoreError::Parquet(format!(
                "missing column '{column}' in {}",
                path.display()
            )));
        }
    }
    dataframe_to_bars(&df)
}

fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<Bar>, StoreError> {
    let type_err = |name: &str, e: PolarsError| {
        StoreError::Parquet(format!("column '{name}' has unexpected type: {e}"))
    };

    let ts = df
        .column("ts")
        .map_err(|e| type_err("ts", e))?
        .i64()
        .map_err(|e| type_err("ts", e))?;
    let open = df
        .column("open")
        .map_err(|e| type_err("open", e))?
        .f64()
        .map_err(|e| type_err("open", e))?;
    let high = df
        .column("high")
        .map_err(|e| type_err("high", e))?
        .f64()
        .map_err(|e| type_err("high", e))?;
    let low = df
        .column("low")
        .map_err(|e| type_err("low", e))?
        .f64()
        .map_err(|e| type_err("low", e))?;
    let close = df
        .column("close")
        .map_err(|e| type_err("close", e))?
        .f64()
        .map_err(|e| type_err("close", e))?;
    let volume = df
        .column("volume")
        .map_err(|e| type_err("volume", e))?
        .u64()
        .map_err(|e| type_err("volume", e))?;

    let mut bars = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let ts = ts
            .get(i)
            .ok_or_else(|| StoreError::Parquet(format!("null ts at row {i}")))?;
        bars.push(Bar {
            ts,
            open: open.get(i).unwrap_or(f64::NAN),
            high: high.get(i).unwrap_or(f64::NAN),
            low: low.get(i).unwrap_or(f64::NAN),
            close: close.get(i).unwrap_or(f64::NAN),
            volume: volume.get(i).unwrap_or(0),
        });
    }
    Ok(bars)
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_store_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!("barvault_store_{}_{id}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn key() -> SeriesKey {
        SeriesKey::new("nifty50", "RELIANCE", Timeframe::D1)
    }

    fn daily_bar(day_index: i64, close: f64) -> Bar {
        // Days counted from 2023-06-01 so batches span a month boundary
        // once the index climbs past 29.
        let base = 1_685_577_600; // 2023-06-01 00:00:00 UTC
        Bar {
            ts: base + day_index * 86_400,
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1_000 + day_index as u64,
        }
    }

    #[test]
    fn write_and_read_roundtrip() {
        let dir = temp_store_dir();
        let store = PartitionedStore::new(&dir);

        let bars: Vec<Bar> = (0..5).map(|i| daily_bar(i, 100.0 + i as f64)).collect();
        let summary = store.write(&key(), &bars, WriteMode::Append).unwrap();
        assert_eq!(summary.written, 5);
        assert_eq!(summary.partitions_touched, 1);

        let read = store.read_range(&key(), None, None).unwrap();
        assert_eq!(read, bars);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn append_spanning_month_boundary_creates_two_partitions() {
        let dir = temp_store_dir();
        let store = PartitionedStore::new(&dir);

        // 40 daily bars starting 2023-06-01 reach into July.
        let bars: Vec<Bar> = (0..40).map(|i| daily_bar(i, 100.0 + i as f64)).collect();
        let summary = store.write(&key(), &bars, WriteMode::Append).unwrap();
        assert_eq!(summary.partitions_touched, 2);

        assert!(dir
            .join("nifty50/RELIANCE/1d/2023/06.parquet")
            .exists());
        assert!(dir
            .join("nifty50/RELIANCE/1d/2023/07.parquet")
            .exists());

        let read = store.read_range(&key(), None, None).unwrap();
        assert_eq!(read.len(), 40);
        assert!(read.windows(2).all(|w| w[0].ts < w[1].ts));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn append_is_idempotent() {
        let dir = temp_store_dir();
        let store = PartitionedStore::new(&dir);

        let bars: Vec<Bar> = (0..10).map(|i| daily_bar(i, 50.0 + i as f64)).collect();
        store.write(&key(), &bars, WriteMode::Append).unwrap();
        let once = store.read_range(&key(), None, None).unwrap();

        store.write(&key(), &bars, WriteMode::Append).unwrap();
        let twice = store.read_range(&key(), None, None).unwrap();

        assert_eq!(once, twice);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn append_conflict_newest_wins() {
        let dir = temp_store_dir();
        let store = PartitionedStore::new(&dir);

        store
            .write(&key(), &[daily_bar(0, 100.0)], WriteMode::Append)
            .unwrap();
        store
            .write(&key(), &[daily_bar(0, 200.0)], WriteMode::Append)
            .unwrap();

        let read = store.read_range(&key(), None, None).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].close, 200.0);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn overwrite_replaces_partition_content() {
        let dir = temp_store_dir();
        let store = PartitionedStore::new(&dir);

        let original: Vec<Bar> = (0..5).map(|i| daily_bar(i, 100.0)).collect();
        store.write(&key(), &original, WriteMode::Append).unwrap();

        store
            .write(&key(), &[daily_bar(2, 300.0)], WriteMode::Overwrite)
            .unwrap();

        let read = store.read_range(&key(), None, None).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].close, 300.0);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn read_range_trims_to_bounds() {
        let dir = temp_store_dir();
        let store = PartitionedStore::new(&dir);

        let bars: Vec<Bar> = (0..40).map(|i| daily_bar(i, 100.0)).collect();
        store.write(&key(), &bars, WriteMode::Append).unwrap();

        let from = bars[10].ts;
        let to = bars[35].ts;
        let read = store.read_range(&key(), Some(from), Some(to)).unwrap();

        assert_eq!(read.len(), 26);
        assert_eq!(read.first().unwrap().ts, from);
        assert_eq!(read.last().unwrap().ts, to);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn cross_partition_read_matches_manual_merge() {
        let dir = temp_store_dir();
        let store = PartitionedStore::new(&dir);

        // Span three months, written out of order.
        let late: Vec<Bar> = (60..70).map(|i| daily_bar(i, 1.0)).collect();
        let early: Vec<Bar> = (0..10).map(|i| daily_bar(i, 2.0)).collect();
        let middle: Vec<Bar> = (30..40).map(|i| daily_bar(i, 3.0)).collect();
        store.write(&key(), &late, WriteMode::Append).unwrap();
        store.write(&key(), &early, WriteMode::Append).unwrap();
        store.write(&key(), &middle, WriteMode::Append).unwrap();

        let mut manual: Vec<Bar> = early.iter().chain(&middle).chain(&late).copied().collect();
        manual.sort_by_key(|b| b.ts);

        let read = store.read_range(&key(), None, None).unwrap();
        assert_eq!(read, manual);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn last_ts_tracks_maximum() {
        let dir = temp_store_dir();
        let store = PartitionedStore::new(&dir);

        assert_eq!(store.last_ts(&key()).unwrap(), None);

        let bars: Vec<Bar> = (0..40).map(|i| daily_bar(i, 100.0)).collect();
        store.write(&key(), &bars, WriteMode::Append).unwrap();

        assert_eq!(store.last_ts(&key()).unwrap(), Some(bars[39].ts));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn validate_clean_series() {
        let dir = temp_store_dir();
        let store = PartitionedStore::new(&dir);

        let bars: Vec<Bar> = (0..40).map(|i| daily_bar(i, 100.0 + i as f64)).collect();
        store.write(&key(), &bars, WriteMode::Append).unwrap();

        let report = store.validate(&key()).unwrap();
        assert!(report.is_valid());
        assert_eq!(report.record_count, 40);
        assert_eq!(report.duplicate_count, 0);
        assert_eq!(report.invalid_ohlc_count, 0);
        assert_eq!(report.ts_range, Some((bars[0].ts, bars[39].ts)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn validate_missing_series_is_empty() {
        let dir = temp_store_dir();
        let store = PartitionedStore::new(&dir);

        let report = store.validate(&key()).unwrap();
        assert!(report.is_valid());
        assert_eq!(report.record_count, 0);
        assert_eq!(report.ts_range, None);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_partition_quarantined_on_read() {
        let dir = temp_store_dir();
        let store = PartitionedStore::new(&dir);

        let bars: Vec<Bar> = (0..5).map(|i| daily_bar(i, 100.0)).collect();
        store.write(&key(), &bars, WriteMode::Append).unwrap();

        let partition = dir.join("nifty50/RELIANCE/1d/2023/06.parquet");
        fs::write(&partition, b"not parquet").unwrap();

        let read = store.read_range(&key(), None, None).unwrap();
        assert!(read.is_empty());
        assert!(partition.with_extension("parquet.quarantined").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn listing_walks_layout() {
        let dir = temp_store_dir();
        let store = PartitionedStore::new(&dir);

        store
            .write(&key(), &[daily_bar(0, 100.0)], WriteMode::Append)
            .unwrap();
        store
            .write(
                &SeriesKey::new("nifty50", "TCS", Timeframe::M15),
                &[daily_bar(0, 100.0)],
                WriteMode::Append,
            )
            .unwrap();
        store
            .write(
                &SeriesKey::new("banknifty", "SBIN", Timeframe::D1),
                &[daily_bar(0, 100.0)],
                WriteMode::Append,
            )
            .unwrap();

        assert_eq!(store.categories(), vec!["banknifty", "nifty50"]);
        assert_eq!(store.symbols("nifty50"), vec!["RELIANCE", "TCS"]);
        assert_eq!(
            store.timeframes("nifty50", "TCS"),
            vec![Timeframe::M15]
        );
        assert!(store.symbols("missing").is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn meta_sidecar_tracks_coverage() {
        let dir = temp_store_dir();
        let store = PartitionedStore::new(&dir);

        let first: Vec<Bar> = (5..10).map(|i| daily_bar(i, 100.0)).collect();
        store.write(&key(), &first, WriteMode::Append).unwrap();
        let second: Vec<Bar> = (0..3).map(|i| daily_bar(i, 100.0)).collect();
        store.write(&key(), &second, WriteMode::Append).unwrap();

        let meta = store.meta(&key()).unwrap();
        assert_eq!(meta.first_ts, second[0].ts);
        assert_eq!(meta.last_ts, first[4].ts);
        assert!(!meta.last_batch_hash.is_empty());

        let _ = fs::remove_dir_all(&dir);
    }
}
