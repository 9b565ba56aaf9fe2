//! Read-side query layer over the partitioned store.
//!
//! Downstream consumers (research notebooks, backtests) go through here
//! rather than touching partition files: discovery of what exists, plus
//! bounded range loads. Missing keys are explicit `NotFound` results.

use thiserror::Error;

use crate::domain::{Bar, SeriesKey};
use crate::store::{PartitionedStore, StoreError};
use crate::timeframe::Timeframe;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Thin query facade; holds no state beyond the store reference.
pub struct QueryLoader<'a> {
    store: &'a PartitionedStore,
}

impl<'a> QueryLoader<'a> {
    pub fn new(store: &'a PartitionedStore) -> Self {
        Self { store }
    }

    pub fn available_categories(&self) -> Vec<String> {
        self.store.categories()
    }

    pub fn available_symbols(&self, category: &str) -> Result<Vec<String>, LoadError> {
        if !self.store.categories().iter().any(|c| c == category) {
            return Err(LoadError::NotFound(format!("category '{category}'")));
        }
        Ok(self.store.symbols(category))
    }

    pub fn available_timeframes(
        &self,
        category: &str,
        symbol: &str,
    ) -> Result<Vec<Timeframe>, LoadError> {
        if !self.store.symbols(category).iter().any(|s| s == symbol) {
            return Err(LoadError::NotFound(format!("symbol '{category}/{symbol}'")));
        }
        Ok(self.store.timeframes(category, symbol))
    }

    /// Load a series, optionally bounded by inclusive epoch-second timestamps.
    pub fn load(
        &self,
        category: &str,
        symbol: &str,
        timeframe: Timeframe,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<Vec<Bar>, LoadError> {
        let key = SeriesKey::new(category, symbol, timeframe);
        if !self
            .store
            .timeframes(category, symbol)
            .contains(&timeframe)
        {
            return Err(LoadError::NotFound(format!("series '{key}'")));
        }
        Ok(self.store.read_range(&key, from, to)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::WriteMode;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_store() -> (std::path::PathBuf, PartitionedStore) {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir =
            std::env::temp_dir().join(format!("barvault_loader_{}_{id}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let store = PartitionedStore::new(&dir);
        (dir, store)
    }

    fn seed(store: &PartitionedStore) {
        let bars: Vec<Bar> = (0..5)
            .map(|i| Bar {
                ts: 1_685_577_600 + i * 86_400,
                open: 99.0,
                high: 101.0,
                low: 98.0,
                close: 100.0,
                volume: 10,
            })
            .collect();
        store
            .write(
                &SeriesKey::new("nifty50", "RELIANCE", Timeframe::D1),
                &bars,
                WriteMode::Append,
            )
            .unwrap();
    }

    #[test]
    fn discovery_and_load() {
        let (dir, store) = temp_store();
        seed(&store);
        let loader = QueryLoader::new(&store);

        assert_eq!(loader.available_categories(), vec!["nifty50"]);
        assert_eq!(
            loader.available_symbols("nifty50").unwrap(),
            vec!["RELIANCE"]
        );
        assert_eq!(
            loader.available_timeframes("nifty50", "RELIANCE").unwrap(),
            vec![Timeframe::D1]
        );

        let bars = loader
            .load("nifty50", "RELIANCE", Timeframe::D1, None, None)
            .unwrap();
        assert_eq!(bars.len(), 5);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn bounded_load_trims() {
        let (dir, store) = temp_store();
        seed(&store);
        let loader = QueryLoader::new(&store);

        let from = 1_685_577_600 + 86_400;
        let to = 1_685_577_600 + 3 * 86_400;
        let bars = loader
            .load("nifty50", "RELIANCE", Timeframe::D1, Some(from), Some(to))
            .unwrap();
        assert_eq!(bars.len(), 3);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_keys_are_not_found() {
        let (dir, store) = temp_store();
        seed(&store);
        let loader = QueryLoader::new(&store);

        assert!(matches!(
            loader.available_symbols("crypto"),
            Err(LoadError::NotFound(_))
        ));
        assert!(matches!(
            loader.available_timeframes("nifty50", "ZZZ"),
            Err(LoadError::NotFound(_))
        ));
        assert!(matches!(
            loader.load("nifty50", "RELIANCE", Timeframe::M5, None, None),
            Err(LoadError::NotFound(_))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
