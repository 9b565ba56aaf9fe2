//! BarVault Core — bar model, partitioned store, and the quote-history adapter.
//!
//! This crate contains the storage and provider halves of the ingestion
//! pipeline:
//! - Domain types (bars, series keys, timeframes, window limits)
//! - Partitioned Parquet store with append-merge, range reads, and a
//!   read-only validation diagnostic
//! - Quote-history provider trait, REST client, and circuit breaker
//! - Range fetcher (window splitting, pacing, partial-candle clamp)
//! - Ingest validation between fetch and store
//! - Universe config and the read-side query loader

pub mod domain;
pub mod fetch;
pub mod ingest;
pub mod loader;
pub mod provider;
pub mod store;
pub mod timeframe;
pub mod universe;
pub mod window;

pub use domain::{Bar, SeriesKey};
pub use fetch::{FetchOptions, RangeFetcher};
pub use ingest::{ingest, IngestError, IngestResult};
pub use loader::{LoadError, QueryLoader};
pub use provider::circuit_breaker::CircuitBreaker;
pub use provider::rest::{ProviderConfig, RestProvider};
pub use provider::{FetchError, QuoteProvider};
pub use store::{PartitionedStore, StoreError, ValidationReport, WriteMode, WriteSummary};
pub use timeframe::{Timeframe, WindowLimits};
pub use universe::Universe;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything the worker pool shares across threads
    /// is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Bar>();
        require_sync::<Bar>();
        require_send::<SeriesKey>();
        require_sync::<SeriesKey>();
        require_send::<Timeframe>();
        require_sync::<Timeframe>();
        require_send::<WindowLimits>();
        require_sync::<WindowLimits>();
        require_send::<PartitionedStore>();
        require_sync::<PartitionedStore>();
        require_send::<CircuitBreaker>();
        require_sync::<CircuitBreaker>();
        require_send::<FetchError>();
        require_sync::<FetchError>();
    }
}
