//! Quote-history provider boundary — trait and error taxonomy.
//!
//! The `QuoteProvider` trait abstracts over the external history service so
//! the whole pipeline can run against a mock in tests. Errors carry enough
//! classification for the orchestrator to choose between aborting the run
//! (auth), pausing dispatch (rate limit), and bounded backoff (transient).
//! A window that legitimately has no data is `Ok` with an empty vector, not
//! an error.

pub mod circuit_breaker;
pub mod rest;

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::Bar;
use crate::timeframe::Timeframe;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Credentials rejected. Fatal for the whole run — retrying burns quota
    /// without any chance of success until the token is refreshed externally.
    #[error("authentication rejected by provider: {0}")]
    Auth(String),

    /// Provider-side throttling. Retryable only after a cooldown.
    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    /// Network hiccup or a 5xx from the service. Retryable with backoff.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// The shared breaker is open; no request was made.
    #[error("requests paused: provider breaker is open")]
    BreakerOpen,
}

/// One external history source. Implementations perform exactly one service
/// call per `fetch_window` invocation; splitting, pacing, and retries are the
/// caller's concern.
pub trait QuoteProvider: Send + Sync {
    /// Human-readable source name, used in logs.
    fn name(&self) -> &str;

    /// Fetch all bars for `symbol` at `tf` whose open falls within the
    /// inclusive date range `[from, to]` (UTC). An empty vector means the
    /// window has no data (e.g. the instrument was not yet listed).
    fn fetch_window(
        &self,
        symbol: &str,
        tf: Timeframe,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, FetchError>;

    /// Whether the source is currently accepting requests.
    fn is_available(&self) -> bool {
        true
    }
}
