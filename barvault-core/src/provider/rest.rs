//! REST client for the external quote-history service.
//!
//! One `fetch_window` call issues one GET against the service's history
//! endpoint. The client is built from an explicit [`ProviderConfig`] — base
//! URL, access token, timeout — constructed once by the caller and passed in;
//! nothing here reads the environment or guesses file paths.
//!
//! Status mapping: 401/403 → `Auth`, 429 → `RateLimited` (honoring a
//! `retry-after` header when present), 5xx and connect/timeout failures →
//! `Transient`. A well-formed "no data" reply, a missing candles field, or an
//! unparseable body for an otherwise-successful response all yield an empty
//! batch: for a valid request that is absence of data, not failure.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;

use super::circuit_breaker::CircuitBreaker;
use super::{FetchError, QuoteProvider};
use crate::domain::Bar;
use crate::timeframe::Timeframe;

/// Connection settings for the history service.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub access_token: String,
    pub timeout_secs: u64,
}

/// History endpoint reply: a status string plus rows of
/// `[ts, open, high, low, close, volume]`.
#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    s: Option<String>,
    #[serde(default)]
    candles: Option<Vec<(i64, f64, f64, f64, f64, f64)>>,
}

pub struct RestProvider {
    client: reqwest::blocking::Client,
    config: ProviderConfig,
    breaker: Arc<CircuitBreaker>,
}

impl RestProvider {
    pub fn new(config: ProviderConfig, breaker: Arc<CircuitBreaker>) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Transient(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            breaker,
        })
    }

    /// The service's resolution token for a timeframe.
    fn resolution_param(tf: Timeframe) -> &'static str {
        match tf {
            Timeframe::M1 => "1",
            Timeframe::M5 => "5",
            Timeframe::M15 => "15",
            Timeframe::M30 => "30",
            Timeframe::H1 => "60",
            Timeframe::D1 => "D",
        }
    }

    fn history_url(&self, symbol: &str, tf: Timeframe, from: NaiveDate, to: NaiveDate) -> String {
        format!(
            "{}/history?symbol={symbol}&resolution={}&date_format=1&range_from={from}&range_to={to}",
            self.config.base_url.trim_end_matches('/'),
            Self::resolution_param(tf),
        )
    }

    fn candles_to_bars(response: HistoryResponse) -> Vec<Bar> {
        if response.s.as_deref() == Some("no_data") {
            return Vec::new();
        }
        response
            .candles
            .unwrap_or_default()
            .into_iter()
            .map(|(ts, open, high, low, close, volume)| Bar {
                ts,
                open,
                high,
                low,
                close,
                volume: volume.max(0.0).round() as u64,
            })
            .collect()
    }
}

impl QuoteProvider for RestProvider {
    fn name(&self) -> &str {
        "quote-history-rest"
    }

    fn fetch_window(
        &self,
        symbol: &str,
        tf: Timeframe,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, FetchError> {
        if !self.breaker.is_allowed() {
            return Err(FetchError::BreakerOpen);
        }

        let url = self.history_url(symbol, tf, from, to);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.access_token)
            .send()
            .map_err(|e| {
                self.breaker.record_failure();
                FetchError::Transient(format!("request failed for {symbol}: {e}"))
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(FetchError::Auth(format!("HTTP {status} for {symbol}")));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            return Err(FetchError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            self.breaker.record_failure();
            return Err(FetchError::Transient(format!(
                "HTTP {status} for {symbol}"
            )));
        }

        let parsed: HistoryResponse = match response.json() {
            Ok(parsed) => parsed,
            Err(e) => {
                // Absence of data, not failure: the request itself succeeded.
                log::warn!("unparseable history body for {symbol} ({tf}): {e}");
                self.breaker.record_success();
                return Ok(Vec::new());
            }
        };

        self.breaker.record_success();
        Ok(Self::candles_to_bars(parsed))
    }

    fn is_available(&self) -> bool {
        self.breaker.is_allowed()
    }
}
