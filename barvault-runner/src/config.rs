//! Run configuration — one TOML file, overridable by CLI flags.
//!
//! Everything the pipeline needs is constructed from this and passed down by
//! reference: no globals, no environment probing, no cwd-relative token
//! guessing. The access token itself lives in a separate file named by
//! `provider.token_path` so the config can be committed without secrets.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use barvault_core::provider::circuit_breaker::CircuitBreaker;
use barvault_core::provider::rest::ProviderConfig;
use barvault_core::timeframe::{Timeframe, WindowLimits};

use crate::pool::PoolConfig;
use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("provider.token_path is not set; cannot load access token")]
    MissingTokenPath,
}

/// Connection settings for the quote-history service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub base_url: String,
    /// File containing the access token, refreshed by an external process.
    pub token_path: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token_path: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub store_root: PathBuf,
    pub registry_path: PathBuf,
    pub universe_path: Option<PathBuf>,
    pub timeframes: Vec<Timeframe>,
    pub workers: usize,
    pub pacing_ms: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Breaker cooldown when a rate limit carries no retry-after hint.
    pub cooldown_secs: u64,
    pub breaker_threshold: u32,
    pub intraday_window_days: u32,
    pub daily_window_days: u32,
    pub backfill_start: NaiveDate,
    /// InProgress tasks older than this are treated as orphaned on startup.
    pub stale_after_mins: i64,
    pub include_open_bar: bool,
    pub provider: ProviderSettings,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from("data"),
            registry_path: PathBuf::from("registry.jsonl"),
            universe_path: None,
            timeframes: vec![Timeframe::D1],
            workers: 4,
            pacing_ms: 250,
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            cooldown_secs: 900,
            breaker_threshold: 3,
            intraday_window_days: 100,
            daily_window_days: 366,
            backfill_start: NaiveDate::from_ymd_opt(2015, 1, 1)
                .expect("static date is valid"),
            stale_after_mins: 30,
            include_open_bar: false,
            provider: ProviderSettings::default(),
        }
    }
}

impl RunConfig {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms),
            jitter: 0.25,
        }
    }

    pub fn window_limits(&self) -> WindowLimits {
        WindowLimits {
            intraday_days: self.intraday_window_days,
            daily_days: self.daily_window_days,
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.workers,
            pacing: Duration::from_millis(self.pacing_ms),
            retry: self.retry_policy(),
            limits: self.window_limits(),
            backfill_start: self.backfill_start,
            include_open_bar: self.include_open_bar,
        }
    }

    pub fn breaker(&self) -> CircuitBreaker {
        CircuitBreaker::new(
            Duration::from_secs(self.cooldown_secs),
            self.breaker_threshold,
        )
    }

    pub fn stale_age(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.stale_after_mins)
    }

    /// Read the access token file and build the provider config.
    pub fn provider_config(&self) -> Result<ProviderConfig, ConfigError> {
        let token_path = self
            .provider
            .token_path
            .as_ref()
            .ok_or(ConfigError::MissingTokenPath)?;
        let access_token = std::fs::read_to_string(token_path)?.trim().to_string();
        Ok(ProviderConfig {
            base_url: self.provider.base_url.clone(),
            access_token,
            timeout_secs: self.provider.timeout_secs,
        })
    }
}
