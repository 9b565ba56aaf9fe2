//! Retry policy as data, not control flow.
//!
//! The schedule (attempt bound, exponential delay, jitter) and the
//! classification of fetch errors into orchestrator actions are both plain
//! functions over plain values, testable without a provider or a clock.

use std::time::Duration;

use rand::Rng;

use barvault_core::provider::FetchError;

use crate::registry::ErrorClass;

/// Bounded exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retry attempts per task (beyond the initial try).
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay randomized in both directions (0.25 = ±25%).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Whether retry number `attempt` (1-based) is still within bounds.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    /// Delay before retry `attempt` (1-based): base × 2^(attempt-1), capped,
    /// then jittered.
    pub fn delay_for(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let raw = self.base_delay.as_millis() as f64 * 2f64.powi(exponent as i32);
        let capped = raw.min(self.max_delay.as_millis() as f64);
        let span = capped * self.jitter;
        let jittered = if span > 0.0 {
            capped + rng.gen_range(-span..=span)
        } else {
            capped
        };
        Duration::from_millis(jittered.max(0.0) as u64)
    }
}

/// What the orchestrator should do with a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Stop the whole run; retrying cannot succeed.
    Fatal,
    /// Pause dispatch for a cooldown instead of burning attempts.
    Cooldown { retry_after: Option<Duration> },
    /// Retry the same task after a backoff delay.
    Backoff,
}

pub fn classify(err: &FetchError) -> RetryClass {
    match err {
        FetchError::Auth(_) => RetryClass::Fatal,
        FetchError::RateLimited { retry_after_secs } => RetryClass::Cooldown {
            retry_after: (*retry_after_secs > 0).then(|| Duration::from_secs(*retry_after_secs)),
        },
        FetchError::BreakerOpen => RetryClass::Cooldown { retry_after: None },
        FetchError::Transient(_) => RetryClass::Backoff,
    }
}

/// The registry-facing failure class for a fetch error.
pub fn error_class(err: &FetchError) -> ErrorClass {
    match err {
        FetchError::Auth(_) => ErrorClass::Auth,
        FetchError::RateLimited { .. } | FetchError::BreakerOpen => ErrorClass::RateLimit,
        FetchError::Transient(_) => ErrorClass::Transient,
    }
}
