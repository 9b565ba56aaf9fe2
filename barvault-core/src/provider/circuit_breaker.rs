//! Circuit breaker shared between the provider client and the worker pool.
//!
//! Repeated transient failures trip it after a threshold; a rate-limit
//! response opens it immediately for the provider-announced (or configured)
//! cooldown. While open, the pool stops dispatching new tasks instead of
//! burning per-task attempts against a quota that will not reset for a while.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    /// Requests allowed.
    Closed,
    /// Requests refused until the pause expires.
    Open { until: Instant },
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    cooldown: Duration,
    consecutive_failures: Mutex<u32>,
    failure_threshold: u32,
}

impl CircuitBreaker {
    /// `cooldown` is the pause applied when the threshold trips the breaker
    /// and the fallback when a rate limit carries no retry-after hint.
    pub fn new(cooldown: Duration, failure_threshold: u32) -> Self {
        Self {
            state: Mutex::new(BreakerState::Closed),
            cooldown,
            consecutive_failures: Mutex::new(0),
            failure_threshold,
        }
    }

    /// Default used by the ingestion pool: 15-minute cooldown, trips after 3
    /// consecutive failures.
    pub fn default_provider() -> Self {
        Self::new(Duration::from_secs(15 * 60), 3)
    }

    /// Check whether requests are currently allowed; resets an expired pause.
    pub fn is_allowed(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match *state {
            BreakerState::Closed => true,
            BreakerState::Open { until } => {
                if Instant::now() >= until {
                    *state = BreakerState::Closed;
                    *self.consecutive_failures.lock().unwrap() = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful request, resetting the failure streak.
    pub fn record_success(&self) {
        *self.consecutive_failures.lock().unwrap() = 0;
    }

    /// Record a failed request. Once the streak reaches the threshold, the
    /// breaker opens for the configured cooldown.
    pub fn record_failure(&self) {
        let mut failures = self.consecutive_failures.lock().unwrap();
        *failures += 1;
        if *failures >= self.failure_threshold {
            *self.state.lock().unwrap() = BreakerState::Open {
                until: Instant::now() + self.cooldown,
            };
        }
    }

    /// Open the breaker for exactly `pause` (rate-limit retry-after).
    pub fn pause_for(&self, pause: Duration) {
        *self.state.lock().unwrap() = BreakerState::Open {
            until: Instant::now() + pause,
        };
    }

    /// Open the breaker for the configured cooldown.
    pub fn pause(&self) {
        self.pause_for(self.cooldown);
    }

    /// Remaining pause time (zero when closed).
    pub fn remaining(&self) -> Duration {
        match *self.state.lock().unwrap() {
            BreakerState::Closed => Duration::ZERO,
            BreakerState::Open { until } => until.saturating_duration_since(Instant::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_closed() {
        let cb = CircuitBreaker::new(Duration::from_secs(60), 3);
        assert!(cb.is_allowed());
        assert_eq!(cb.remaining(), Duration::ZERO);
    }

    #[test]
    fn trips_after_threshold_failures() {
        let cb = CircuitBreaker::new(Duration::from_secs(60), 3);
        cb.record_failure();
        cb.record_failure();
        assert!(cb.is_allowed());
        cb.record_failure();
        assert!(!cb.is_allowed());
    }

    #[test]
    fn success_resets_streak() {
        let cb = CircuitBreaker::new(Duration::from_secs(60), 3);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert!(cb.is_allowed());
    }

    #[test]
    fn explicit_pause_overrides_streak() {
        let cb = CircuitBreaker::new(Duration::from_secs(60), 3);
        cb.pause_for(Duration::from_secs(120));
        assert!(!cb.is_allowed());
        assert!(cb.remaining() > Duration::from_secs(60));
    }

    #[test]
    fn reopens_after_pause_expires() {
        let cb = CircuitBreaker::new(Duration::from_millis(10), 3);
        cb.pause();
        assert!(!cb.is_allowed());
        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.is_allowed());
    }
}
