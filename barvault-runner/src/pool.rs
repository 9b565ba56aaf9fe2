//! Worker pool — drives the registry to completion with bounded concurrency.
//!
//! Each worker loops: claim a task, plan its date range (incremental from the
//! store's last timestamp, else the configured backfill start), fetch through
//! the range adapter, validate, append to the store, then complete or fail
//! the task. Transient errors retry in place with jittered backoff; a rate
//! limit opens the shared breaker and dispatch stops (explicit resume picks
//! the work back up); an auth failure raises the stop flag so every worker
//! drains promptly instead of burning quota.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use rand::rngs::ThreadRng;

use barvault_core::fetch::{FetchOptions, RangeFetcher};
use barvault_core::ingest;
use barvault_core::provider::circuit_breaker::CircuitBreaker;
use barvault_core::provider::QuoteProvider;
use barvault_core::store::{PartitionedStore, WriteMode};
use barvault_core::timeframe::WindowLimits;

use crate::registry::{ErrorClass, RegistryStats, SharedRegistry, Task};
use crate::retry::{classify, error_class, RetryClass, RetryPolicy};

/// Knobs for one pool run.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    /// Minimum delay between consecutive provider calls per worker.
    pub pacing: Duration,
    pub retry: RetryPolicy,
    pub limits: WindowLimits,
    /// Where backfill starts for a series with no stored data yet.
    pub backfill_start: NaiveDate,
    pub include_open_bar: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            pacing: Duration::from_millis(250),
            retry: RetryPolicy::default(),
            limits: WindowLimits::default(),
            backfill_start: NaiveDate::from_ymd_opt(2015, 1, 1)
                .expect("static date is valid"),
            include_open_bar: false,
        }
    }
}

/// Why a run stopped before draining the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    AuthFailure,
    RateLimitPause,
    External,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub stats: RegistryStats,
    pub elapsed: Duration,
    /// `None` when the registry simply ran out of Pending tasks.
    pub stopped: Option<StopCause>,
}

/// Run the pool until the registry has no more claimable work or a stop
/// condition fires. In-flight tasks always finish or fail; none is left
/// InProgress by a graceful stop.
pub fn run(
    registry: &SharedRegistry,
    provider: &dyn QuoteProvider,
    breaker: &CircuitBreaker,
    store: &PartitionedStore,
    config: &PoolConfig,
    stop: &AtomicBool,
) -> RunOutcome {
    let started = Instant::now();
    let cause: Mutex<Option<StopCause>> = Mutex::new(None);
    let externally_stopped = stop.load(Ordering::Relaxed);

    thread::scope(|scope| {
        for i in 0..config.workers.max(1) {
            thread::Builder::new()
                .name(format!("barvault-worker-{i}"))
                .spawn_scoped(scope, || {
                    worker_loop(registry, provider, breaker, store, config, stop, &cause)
                })
                .expect("failed to spawn worker thread");
        }
    });

    let mut stopped = *cause.lock().unwrap();
    if stopped.is_none() && (externally_stopped || stop.load(Ordering::Relaxed)) {
        stopped = Some(StopCause::External);
    }

    RunOutcome {
        stats: registry.stats(),
        elapsed: started.elapsed(),
        stopped,
    }
}

fn worker_loop(
    registry: &SharedRegistry,
    provider: &dyn QuoteProvider,
    breaker: &CircuitBreaker,
    store: &PartitionedStore,
    config: &PoolConfig,
    stop: &AtomicBool,
    cause: &Mutex<Option<StopCause>>,
) {
    let fetcher = RangeFetcher::new(provider, config.limits.clone(), config.pacing);
    let mut rng = rand::thread_rng();

    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        if !breaker.is_allowed() {
            set_cause(cause, StopCause::RateLimitPause);
            break;
        }

        let task = match registry.claim_next() {
            Ok(Some(task)) => task,
            Ok(None) => break,
            Err(e) => {
                log::error!("registry claim failed: {e}");
                break;
            }
        };

        run_task(
            &task, registry, &fetcher, breaker, store, config, stop, cause, &mut rng,
        );

        if !config.pacing.is_zero() {
            thread::sleep(config.pacing);
        }
    }
}

/// First date not yet covered by the store for this task's series.
fn plan_from(
    store: &PartitionedStore,
    task: &Task,
    config: &PoolConfig,
) -> Result<NaiveDate, (ErrorClass, String)> {
    match store.last_ts(&task.key) {
        Ok(Some(last)) => {
            let next = last + task.key.timeframe.interval_secs();
            DateTime::from_timestamp(next, 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| {
                    (
                        ErrorClass::Store,
                        format!("timestamp out of range: {next}"),
                    )
                })
        }
        Ok(None) => Ok(config.backfill_start),
        Err(e) => Err((ErrorClass::Store, e.to_string())),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_task(
    task: &Task,
    registry: &SharedRegistry,
    fetcher: &RangeFetcher<'_>,
    breaker: &CircuitBreaker,
    store: &PartitionedStore,
    config: &PoolConfig,
    stop: &AtomicBool,
    cause: &Mutex<Option<StopCause>>,
    rng: &mut ThreadRng,
) {
    let key = &task.key;

    let from = match plan_from(store, task, config) {
        Ok(from) => from,
        Err((class, msg)) => {
            log::warn!("{key}: cannot plan range: {msg}");
            fail_task(registry, key, class, &msg);
            return;
        }
    };
    let to = Utc::now().date_naive();
    if from > to {
        log::debug!("{key}: already current");
        complete_task(registry, key);
        return;
    }

    let opts = FetchOptions {
        include_open_bar: config.include_open_bar,
    };
    let mut attempt = 0u32;

    loop {
        match fetcher.fetch_range(&key.symbol, key.timeframe, from, to, &opts) {
            Ok(bars) => {
                if bars.is_empty() {
                    log::debug!("{key}: no data in [{from}, {to}]");
                    complete_task(registry, key);
                    return;
                }
                let batch = match ingest::ingest(&key.symbol, bars) {
                    Ok(batch) => batch,
                    Err(e) => {
                        log::warn!("{key}: rejected window, not written: {e}");
                        fail_task(registry, key, ErrorClass::Integrity, &e.to_string());
                        return;
                    }
                };
                match store.write(key, &batch.bars, WriteMode::Append) {
                    Ok(summary) => {
                        log::info!(
                            "{key}: wrote {} bar(s) across {} partition(s)",
                            summary.written,
                            summary.partitions_touched
                        );
                        complete_task(registry, key);
                    }
                    Err(e) => {
                        log::error!("{key}: store write failed: {e}");
                        fail_task(registry, key, ErrorClass::Store, &e.to_string());
                    }
                }
                return;
            }
            Err(e) => match classify(&e) {
                RetryClass::Fatal => {
                    log::error!("{key}: fatal provider error, stopping run: {e}");
                    stop.store(true, Ordering::Relaxed);
                    set_cause(cause, StopCause::AuthFailure);
                    fail_task(registry, key, error_class(&e), &e.to_string());
                    return;
                }
                RetryClass::Cooldown { retry_after } => {
                    match retry_after {
                        Some(pause) => breaker.pause_for(pause),
                        None => breaker.pause(),
                    }
                    log::warn!("{key}: {e}; pausing dispatch");
                    set_cause(cause, StopCause::RateLimitPause);
                    fail_task(registry, key, error_class(&e), &e.to_string());
                    return;
                }
                RetryClass::Backoff => {
                    attempt += 1;
                    if !config.retry.allows(attempt) {
                        log::warn!("{key}: giving up after {attempt} retry attempt(s): {e}");
                        fail_task(registry, key, error_class(&e), &e.to_string());
                        return;
                    }
                    let delay = config.retry.delay_for(attempt, rng);
                    log::debug!("{key}: retry {attempt} in {delay:?} after: {e}");
                    thread::sleep(delay);
                }
            },
        }
    }
}

fn complete_task(registry: &SharedRegistry, key: &barvault_core::domain::SeriesKey) {
    if let Err(e) = registry.complete(key) {
        log::error!("{key}: failed to record completion: {e}");
    }
}

fn fail_task(
    registry: &SharedRegistry,
    key: &barvault_core::domain::SeriesKey,
    class: ErrorClass,
    error: &str,
) {
    if let Err(e) = registry.fail(key, class, error) {
        log::error!("{key}: failed to record failure: {e}");
    }
}

/// First stop cause wins; later ones are consequences.
fn set_cause(cause: &Mutex<Option<StopCause>>, new: StopCause) {
    let mut guard = cause.lock().unwrap();
    if guard.is_none() {
        *guard = Some(new);
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicU32;
    use tempfile::TempDir;

    use barvault_core::domain::Bar;
    use barvault_core::provider::FetchError;
    use barvault_core::timeframe::Timeframe;
    use barvault_core::universe::Universe;

    use crate::registry::Registry;

    enum Script {
        Bars,
        Auth,
        RateLimit { retry_after_secs: u64 },
        FailTimes(AtomicU32),
        Empty,
    }

    struct ScriptedProvider {
        script: Script,
    }

    impl QuoteProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn fetch_window(
            &self,
            _symbol: &str,
            _tf: Timeframe,
            from: NaiveDate,
            _to: NaiveDate,
        ) -> Result<Vec<Bar>, FetchError> {
            match &self.script {
                Script::Bars => Ok(window_bars(from)),
                Script::Auth => Err(FetchError::Auth("401".into())),
                Script::RateLimit { retry_after_secs } => Err(FetchError::RateLimited {
                    retry_after_secs: *retry_after_secs,
                }),
                Script::FailTimes(remaining) => {
                    if remaining
                        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                            n.checked_sub(1)
                        })
                        .is_ok()
                    {
                        Err(FetchError::Transient("flaky".into()))
                    } else {
                        Ok(window_bars(from))
                    }
                }
                Script::Empty => Ok(Vec::new()),
            }
        }
    }

    fn window_bars(from: NaiveDate) -> Vec<Bar> {
        let ts = from.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        vec![Bar {
            ts,
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 1_000,
        }]
    }

    fn universe(symbols: &[&str]) -> Universe {
        let mut categories = BTreeMap::new();
        categories.insert(
            "nifty50".to_string(),
            symbols.iter().map(|s| s.to_string()).collect(),
        );
        Universe { categories }
    }

    fn fast_config() -> PoolConfig {
        PoolConfig {
            workers: 2,
            pacing: Duration::ZERO,
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                jitter: 0.0,
            },
            backfill_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            ..PoolConfig::default()
        }
    }

    fn setup(symbols: &[&str]) -> (TempDir, SharedRegistry, PartitionedStore) {
        let tmp = TempDir::new().unwrap();
        let mut registry = Registry::open(tmp.path().join("registry.jsonl")).unwrap();
        registry
            .generate(&universe(symbols), &[Timeframe::D1])
            .unwrap();
        let store = PartitionedStore::new(tmp.path().join("data"));
        (tmp, SharedRegistry::new(registry), store)
    }

    #[test]
    fn drains_registry_and_stores_bars() {
        let (_tmp, registry, store) = setup(&["AAA", "BBB"]);
        let provider = ScriptedProvider {
            script: Script::Bars,
        };
        let breaker = CircuitBreaker::default_provider();
        let stop = AtomicBool::new(false);

        let outcome = run(
            &registry,
            &provider,
            &breaker,
            &store,
            &fast_config(),
            &stop,
        );

        assert_eq!(outcome.stopped, None);
        assert_eq!(outcome.stats.completed, 2);
        assert_eq!(outcome.stats.pending, 0);
        assert_eq!(outcome.stats.in_progress, 0);
        assert!(!store.categories().is_empty());

        let key = barvault_core::domain::SeriesKey::new("nifty50", "AAA", Timeframe::D1);
        let report = store.validate(&key).unwrap();
        assert!(report.is_valid());
        assert!(report.record_count > 0);
    }

    #[test]
    fn auth_failure_stops_all_workers() {
        let (_tmp, registry, store) = setup(&["AAA", "BBB", "CCC", "DDD", "EEE", "FFF"]);
        let provider = ScriptedProvider {
            script: Script::Auth,
        };
        let breaker = CircuitBreaker::default_provider();
        let stop = AtomicBool::new(false);

        let outcome = run(
            &registry,
            &provider,
            &breaker,
            &store,
            &fast_config(),
            &stop,
        );

        assert_eq!(outcome.stopped, Some(StopCause::AuthFailure));
        assert!(outcome.stats.failed >= 1);
        assert_eq!(outcome.stats.completed, 0);
        // Nothing is left hanging InProgress.
        assert_eq!(outcome.stats.in_progress, 0);
        assert!(stop.load(Ordering::Relaxed));
    }

    #[test]
    fn rate_limit_opens_breaker_and_pauses_dispatch() {
        let (_tmp, registry, store) = setup(&["AAA", "BBB", "CCC", "DDD"]);
        let provider = ScriptedProvider {
            script: Script::RateLimit {
                retry_after_secs: 3_600,
            },
        };
        let breaker = CircuitBreaker::default_provider();
        let stop = AtomicBool::new(false);

        let outcome = run(
            &registry,
            &provider,
            &breaker,
            &store,
            &fast_config(),
            &stop,
        );

        assert_eq!(outcome.stopped, Some(StopCause::RateLimitPause));
        assert!(!breaker.is_allowed());
        assert!(outcome.stats.failed >= 1);
        // Rate-limited work stays for an explicit resume; it is not retried
        // into the ground.
        assert_eq!(outcome.stats.in_progress, 0);
    }

    #[test]
    fn transient_errors_retry_then_succeed() {
        let (_tmp, registry, store) = setup(&["AAA"]);
        let provider = ScriptedProvider {
            script: Script::FailTimes(AtomicU32::new(2)),
        };
        let breaker = CircuitBreaker::new(Duration::from_secs(60), 100);
        let stop = AtomicBool::new(false);

        let mut config = fast_config();
        config.workers = 1;
        let outcome = run(&registry, &provider, &breaker, &store, &config, &stop);

        assert_eq!(outcome.stopped, None);
        assert_eq!(outcome.stats.completed, 1);
        assert_eq!(outcome.stats.failed, 0);
    }

    #[test]
    fn empty_windows_complete_without_writing() {
        let (_tmp, registry, store) = setup(&["AAA"]);
        let provider = ScriptedProvider {
            script: Script::Empty,
        };
        let breaker = CircuitBreaker::default_provider();
        let stop = AtomicBool::new(false);

        let outcome = run(
            &registry,
            &provider,
            &breaker,
            &store,
            &fast_config(),
            &stop,
        );

        assert_eq!(outcome.stats.completed, 1);
        assert!(store.categories().is_empty());
    }

    #[test]
    fn external_stop_reported() {
        let (_tmp, registry, store) = setup(&["AAA"]);
        let provider = ScriptedProvider {
            script: Script::Bars,
        };
        let breaker = CircuitBreaker::default_provider();
        let stop = AtomicBool::new(true);

        let outcome = run(
            &registry,
            &provider,
            &breaker,
            &store,
            &fast_config(),
            &stop,
        );

        assert_eq!(outcome.stopped, Some(StopCause::External));
        assert_eq!(outcome.stats.pending, 1);
    }
}
