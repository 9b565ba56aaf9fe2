//! Operator-facing run report: counts, failure breakdown, ETA.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::registry::{ErrorClass, Registry, RegistryStats, TaskStatus};

/// Snapshot of a run, suitable for printing after a pool run or from the
/// status command while one is underway.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub stats: RegistryStats,
    pub elapsed: Duration,
    /// Failed-task counts by error class.
    pub failures: BTreeMap<ErrorClass, usize>,
    /// Remaining-time estimate from completed-task throughput, when one can
    /// be made.
    pub eta: Option<Duration>,
}

impl RunReport {
    pub fn compile(registry: &Registry, elapsed: Duration) -> Self {
        let stats = registry.stats();

        let mut failures: BTreeMap<ErrorClass, usize> = BTreeMap::new();
        for task in registry.tasks() {
            if task.status == TaskStatus::Failed {
                *failures
                    .entry(task.error_class.unwrap_or(ErrorClass::Other))
                    .or_insert(0) += 1;
            }
        }

        let eta = if stats.completed > 0 && stats.pending > 0 && !elapsed.is_zero() {
            let per_task = elapsed.as_secs_f64() / stats.completed as f64;
            Some(Duration::from_secs_f64(per_task * stats.pending as f64))
        } else {
            None
        };

        Self {
            stats,
            elapsed,
            failures,
            eta,
        }
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "tasks: {}", self.stats)?;
        writeln!(f, "elapsed: {}", format_duration(self.elapsed))?;
        if let Some(eta) = self.eta {
            writeln!(f, "estimated remaining: {}", format_duration(eta))?;
        }
        if !self.failures.is_empty() {
            writeln!(f, "failures by class:")?;
            for (class, count) in &self.failures {
                writeln!(f, "  {class}: {count}")?;
            }
        }
        Ok(())
    }
}
