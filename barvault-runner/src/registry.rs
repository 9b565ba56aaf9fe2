//! Task registry — the durable record of ingestion progress.
//!
//! Persisted as an append-only JSONL journal: one meta line, then one JSON
//! object per task transition. The latest line per (category, symbol,
//! timeframe) wins on load, and the journal is compacted to a snapshot each
//! time it is opened. Appending a single line per transition keeps every
//! status change O(1) on disk while surviving a process crash at any point:
//! at most the task being claimed right then is lost, never prior progress.
//!
//! Workers never hold a private copy of the registry; all mutation goes
//! through [`SharedRegistry`], whose claim/complete/fail are atomic with
//! respect to each other.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use barvault_core::domain::SeriesKey;
use barvault_core::timeframe::Timeframe;
use barvault_core::universe::Universe;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("registry journal line is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown task '{0}'")]
    UnknownTask(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Coarse failure classes for operator-facing breakdowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Auth,
    RateLimit,
    Transient,
    Integrity,
    Store,
    Other,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Auth => "auth",
            ErrorClass::RateLimit => "rate_limit",
            ErrorClass::Transient => "transient",
            ErrorClass::Integrity => "integrity",
            ErrorClass::Store => "store",
            ErrorClass::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of ingestion work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub key: SeriesKey,
    pub status: TaskStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub error_class: Option<ErrorClass>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    fn pending(key: SeriesKey) -> Self {
        Self {
            key,
            status: TaskStatus::Pending,
            attempts: 0,
            last_error: None,
            error_class: None,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum JournalLine {
    Meta { started_at: DateTime<Utc> },
    Task(Task),
}

/// Aggregate counts derived from task statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

impl std::fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} total: {} completed, {} failed, {} pending, {} in progress",
            self.total, self.completed, self.failed, self.pending, self.in_progress
        )
    }
}

/// Outcome of a generation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateSummary {
    pub added: usize,
    pub existing: usize,
}

/// The registry proper. Single-threaded; wrap in [`SharedRegistry`] to share
/// across workers.
pub struct Registry {
    path: PathBuf,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    tasks: BTreeMap<SeriesKey, Task>,
}

impl Registry {
    /// Open (or create) a registry journal. An existing journal is replayed
    /// and compacted to a snapshot.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        if path.exists() {
            let registry = Self::replay(path)?;
            registry.compact()?;
            Ok(registry)
        } else {
            let registry = Self {
                path,
                started_at: Utc::now(),
                updated_at: Utc::now(),
                tasks: BTreeMap::new(),
            };
            registry.append(&JournalLine::Meta {
                started_at: registry.started_at,
            })?;
            Ok(registry)
        }
    }

    fn replay(path: PathBuf) -> Result<Self, RegistryError> {
        let file = fs::File::open(&path)?;
        let reader = io::BufReader::new(file);

        let mut started_at = Utc::now();
        let mut updated_at: Option<DateTime<Utc>> = None;
        let mut tasks: BTreeMap<SeriesKey, Task> = BTreeMap::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            // A torn trailing line (crash mid-append) is skipped, not fatal.
            let parsed: JournalLine = match serde_json::from_str(&line) {
                Ok(parsed) => parsed,
                Err(e) => {
                    log::warn!("skipping malformed registry line: {e}");
                    continue;
                }
            };
            match parsed {
                JournalLine::Meta { started_at: at } => started_at = at,
                JournalLine::Task(task) => {
                    updated_at = Some(updated_at.map_or(task.updated_at, |u| u.max(task.updated_at)));
                    tasks.insert(task.key.clone(), task);
                }
            }
        }

        Ok(Self {
            path,
            started_at,
            updated_at: updated_at.unwrap_or(started_at),
            tasks,
        })
    }

    /// Rewrite the journal as a snapshot: one meta line plus the latest state
    /// of every task. Atomic (tmp + rename).
    pub fn compact(&self) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            let meta = serde_json::to_string(&JournalLine::Meta {
                started_at: self.started_at,
            })?;
            writeln!(file, "{meta}")?;
            for task in self.tasks.values() {
                let line = serde_json::to_string(&JournalLine::Task(task.clone()))?;
                writeln!(file, "{line}")?;
            }
            file.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn append(&self, line: &JournalLine) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string(line)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{json}")?;
        file.flush()?;
        Ok(())
    }

    /// Record a task's new state: journal first, then memory.
    fn record(&mut self, task: Task) -> Result<(), RegistryError> {
        self.append(&JournalLine::Task(task.clone()))?;
        self.updated_at = Utc::now();
        self.tasks.insert(task.key.clone(), task);
        Ok(())
    }

    /// Build the cross product of universe symbols and timeframes, inserting
    /// a Pending task for every combination not already present. Existing
    /// tasks — Completed ones in particular — are left untouched, making
    /// repeated generation idempotent.
    pub fn generate(
        &mut self,
        universe: &Universe,
        timeframes: &[Timeframe],
    ) -> Result<GenerateSummary, RegistryError> {
        let mut added = 0;
        let mut existing = 0;

        for (category, symbols) in &universe.categories {
            for symbol in symbols {
                for &tf in timeframes {
                    let key = SeriesKey::new(category.clone(), symbol.clone(), tf);
                    if self.tasks.contains_key(&key) {
                        existing += 1;
                    } else {
                        self.record(Task::pending(key))?;
                        added += 1;
                    }
                }
            }
        }

        Ok(GenerateSummary { added, existing })
    }

    /// Atomically select one Pending task and mark it InProgress.
    pub fn claim_next(&mut self) -> Result<Option<Task>, RegistryError> {
        let key = self
            .tasks
            .values()
            .find(|t| t.status == TaskStatus::Pending)
            .map(|t| t.key.clone());

        let Some(key) = key else {
            return Ok(None);
        };

        let mut task = self.tasks[&key].clone();
        task.status = TaskStatus::InProgress;
        task.updated_at = Utc::now();
        self.record(task.clone())?;
        Ok(Some(task))
    }

    pub fn complete(&mut self, key: &SeriesKey) -> Result<(), RegistryError> {
        let mut task = self.get(key)?;
        task.status = TaskStatus::Completed;
        task.last_error = None;
        task.error_class = None;
        task.updated_at = Utc::now();
        self.record(task)
    }

    /// Mark a task Failed. Increments the attempt counter and records the
    /// error; does not re-queue.
    pub fn fail(
        &mut self,
        key: &SeriesKey,
        class: ErrorClass,
        error: &str,
    ) -> Result<(), RegistryError> {
        let mut task = self.get(key)?;
        task.status = TaskStatus::Failed;
        task.attempts += 1;
        task.last_error = Some(error.to_string());
        task.error_class = Some(class);
        task.updated_at = Utc::now();
        self.record(task)
    }

    fn get(&self, key: &SeriesKey) -> Result<Task, RegistryError> {
        self.tasks
            .get(key)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTask(key.to_string()))
    }

    /// Re-queue every Failed task as Pending. Returns how many moved.
    pub fn resume_failed(&mut self) -> Result<usize, RegistryError> {
        let keys: Vec<SeriesKey> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Failed)
            .map(|t| t.key.clone())
            .collect();

        for key in &keys {
            let mut task = self.tasks[key].clone();
            task.status = TaskStatus::Pending;
            task.updated_at = Utc::now();
            self.record(task)?;
        }
        Ok(keys.len())
    }

    /// Crash repair: InProgress tasks not touched within `max_age` were
    /// orphaned by a dead worker; mark them Failed so an explicit resume can
    /// pick them up. Returns how many were repaired.
    pub fn repair_stale(&mut self, max_age: Duration) -> Result<usize, RegistryError> {
        let cutoff = Utc::now() - max_age;
        let keys: Vec<SeriesKey> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::InProgress && t.updated_at <= cutoff)
            .map(|t| t.key.clone())
            .collect();

        for key in &keys {
            let mut task = self.tasks[key].clone();
            task.status = TaskStatus::Failed;
            task.last_error = Some("stale: worker died mid-task".to_string());
            task.error_class = Some(ErrorClass::Other);
            task.updated_at = Utc::now();
            self.record(task)?;
        }
        Ok(keys.len())
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: self.tasks.len(),
            ..RegistryStats::default()
        };
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Thread-safe handle shared by the worker pool. All operations take the one
/// registry lock, so claim/complete/fail are serialized — two workers can
/// never claim the same Pending task.
#[derive(Clone)]
pub struct SharedRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl SharedRegistry {
    pub fn new(registry: Registry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(registry)),
        }
    }

    pub fn claim_next(&self) -> Result<Option<Task>, RegistryError> {
        self.inner.lock().unwrap().claim_next()
    }

    pub fn complete(&self, key: &SeriesKey) -> Result<(), RegistryError> {
        self.inner.lock().unwrap().complete(key)
    }

    pub fn fail(&self, key: &SeriesKey, class: ErrorClass, error: &str) -> Result<(), RegistryError> {
        self.inner.lock().unwrap().fail(key, class, error)
    }

    pub fn stats(&self) -> RegistryStats {
        self.inner.lock().unwrap().stats()
    }

    /// Run a closure against the locked registry (reports, snapshots).
    pub fn with<R>(&self, f: impl FnOnce(&Registry) -> R) -> R {
        f(&self.inner.lock().unwrap())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
