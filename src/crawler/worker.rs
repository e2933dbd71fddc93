//! Worker threads
//!
//! A worker owns one session slot and drains the shared queue. Every attempt is
//! paced by the shared rate limiter. Retryable failures throw the session away
//! and back off exponentially; structural failures skip the task. Per-task
//! failures only ever become counters and log lines; a persistence failure
//! stops the whole run.

use crate::crawler::limiter::RateLimiter;
use crate::crawler::queue::{Task, TaskQueue};
use crate::crawler::session::{FetchError, Session, SessionFactory, SessionOptions, SessionSlot};
use crate::extract::{Extraction, Extractor};
use crate::storage::{site_path, DatasetStore, ResourceCache, StoreResult, UpsertOutcome};
use crate::HarvestError;
use serde_json::Value;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Bounded retries with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,

    /// Backoff after the first failed attempt; doubles on each further failure
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Total attempts per task
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Backoff after the failure of the zero-based attempt `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

/// Everything a worker shares with its siblings
pub struct WorkerContext<'a, F, E> {
    pub queue: &'a TaskQueue,
    pub limiter: &'a RateLimiter,
    pub store: &'a dyn DatasetStore,
    pub cache: &'a ResourceCache,
    pub factory: &'a F,
    pub extractor: &'a E,
    pub session_options: &'a SessionOptions,
    pub policy: RetryPolicy,

    /// Directory the resource cache writes into
    pub resource_dir: &'a Path,
}

/// How a single task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Skipped,
    Failed,
}

/// Per-worker counters, summed by the coordinator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub attempts: usize,
    pub recreations: usize,
    pub sessions_created: usize,
    pub records_inserted: usize,
    pub records_updated: usize,
    pub resources_cached: usize,
}

impl WorkerReport {
    fn tally(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Succeeded => self.succeeded += 1,
            TaskOutcome::Skipped => self.skipped += 1,
            TaskOutcome::Failed => self.failed += 1,
        }
    }
}

/// One worker and its session
pub struct Worker<'a, F: SessionFactory, E> {
    name: String,
    ctx: &'a WorkerContext<'a, F, E>,
    slot: SessionSlot<'a, F>,
    report: WorkerReport,
}

impl<'a, F: SessionFactory, E: Extractor> Worker<'a, F, E> {
    pub fn new(name: impl Into<String>, ctx: &'a WorkerContext<'a, F, E>) -> Self {
        Self {
            name: name.into(),
            slot: SessionSlot::new(ctx.factory, ctx.session_options),
            ctx,
            report: WorkerReport::default(),
        }
    }

    /// Drains the queue
    ///
    /// # Returns
    ///
    /// * `Ok(WorkerReport)` - The queue is empty; per-task failures are in the counters
    /// * `Err(HarvestError)` - A dataset write failed; the queue has been abandoned
    pub fn run(mut self) -> Result<WorkerReport, HarvestError> {
        tracing::debug!("{} started", self.name);

        while let Some(task) = self.ctx.queue.pop() {
            match self.process(task) {
                Ok(outcome) => self.report.tally(outcome),
                Err(e) => {
                    let dropped = self.ctx.queue.abandon();
                    tracing::error!(
                        "{}: dataset write failed, abandoning {} queued task(s): {}",
                        self.name,
                        dropped,
                        e
                    );
                    return Err(e.into());
                }
            }
        }

        self.report.sessions_created = self.slot.created() as usize;
        tracing::debug!("{} finished: {:?}", self.name, self.report);
        Ok(self.report)
    }

    fn process(&mut self, mut task: Task) -> StoreResult<TaskOutcome> {
        let total = self.ctx.queue.total();
        let attempts = self.ctx.policy.attempts();
        let mut last_error = None;

        for attempt in 0..attempts {
            task.attempt = attempt + 1;
            self.report.attempts += 1;
            self.ctx.limiter.wait();

            match self.try_once(&task.target) {
                Ok(extraction) => {
                    let label = extraction.label.clone();
                    let added = self.persist(extraction)?;
                    tracing::info!("[{}/{}] {} (+{} events)", task.ordinal, total, label, added);
                    return Ok(TaskOutcome::Succeeded);
                }
                Err(e) if e.is_retryable() => {
                    if task.attempt < attempts {
                        tracing::warn!(
                            "[{}/{}] attempt {}/{} failed for {}: {}",
                            task.ordinal,
                            total,
                            task.attempt,
                            attempts,
                            task.target,
                            e
                        );
                        // An empty slot builds its session lazily on the next attempt
                        if self.slot.is_active() {
                            match self.slot.recreate() {
                                Ok(()) => self.report.recreations += 1,
                                Err(e) => {
                                    tracing::warn!("{}: session recreation failed: {}", self.name, e)
                                }
                            }
                        }
                        thread::sleep(self.ctx.policy.backoff(attempt));
                    }
                    last_error = Some(e);
                }
                Err(e) => {
                    tracing::warn!("[{}/{}] skipping {}: {}", task.ordinal, total, task.target, e);
                    return Ok(TaskOutcome::Skipped);
                }
            }
        }

        tracing::warn!(
            "[{}/{}] giving up on {} after {} attempts: {}",
            task.ordinal,
            total,
            task.target,
            task.attempt,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        );
        Ok(TaskOutcome::Failed)
    }

    fn try_once(&mut self, target: &str) -> Result<Extraction, FetchError> {
        let session = self
            .slot
            .get()
            .map_err(|e| FetchError::retryable(format!("no session: {}", e)))?;
        let page = session.open(target)?;
        self.ctx.extractor.extract(&page)
    }

    /// Writes an extraction; returns the number of newly appended records
    fn persist(&mut self, extraction: Extraction) -> StoreResult<usize> {
        let store = self.ctx.store;

        let mut added = 0;
        for append in extraction.appends {
            if store.append(&append.path, append.record, &append.dedup_keys)? {
                added += 1;
            }
        }
        self.report.records_inserted += added;

        let mut resolved = Vec::with_capacity(extraction.resources.len());
        for resource in extraction.resources {
            let local = self.ctx.cache.resolve(
                &resource.remote,
                self.ctx.resource_dir,
                resource.identity_hint.as_deref(),
            );
            let value = match local {
                Some(path) => {
                    self.report.resources_cached += 1;
                    site_path(&path)
                }
                None => resource.remote,
            };
            resolved.push((resource.field, value));
        }

        if let Some(mut upsert) = extraction.upsert {
            for (field, value) in resolved {
                upsert.patch.insert(field, Value::String(value));
            }
            match store.upsert(&upsert.path, &upsert.match_field, &upsert.match_value, upsert.patch)? {
                UpsertOutcome::Inserted => self.report.records_inserted += 1,
                UpsertOutcome::Updated => self.report.records_updated += 1,
            }
        }

        Ok(added)
    }
}
