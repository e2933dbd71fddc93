//! Harvest coordinator - discovery and worker orchestration
//!
//! This module runs one target end to end:
//! - Opening a session on the listing page and discovering detail references
//! - Building the task queue (deduplicated, in discovery order)
//! - Spawning a fixed pool of named worker threads and joining all of them
//! - Aggregating worker counters into run statistics

use crate::config::{Config, TargetConfig};
use crate::crawler::limiter::RateLimiter;
use crate::crawler::queue::TaskQueue;
use crate::crawler::session::{FetchError, Session, SessionFactory, SessionOptions, SessionSlot};
use crate::crawler::worker::{RetryPolicy, Worker, WorkerContext, WorkerReport};
use crate::extract::Extractor;
use crate::output::RunStatistics;
use crate::storage::{DatasetStore, ResourceCache};
use crate::HarvestError;
use std::path::PathBuf;
use std::thread;
use std::time::Instant;

/// Per-target run parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Configured worker count; clamped to the number of tasks
    pub workers: usize,

    pub policy: RetryPolicy,

    /// State every session re-establishes after creation
    pub session: SessionOptions,

    /// Directory for cached resources
    pub resource_dir: PathBuf,
}

impl RunSettings {
    /// Builds settings for one target from the configuration
    pub fn from_config(config: &Config, target: &TargetConfig) -> Self {
        Self {
            workers: config.crawler.workers as usize,
            policy: RetryPolicy {
                retries: config.crawler.retries,
                backoff_base: config.crawler.backoff_base(),
            },
            session: SessionOptions {
                server: config.session.server.clone(),
                locale: config.session.locale.clone(),
                home_url: Some(target.listing_url.clone()),
            },
            resource_dir: config.output.thumbs_dir.clone(),
        }
    }
}

/// Number of worker threads for a run: at least one, never more than tasks
pub fn worker_count(configured: usize, total_tasks: usize) -> usize {
    configured.min(total_tasks).max(1)
}

/// Main coordinator structure
pub struct Coordinator<'a, F, E> {
    settings: RunSettings,
    factory: &'a F,
    extractor: &'a E,
    limiter: &'a RateLimiter,
    store: &'a dyn DatasetStore,
    cache: &'a ResourceCache,
}

impl<'a, F: SessionFactory, E: Extractor> Coordinator<'a, F, E> {
    /// Creates a new coordinator
    ///
    /// The limiter, store and cache are shared with every worker of the run.
    pub fn new(
        settings: RunSettings,
        factory: &'a F,
        extractor: &'a E,
        limiter: &'a RateLimiter,
        store: &'a dyn DatasetStore,
        cache: &'a ResourceCache,
    ) -> Self {
        Self {
            settings,
            factory,
            extractor,
            limiter,
            store,
            cache,
        }
    }

    /// Harvests every detail page reachable from `listing_url`
    ///
    /// # Returns
    ///
    /// * `Ok(RunStatistics)` - All workers finished; task failures are only counted
    /// * `Err(HarvestError)` - Discovery failed, no session could be created, or a
    ///   dataset write failed
    pub fn run(&self, listing_url: &str) -> Result<RunStatistics, HarvestError> {
        let started = Instant::now();
        let mut stats = RunStatistics::new();

        let references = self.discover(listing_url)?;
        let queue = TaskQueue::from_targets(references);
        stats.discovered = queue.total();

        if queue.total() == 0 {
            tracing::warn!("No detail pages found on {}; site layout may have changed", listing_url);
            stats.elapsed = started.elapsed();
            return Ok(stats);
        }

        let workers = worker_count(self.settings.workers, queue.total());
        tracing::info!(
            "Found {} detail pages on {}; starting {} worker(s)",
            queue.total(),
            listing_url,
            workers
        );

        let ctx = WorkerContext {
            queue: &queue,
            limiter: self.limiter,
            store: self.store,
            cache: self.cache,
            factory: self.factory,
            extractor: self.extractor,
            session_options: &self.settings.session,
            policy: self.settings.policy,
            resource_dir: &self.settings.resource_dir,
        };

        let outcomes = spawn_workers(&ctx, workers);

        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(report) => stats.absorb(&report),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(e) => tracing::error!("Additional worker error: {}", e),
            }
        }
        stats.elapsed = started.elapsed();

        if let Some(e) = first_error {
            return Err(e);
        }

        if stats.sessions_created == 0 {
            return Err(HarvestError::SessionUnavailable(format!(
                "no worker could open a session for {}",
                listing_url
            )));
        }

        tracing::info!(
            "Run complete: {} succeeded, {} skipped, {} failed in {:.1}s",
            stats.succeeded,
            stats.skipped,
            stats.failed,
            stats.elapsed.as_secs_f64()
        );
        Ok(stats)
    }

    /// Fetches the listing page and returns the detail references it names
    ///
    /// Uses the same bounded retry policy as the workers. A listing without
    /// usable content yields no references rather than an error.
    fn discover(&self, listing_url: &str) -> Result<Vec<String>, HarvestError> {
        let policy = self.settings.policy;
        let attempts = policy.attempts();
        let mut slot = SessionSlot::new(self.factory, &self.settings.session);
        let mut last_error = None;

        for attempt in 0..attempts {
            self.limiter.wait();

            let result = slot
                .get()
                .and_then(|session| session.open(listing_url))
                .and_then(|page| self.extractor.discover(&page));

            match result {
                Ok(references) => {
                    tracing::debug!("Listing {} named {} references", listing_url, references.len());
                    return Ok(references);
                }
                Err(FetchError::Structural { reason }) => {
                    tracing::warn!("Listing {} has no usable content: {}", listing_url, reason);
                    return Ok(Vec::new());
                }
                Err(e) => {
                    if attempt + 1 < attempts {
                        tracing::warn!(
                            "Listing attempt {}/{} failed: {}",
                            attempt + 1,
                            attempts,
                            e
                        );
                        if slot.is_active() {
                            if let Err(e) = slot.recreate() {
                                tracing::warn!("Listing session recreation failed: {}", e);
                            }
                        }
                        thread::sleep(policy.backoff(attempt));
                    }
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        if slot.created() == 0 {
            return Err(HarvestError::SessionUnavailable(reason));
        }
        Err(HarvestError::Discovery {
            url: listing_url.to_string(),
            reason,
        })
    }
}

/// Runs `count` named workers on scoped threads and joins every one of them
fn spawn_workers<F, E>(
    ctx: &WorkerContext<'_, F, E>,
    count: usize,
) -> Vec<Result<WorkerReport, HarvestError>>
where
    F: SessionFactory,
    E: Extractor,
{
    thread::scope(|scope| {
        let mut outcomes = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);

        for id in 1..=count {
            let name = format!("worker-{}", id);
            let worker_name = name.clone();
            let spawned = thread::Builder::new()
                .name(name.clone())
                .spawn_scoped(scope, move || Worker::new(worker_name, ctx).run());

            match spawned {
                Ok(handle) => handles.push((name, handle)),
                Err(e) => {
                    tracing::error!("Failed to spawn {}: {}", name, e);
                    outcomes.push(Err(HarvestError::Io(e)));
                }
            }
        }

        for (name, handle) in handles {
            let outcome = handle
                .join()
                .unwrap_or_else(|_| Err(HarvestError::WorkerPanicked(name)));
            outcomes.push(outcome);
        }

        outcomes
    })
}
