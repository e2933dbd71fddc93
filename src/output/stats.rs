//! Run and dataset statistics
//!
//! This module aggregates worker counters into per-run statistics and counts
//! the records held by the configured datasets.

use crate::config::TargetConfig;
use crate::crawler::WorkerReport;
use crate::storage::{DatasetStore, StoreResult};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of one harvest run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStatistics {
    /// When the run started
    pub started_at: DateTime<Utc>,

    /// Wall-clock duration of the run
    pub elapsed: Duration,

    /// Unique detail pages found on the listing
    pub discovered: usize,

    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,

    /// Fetch attempts across all tasks
    pub attempts: usize,

    /// Sessions thrown away after a retryable failure
    pub recreations: usize,

    /// Sessions successfully established by workers
    pub sessions_created: usize,

    /// Records appended or inserted by upsert
    pub records_inserted: usize,

    /// Records merged by upsert
    pub records_updated: usize,

    /// Resources resolved to a local file
    pub resources_cached: usize,
}

impl RunStatistics {
    /// Creates empty statistics stamped with the current time
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
            discovered: 0,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            attempts: 0,
            recreations: 0,
            sessions_created: 0,
            records_inserted: 0,
            records_updated: 0,
            resources_cached: 0,
        }
    }

    /// Adds one worker's counters
    pub fn absorb(&mut self, report: &WorkerReport) {
        self.succeeded += report.succeeded;
        self.skipped += report.skipped;
        self.failed += report.failed;
        self.attempts += report.attempts;
        self.recreations += report.recreations;
        self.sessions_created += report.sessions_created;
        self.records_inserted += report.records_inserted;
        self.records_updated += report.records_updated;
        self.resources_cached += report.resources_cached;
    }

    /// Tasks that reached a final outcome
    pub fn completed(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Prints run statistics to stdout
///
/// # Arguments
///
/// * `target` - Name of the harvested target
/// * `stats` - The statistics to display
pub fn print_statistics(target: &str, stats: &RunStatistics) {
    println!("=== Harvest Statistics: {} ===\n", target);

    println!("Overview:");
    println!("  Started: {}", stats.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  Elapsed: {:.1}s", stats.elapsed.as_secs_f64());
    println!("  Detail pages discovered: {}", stats.discovered);
    println!();

    println!("Tasks:");
    println!("  Succeeded: {}", stats.succeeded);
    println!("  Skipped: {}", stats.skipped);
    println!("  Failed: {}", stats.failed);
    if stats.discovered > 0 {
        let rate = (stats.succeeded as f64 / stats.discovered as f64) * 100.0;
        println!("  Success rate: {:.1}%", rate);
    }
    println!();

    println!("Sessions:");
    println!("  Fetch attempts: {}", stats.attempts);
    println!("  Sessions created: {}", stats.sessions_created);
    println!("  Recreations: {}", stats.recreations);
    println!();

    println!("Datasets:");
    println!("  Records inserted: {}", stats.records_inserted);
    println!("  Records updated: {}", stats.records_updated);
    println!("  Resources cached: {}", stats.resources_cached);
    println!();
}

/// Record count of one dataset file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetCount {
    pub path: PathBuf,
    pub exists: bool,
    pub records: usize,
}

/// Dataset counts of one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDatasets {
    pub name: String,
    pub datasets: Vec<DatasetCount>,
}

/// Counts the records of every dataset the given targets write
pub fn load_dataset_statistics<'t>(
    store: &dyn DatasetStore,
    targets: impl IntoIterator<Item = &'t TargetConfig>,
) -> StoreResult<Vec<TargetDatasets>> {
    targets
        .into_iter()
        .map(|target| {
            let datasets = target
                .dataset_paths()
                .into_iter()
                .map(|path| {
                    Ok(DatasetCount {
                        path: path.clone(),
                        exists: path.exists(),
                        records: store.load(path)?.len(),
                    })
                })
                .collect::<StoreResult<Vec<_>>>()?;

            Ok(TargetDatasets {
                name: target.name.clone(),
                datasets,
            })
        })
        .collect()
}

/// Prints dataset counts to stdout
pub fn print_dataset_statistics(targets: &[TargetDatasets]) {
    println!("=== Dataset Statistics ===\n");

    for target in targets {
        println!("{}:", target.name);
        for dataset in &target.datasets {
            if dataset.exists {
                println!("  {}: {} records", dataset.path.display(), dataset.records);
            } else {
                println!("  {}: (not created yet)", dataset.path.display());
            }
        }
        println!();
    }
}
