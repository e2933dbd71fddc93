//! Output module for run summaries
//!
//! This module handles:
//! - Aggregating worker counters into run statistics
//! - Counting dataset records for the `--stats` mode
//! - Printing both to stdout

pub mod stats;

pub use stats::{
    load_dataset_statistics, print_dataset_statistics, print_statistics, DatasetCount,
    RunStatistics, TargetDatasets,
};
