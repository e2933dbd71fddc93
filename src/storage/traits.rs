//! Storage traits and error types
//!
//! This module defines the interface workers use to mutate datasets and the
//! associated error types.

use crate::storage::Record;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during dataset persistence
///
/// Any of these invalidates the run: a dataset that cannot be written is useless.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to replace {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// What an upsert did to the dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Trait for dataset backends shared by all workers
///
/// Implementations must make each operation atomic with respect to every other
/// operation on the same store.
pub trait DatasetStore: Send + Sync {
    /// Appends `record` unless a record with the same dedup tuple exists
    ///
    /// # Arguments
    ///
    /// * `path` - The dataset file
    /// * `record` - The record to append
    /// * `dedup_keys` - Fields (dotted paths allowed) compared as strings; empty disables dedup
    ///
    /// # Returns
    ///
    /// `true` if the record was inserted, `false` if it was already present
    fn append(&self, path: &Path, record: Record, dedup_keys: &[String]) -> StoreResult<bool>;

    /// Merges `patch` into the first record whose `match_field` equals `match_value`,
    /// inserting `{match_field: match_value, ...patch}` when there is none
    fn upsert(
        &self,
        path: &Path,
        match_field: &str,
        match_value: &str,
        patch: Record,
    ) -> StoreResult<UpsertOutcome>;

    /// Reads the whole dataset; missing or corrupt files read as empty
    fn load(&self, path: &Path) -> StoreResult<Vec<Value>>;
}
