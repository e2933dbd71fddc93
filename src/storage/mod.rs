//! Storage module for persisting harvested data
//!
//! This module owns every file the harvester writes:
//! - JSON datasets, mutated only through append-with-dedup and upsert-by-key
//! - The thumbnail cache, populated at most once per identity
//!
//! Both are shared by all worker threads and serialize their own I/O.

mod cache;
mod json_store;
mod traits;

pub use cache::{cache_file_name, site_path, ResourceCache, ResourceFetcher};
pub use json_store::{read_dataset, JsonStore};
pub use traits::{DatasetStore, StoreError, StoreResult, UpsertOutcome};

/// One extracted entity: an open, ordered map of JSON values
pub type Record = serde_json::Map<String, serde_json::Value>;
