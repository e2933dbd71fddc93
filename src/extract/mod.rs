//! Content extraction
//!
//! Turns fetched pages into detail references (on listing pages) and into
//! dataset mutations (on detail pages). Extractors are pure functions of the
//! page; workers own all persistence.

mod detail;
mod discovery;
mod events;
mod next_data;
mod skills;

pub use detail::NextDataExtractor;
pub use discovery::{discover_references, references_from_payload};
pub use events::{format_rewards, parse_events};
pub use next_data::{next_data, page_props};
pub use skills::SkillNames;

use crate::crawler::{FetchError, Page};
use crate::storage::Record;
use std::path::PathBuf;

/// Record to append with dedup
#[derive(Debug, Clone, PartialEq)]
pub struct AppendRecord {
    pub path: PathBuf,
    pub record: Record,
    pub dedup_keys: Vec<String>,
}

/// Record to merge by key
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertRecord {
    pub path: PathBuf,
    pub match_field: String,
    pub match_value: String,
    pub patch: Record,
}

/// Remote resource to cache
///
/// Once resolved, the local path (or the remote URL if the download failed) is
/// written into `field` of the upsert patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub remote: String,
    pub identity_hint: Option<String>,
    pub field: String,
}

/// Everything a detail page contributes to the datasets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Human-readable name for progress lines
    pub label: String,

    pub appends: Vec<AppendRecord>,
    pub upsert: Option<UpsertRecord>,
    pub resources: Vec<ResourceRequest>,
}

/// Parses pages into references and dataset mutations
///
/// Shared by every worker thread.
pub trait Extractor: Sync {
    /// Lists detail page references found on a listing page
    fn discover(&self, page: &Page) -> Result<Vec<String>, FetchError>;

    /// Extracts records from a detail page
    fn extract(&self, page: &Page) -> Result<Extraction, FetchError>;
}
