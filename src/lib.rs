//! Tora-Harvest: a paced, fail-soft scraper for JavaScript-rendered sites
//!
//! This crate pulls detail pages through a pool of worker threads, each owning a
//! renewable page session, and persists the extracted records into deduplicated,
//! upsertable JSON datasets that stay valid across crashes and reruns.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod storage;

use thiserror::Error;

/// Main error type for Tora-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] storage::StoreError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No page session could be established: {0}")]
    SessionUnavailable(String),

    #[error("Discovery failed for {url}: {reason}")]
    Discovery { url: String, reason: String },

    #[error("Worker {0} panicked")]
    WorkerPanicked(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid detail pattern: {0}")]
    InvalidPattern(String),
}

/// Result type alias for Tora-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, FetchError, RateLimiter};
pub use storage::{JsonStore, Record, ResourceCache};
