use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Tora-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetConfig>,
}

impl Config {
    /// Looks up a target by name
    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }
}

/// Worker pool, pacing and retry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of worker threads (clamped to the number of tasks)
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Minimum spacing between page navigations across all workers (milliseconds)
    #[serde(rename = "min-interval", default = "default_min_interval")]
    pub min_interval: u64,

    /// Upper bound of the random extra delay added after pacing (milliseconds)
    #[serde(default = "default_jitter")]
    pub jitter: u64,

    /// Retries per task after the first attempt
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Base backoff before a retry (milliseconds), doubled per attempt
    #[serde(rename = "backoff-base", default = "default_backoff_base")]
    pub backoff_base: u64,

    /// Timeout for a single fetch (seconds)
    #[serde(rename = "fetch-timeout", default = "default_fetch_timeout")]
    pub fetch_timeout: u64,
}

impl CrawlerConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            min_interval: default_min_interval(),
            jitter: default_jitter(),
            retries: default_retries(),
            backoff_base: default_backoff_base(),
            fetch_timeout: default_fetch_timeout(),
        }
    }
}

fn default_workers() -> u32 {
    2
}

fn default_min_interval() -> u64 {
    900
}

fn default_jitter() -> u64 {
    250
}

fn default_retries() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    500
}

fn default_fetch_timeout() -> u64 {
    45
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the user agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Session state re-established after every session (re)creation
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Game server whose data the site should show ("global" or "japan")
    #[serde(default = "default_server")]
    pub server: String,

    /// Preferred content language
    #[serde(default = "default_locale")]
    pub locale: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            locale: default_locale(),
        }
    }
}

fn default_server() -> String {
    "global".to_string()
}

fn default_locale() -> String {
    "en".to_string()
}

/// Output configuration shared by all targets
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory for cached thumbnails
    #[serde(rename = "thumbs-dir")]
    pub thumbs_dir: PathBuf,

    /// Candidate skill name files; the first one yielding names wins
    #[serde(rename = "skill-names", default)]
    pub skill_names: Vec<PathBuf>,
}

/// One dataset category to (re)build
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Name used by `--only`
    pub name: String,

    /// Listing page enumerating the detail pages
    #[serde(rename = "listing-url")]
    pub listing_url: String,

    /// Regex a detail link must match
    #[serde(rename = "detail-pattern")]
    pub detail_pattern: String,

    /// Append-only event dataset
    #[serde(rename = "events-path")]
    pub events_path: PathBuf,

    /// Upserted entity dataset
    #[serde(rename = "entities-path")]
    pub entities_path: PathBuf,

    /// Match key of the entity dataset
    #[serde(rename = "entity-key", default = "default_entity_key")]
    pub entity_key: String,

    /// Prefix of the entity record's field names (`SupportName`, `SupportId`, ...)
    #[serde(rename = "entity-prefix", default = "default_entity_prefix")]
    pub entity_prefix: String,
}

impl TargetConfig {
    /// Dataset files written by this target
    pub fn dataset_paths(&self) -> [&PathBuf; 2] {
        [&self.events_path, &self.entities_path]
    }

    /// Entity record field name for `field`, e.g. `Name` -> `SupportName`
    pub fn entity_field(&self, field: &str) -> String {
        format!("{}{}", self.entity_prefix, field)
    }
}

fn default_entity_key() -> String {
    "Slug".to_string()
}

fn default_entity_prefix() -> String {
    "Support".to_string()
}
