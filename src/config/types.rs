use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Page-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub job: JobConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

/// Job description and checkpoint parameters
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Human-readable job label, used in status messages
    pub name: String,

    /// Candidate fields identifying the item a record belongs to.
    /// The first non-empty one wins.
    #[serde(rename = "identity-fields")]
    pub identity_fields: Vec<String>,

    /// Fixed number of items the source lists on a full page
    #[serde(rename = "expected-items-per-page", default = "default_expected_items")]
    pub expected_items_per_page: usize,

    /// Page count assumed when the navigator cannot discover one
    #[serde(rename = "assumed-total-pages", default = "default_assumed_total")]
    pub assumed_total_pages: u32,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite record database
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the plain-text CSV export (defaults to the database path with `.csv`)
    #[serde(rename = "export-path", default)]
    pub export_path: Option<String>,
}

impl OutputConfig {
    /// Resolves the CSV export path
    pub fn export_path(&self) -> PathBuf {
        match &self.export_path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(&self.database_path).with_extension("csv"),
        }
    }
}

/// Request pacing toward the source
#[derive(Debug, Clone, Deserialize)]
pub struct PacingConfig {
    /// Randomized delay between items, `[min, max]` milliseconds
    #[serde(rename = "item-delay-ms", default = "default_item_delay")]
    pub item_delay_ms: [u64; 2],

    /// Randomized delay between pages, `[min, max]` milliseconds
    #[serde(rename = "page-delay-ms", default = "default_page_delay")]
    pub page_delay_ms: [u64; 2],

    /// How often the loop re-checks pause/stop while waiting (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl PacingConfig {
    /// Pacing with no delays, useful for replay and tests
    pub fn immediate() -> Self {
        Self {
            item_delay_ms: [0, 0],
            page_delay_ms: [0, 0],
            poll_interval_ms: 5,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            item_delay_ms: default_item_delay(),
            page_delay_ms: default_page_delay(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

/// Snapshot write retry behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Maximum attempts for one snapshot write while the store is locked
    #[serde(rename = "write-attempts", default = "default_write_attempts")]
    pub write_attempts: u32,

    /// Wait between locked attempts (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            write_attempts: default_write_attempts(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

/// Event delivery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Events buffered per subscriber before the oldest are dropped
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

fn default_expected_items() -> usize {
    10
}

fn default_assumed_total() -> u32 {
    33
}

fn default_item_delay() -> [u64; 2] {
    [2000, 4000]
}

fn default_page_delay() -> [u64; 2] {
    [3000, 6000]
}

fn default_poll_interval() -> u64 {
    100
}

fn default_write_attempts() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    2000
}

fn default_event_capacity() -> usize {
    256
}
