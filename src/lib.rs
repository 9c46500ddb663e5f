//! Page-Harvest: a checkpoint-resumable crawl orchestrator
//!
//! This crate drives a long-running, interruptible collection job over a
//! paginated source. Page navigation and extraction are provided by an
//! external [`crawler::Navigator`]; the crate owns the page/item loop, its
//! pause/stop state machine, the durable snapshot store and the checkpoint
//! rule that decides where a restarted job resumes.

pub mod checkpoint;
pub mod config;
pub mod control;
pub mod crawler;
pub mod output;
pub mod record;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Page-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Navigator error: {0}")]
    Navigator(#[from] crawler::NavigatorError),

    #[error("Crawl worker panicked: {0}")]
    Panic(String),

    #[error("Crawl worker was cancelled")]
    Cancelled,

    #[error("Fixture error: {0}")]
    Fixture(String),

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
}

/// Result type alias for Page-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use checkpoint::{analyze, CheckpointState, IdentityKey};
pub use config::Config;
pub use control::{ControlChannel, CrawlEvent, ProgressEvent, Severity, StatusEvent};
pub use crawler::{Coordinator, CrawlHandle, FixtureNavigator, Navigator, NavigatorError, RunRequest, RunSummary};
pub use record::Record;
pub use state::RunState;
pub use storage::{RecordStore, SqliteRecordStore};
