//! Configuration module for Page-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use page_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Full pages hold {} items", config.job.expected_items_per_page);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, EventsConfig, JobConfig, OutputConfig, PacingConfig, StorageConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, hash_config_text, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
