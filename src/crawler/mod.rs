//! Crawler module for page-by-page collection
//!
//! This module contains the core crawling logic, including:
//! - The [`Navigator`] capability the loop drives
//! - Request pacing and cooperative pause/stop waits
//! - Overall crawl coordination
//! - A JSON fixture navigator for offline runs

mod coordinator;
mod fixture;
mod navigator;
mod pacing;

pub use coordinator::{Coordinator, CrawlHandle, CrawlSettings, RunRequest, RunSummary};
pub use fixture::{FixtureItem, FixtureNavigator};
pub use navigator::{NavResult, Navigator, NavigatorError, UNKNOWN_TOTAL_PAGES};
pub use pacing::{sleep_unless_stopped, wait_while_paused, DelayRange, Pacer};

use crate::config::Config;
use crate::storage::open_store;
use crate::Result;

/// Runs a complete crawl against the configured store
///
/// This is the blocking entry point: it builds the store from `config`,
/// runs the job on the current task and returns once it completes, stops
/// or fails. Use [`Coordinator::spawn`] to keep control of a running job.
pub async fn crawl<N: Navigator>(config: &Config, navigator: N, request: RunRequest) -> Result<RunSummary> {
    let mut coordinator = Coordinator::from_config(config, navigator, open_store(config));
    coordinator.run(request).await
}
