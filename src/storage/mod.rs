//! Storage module for persisting collected records
//!
//! This module handles durable storage of the job's record set, including:
//! - SQLite database initialization and schema management
//! - Full-snapshot writes with bounded retry while an external holder locks the store
//! - The secondary plain-text export written after each snapshot

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{SnapshotInfo, SqliteRecordStore};
pub use traits::{RecordStore, StorageError, StorageResult};

use crate::config::{Config, StorageConfig};
use crate::record::Record;
use std::time::Duration;

/// Opens the record store described by the configuration
pub fn open_store(config: &Config) -> SqliteRecordStore {
    SqliteRecordStore::new(&config.output.database_path).with_export(config.output.export_path())
}

/// How snapshot writes are retried while the store is locked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Wait between attempts for the external holder to let go
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(2),
        }
    }
}

impl From<&StorageConfig> for RetryPolicy {
    fn from(config: &StorageConfig) -> Self {
        Self {
            max_attempts: config.write_attempts.max(1),
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

/// A locked write attempt that will be retried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedAttempt {
    /// 1-based attempt that hit the lock
    pub attempt: u32,
    pub max_attempts: u32,
    pub reason: String,
}

/// Replaces the store's content with `records`, retrying while it is locked
///
/// Each locked attempt except the last is reported to `on_locked` before
/// waiting `policy.delay`. When the attempts run out, or a non-lock error
/// occurs, the result is [`StorageError::WriteFailed`]; `records` is
/// untouched so the caller can try again at its next flush point.
///
/// After a successful write the store's plain-text export is refreshed. A
/// failed export is logged and does not fail the write.
pub async fn overwrite<S, F>(
    store: &S,
    records: &[Record],
    policy: &RetryPolicy,
    mut on_locked: F,
) -> StorageResult<()>
where
    S: RecordStore + ?Sized,
    F: FnMut(&LockedAttempt),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match store.write_snapshot(records) {
            Ok(()) => break,
            Err(StorageError::ResourceLocked(reason)) if attempt < max_attempts => {
                tracing::warn!(
                    "Store {} is locked, retrying ({}/{})",
                    store.describe(),
                    attempt,
                    max_attempts
                );
                on_locked(&LockedAttempt {
                    attempt,
                    max_attempts,
                    reason,
                });
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => {
                tracing::error!(
                    "Writing {} records to {} failed: {}",
                    records.len(),
                    store.describe(),
                    e
                );
                return Err(StorageError::WriteFailed {
                    attempts: attempt,
                    reason: e.to_string(),
                });
            }
        }
    }

    tracing::debug!("Wrote {} records to {}", records.len(), store.describe());

    if let Err(e) = store.export_text(records) {
        tracing::warn!("Plain-text export for {} failed: {}", store.describe(), e);
    }

    Ok(())
}
