//! Storage traits and error types
//!
//! This module defines the trait interface for record store backends and
//! associated error types.

use crate::record::Record;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// Another process holds the backing resource; retrying later may succeed
    #[error("Resource locked: {0}")]
    ResourceLocked(String),

    /// The backing resource exists but its content cannot be parsed
    #[error("Storage unreadable: {0}")]
    Unreadable(String),

    /// A snapshot write gave up; the caller still owns the data
    #[error("Storage write failed after {attempts} attempt(s): {reason}")]
    WriteFailed { attempts: u32, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StorageError {
    /// True for conditions that may clear up if the write is retried
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::ResourceLocked(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for record store backends
///
/// A store holds the complete record set of one job. It is always written as
/// a full snapshot because resuming may require removing a trailing partial
/// page, which an append-only diff cannot express.
pub trait RecordStore: Send + Sync {
    /// Loads every persisted record in collection order
    ///
    /// Returns an empty set if nothing has been persisted yet, and
    /// [`StorageError::Unreadable`] if the backing resource exists but is not
    /// a valid store.
    fn load(&self) -> StorageResult<Vec<Record>>;

    /// Replaces the persisted set with `records` in one attempt
    ///
    /// Returns [`StorageError::ResourceLocked`] when an external holder
    /// prevents the write; retrying is the caller's job
    /// (see [`crate::storage::overwrite`]).
    fn write_snapshot(&self, records: &[Record]) -> StorageResult<()>;

    /// Writes the secondary plain-text export of `records`
    ///
    /// Called after every successful snapshot. Failures here never fail the
    /// primary write.
    fn export_text(&self, _records: &[Record]) -> StorageResult<()> {
        Ok(())
    }

    /// Human-readable location of the store, for status messages
    fn describe(&self) -> String;
}

impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    fn load(&self) -> StorageResult<Vec<Record>> {
        (**self).load()
    }

    fn write_snapshot(&self, records: &[Record]) -> StorageResult<()> {
        (**self).write_snapshot(records)
    }

    fn export_text(&self, records: &[Record]) -> StorageResult<()> {
        (**self).export_text(records)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
