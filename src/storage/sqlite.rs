//! SQLite record store
//!
//! This module provides a SQLite-based implementation of the [`RecordStore`]
//! trait. A connection is opened per operation so no lock is held on the
//! file between flushes, and the busy timeout is zero so contention surfaces
//! immediately as [`StorageError::ResourceLocked`].

use crate::output::write_csv_export;
use crate::record::Record;
use crate::storage::schema::{has_records_table, initialize_schema};
use crate::storage::traits::{RecordStore, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Metadata about the last snapshot written to a store
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotInfo {
    pub written_at: DateTime<Utc>,
    pub record_count: usize,
}

/// SQLite storage backend
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    path: PathBuf,
    export_path: Option<PathBuf>,
}

impl SqliteRecordStore {
    /// Creates a store backed by the database at `path`
    ///
    /// Nothing is opened or created until the first operation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            export_path: None,
        }
    }

    /// Also writes a CSV export to `export_path` after every snapshot
    pub fn with_export(mut self, export_path: impl Into<PathBuf>) -> Self {
        self.export_path = Some(export_path.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn export_path(&self) -> Option<&Path> {
        self.export_path.as_deref()
    }

    /// Reads bookkeeping about the last snapshot, if any was written
    pub fn snapshot_info(&self) -> StorageResult<Option<SnapshotInfo>> {
        let Some(conn) = self.open_for_read()? else {
            return Ok(None);
        };

        let read = |key: &str| -> StorageResult<Option<String>> {
            conn.query_row(
                "SELECT value FROM snapshot_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(classify_read_error)
        };

        let (Some(written_at), Some(count)) = (read("written_at")?, read("record_count")?) else {
            return Ok(None);
        };

        let written_at = parse_timestamp(&written_at)?;
        let record_count = count
            .parse::<usize>()
            .map_err(|e| StorageError::Unreadable(format!("bad record_count '{}': {}", count, e)))?;

        Ok(Some(SnapshotInfo {
            written_at,
            record_count,
        }))
    }

    /// Opens the database read-only, or returns None if it does not exist
    /// or has never had a snapshot written
    fn open_for_read(&self) -> StorageResult<Option<Connection>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(classify_read_error)?;
        conn.busy_timeout(Duration::ZERO)
            .map_err(classify_read_error)?;

        if !has_records_table(&conn).map_err(classify_read_error)? {
            return Ok(None);
        }

        Ok(Some(conn))
    }
}

impl RecordStore for SqliteRecordStore {
    fn load(&self) -> StorageResult<Vec<Record>> {
        let Some(conn) = self.open_for_read()? else {
            tracing::debug!("No record store at {}, starting empty", self.path.display());
            return Ok(Vec::new());
        };

        let mut stmt = conn
            .prepare("SELECT page_number, captured_at, fields FROM records ORDER BY seq")
            .map_err(classify_read_error)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(classify_read_error)?;

        let mut records = Vec::new();
        for row in rows {
            let (page_number, captured_at, fields) = row.map_err(classify_read_error)?;
            let page_number = u32::try_from(page_number).map_err(|_| {
                StorageError::Unreadable(format!("page_number out of range: {}", page_number))
            })?;
            let captured_at = parse_timestamp(&captured_at)?;
            let record = Record::from_stored(page_number, captured_at, &fields)
                .map_err(|e| StorageError::Unreadable(format!("bad fields column: {}", e)))?;
            records.push(record);
        }

        tracing::debug!(
            "Loaded {} records from {}",
            records.len(),
            self.path.display()
        );
        Ok(records)
    }

    fn write_snapshot(&self, records: &[Record]) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(&self.path).map_err(classify_write_error)?;
        conn.busy_timeout(Duration::ZERO)
            .map_err(classify_write_error)?;
        initialize_schema(&conn).map_err(classify_write_error)?;

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(classify_write_error)?;

        tx.execute("DELETE FROM records", [])
            .map_err(classify_write_error)?;
        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO records (seq, page_number, captured_at, fields)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(classify_write_error)?;

            for (seq, record) in records.iter().enumerate() {
                let fields = record
                    .fields_to_json()
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                insert
                    .execute(params![
                        seq as i64,
                        record.page_number,
                        record.captured_at.to_rfc3339(),
                        fields
                    ])
                    .map_err(classify_write_error)?;
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO snapshot_meta (key, value) VALUES ('written_at', ?1)",
            params![Utc::now().to_rfc3339()],
        )
        .map_err(classify_write_error)?;
        tx.execute(
            "INSERT OR REPLACE INTO snapshot_meta (key, value) VALUES ('record_count', ?1)",
            params![records.len().to_string()],
        )
        .map_err(classify_write_error)?;

        tx.commit().map_err(classify_write_error)?;
        Ok(())
    }

    fn export_text(&self, records: &[Record]) -> StorageResult<()> {
        match &self.export_path {
            Some(path) => write_csv_export(path, records).map_err(StorageError::from),
            None => Ok(()),
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Unreadable(format!("bad timestamp '{}': {}", value, e)))
}

fn error_code(e: &rusqlite::Error) -> Option<ErrorCode> {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => Some(err.code),
        _ => None,
    }
}

/// Maps SQLite failures during a write onto the storage taxonomy
fn classify_write_error(e: rusqlite::Error) -> StorageError {
    match error_code(&e) {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            StorageError::ResourceLocked(e.to_string())
        }
        Some(ErrorCode::NotADatabase) => StorageError::Unreadable(e.to_string()),
        _ => StorageError::Sqlite(e),
    }
}

/// Maps SQLite failures during a read onto the storage taxonomy
fn classify_read_error(e: rusqlite::Error) -> StorageError {
    match error_code(&e) {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            StorageError::ResourceLocked(e.to_string())
        }
        Some(ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt) => {
            StorageError::Unreadable(e.to_string())
        }
        _ => StorageError::Sqlite(e),
    }
}
