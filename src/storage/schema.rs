//! Database schema definitions
//!
//! This module contains the SQL schema for the Page-Harvest record database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Collected records, one row each, in collection order
CREATE TABLE IF NOT EXISTS records (
    seq INTEGER PRIMARY KEY,
    page_number INTEGER NOT NULL CHECK (page_number >= 0),
    captured_at TEXT NOT NULL,
    fields TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_page ON records(page_number);

-- Bookkeeping about the last snapshot written
CREATE TABLE IF NOT EXISTS snapshot_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// Creates all tables and indexes if they don't already exist.
/// Safe to call multiple times.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", get_schema_version())?;
    Ok(())
}

/// Returns true if the records table exists in this database
pub fn has_records_table(conn: &rusqlite::Connection) -> Result<bool, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'records'",
        [],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Gets the current schema version
pub fn get_schema_version() -> u32 {
    1
}
