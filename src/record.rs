//! Collected record type
//!
//! A [`Record`] is one row of output: caller-defined string columns in
//! insertion order, plus the page it was produced on and when.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the page column in tabular exports
pub const PAGE_NUMBER_COLUMN: &str = "page_number";

/// Name of the capture timestamp column in tabular exports
pub const CAPTURED_AT_COLUMN: &str = "captured_at";

/// One collected row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Page on which the record was produced (1-based)
    pub page_number: u32,

    /// When the record was captured
    pub captured_at: DateTime<Utc>,

    /// Domain-specific columns, in the order they were set
    fields: Vec<(String, String)>,
}

impl Record {
    /// Creates an empty record for the given page, stamped with the current time
    pub fn new(page_number: u32) -> Self {
        Self::with_timestamp(page_number, Utc::now())
    }

    /// Creates an empty record with an explicit capture time
    pub fn with_timestamp(page_number: u32, captured_at: DateTime<Utc>) -> Self {
        Self {
            page_number,
            captured_at,
            fields: Vec::new(),
        }
    }

    /// Builder-style field setter
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a field, replacing the value in place if the name already exists
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Returns the value of a field
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates fields in insertion order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of domain-specific fields
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Serializes the domain fields for storage
    pub(crate) fn fields_to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.fields)
    }

    /// Rebuilds a record from its stored parts
    pub(crate) fn from_stored(
        page_number: u32,
        captured_at: DateTime<Utc>,
        fields_json: &str,
    ) -> serde_json::Result<Self> {
        let fields: Vec<(String, String)> = serde_json::from_str(fields_json)?;
        Ok(Self {
            page_number,
            captured_at,
            fields,
        })
    }
}
