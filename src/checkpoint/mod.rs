//! Checkpoint inference
//!
//! A run may be interrupted part-way through a page, so the persisted record
//! set can end with a truncated page. The checkpoint rule decides where the
//! next run resumes by counting the distinct items recorded for the last
//! page: a page holding at least the source's fixed page size is complete,
//! anything less is discarded and collected again.
//!
//! Record count alone cannot decide completeness since one item may yield
//! zero or many records.
//!
//! # Example
//!
//! ```
//! use page_harvest::checkpoint::{analyze, IdentityKey};
//! use page_harvest::Record;
//!
//! let records: Vec<Record> = (0..4)
//!     .map(|i| Record::new(1).field("institution", format!("U{}", i)))
//!     .collect();
//!
//! let state = analyze(&records, 10, &IdentityKey::single("institution"));
//! assert_eq!(state.resume_page, 1);
//! assert!(state.retained_records.is_empty());
//! ```

use crate::record::Record;
use std::collections::HashSet;

/// Identifies which item a record was produced from
///
/// Holds an ordered list of candidate field names; the first field with a
/// non-empty value is the item's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityKey {
    fields: Vec<String>,
}

impl IdentityKey {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn single(field: impl Into<String>) -> Self {
        Self::new([field])
    }

    /// Returns the identity of a record, if any candidate field is set
    pub fn identity<'a>(&self, record: &'a Record) -> Option<&'a str> {
        self.fields
            .iter()
            .filter_map(|name| record.get(name))
            .map(str::trim)
            .find(|value| !value.is_empty())
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

/// Where the next run should resume, derived from persisted records
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointState {
    /// First page the next run should collect (>= 1)
    pub resume_page: u32,

    /// Total page count if known, 0 otherwise
    pub known_total_pages: u32,

    /// Records to keep; the incomplete last page is already removed
    pub retained_records: Vec<Record>,

    /// Highest page found in the input, if any
    pub last_page: Option<u32>,

    /// Distinct items recorded for `last_page`
    pub last_page_items: usize,

    /// Records dropped because their page was incomplete
    pub purged_records: usize,
}

impl CheckpointState {
    /// State for a job with nothing persisted yet
    pub fn fresh() -> Self {
        Self {
            resume_page: 1,
            known_total_pages: 0,
            retained_records: Vec::new(),
            last_page: None,
            last_page_items: 0,
            purged_records: 0,
        }
    }

    /// True if the last persisted page was judged incomplete and purged
    pub fn purged_last_page(&self) -> bool {
        self.last_page.is_some() && self.last_page == Some(self.resume_page)
    }

    /// Records the total page count once it is known
    pub fn with_total_pages(mut self, total: u32) -> Self {
        self.known_total_pages = total;
        self
    }

    /// True if the resume point is already past a known last page
    pub fn is_finished(&self) -> bool {
        self.known_total_pages != 0 && self.resume_page > self.known_total_pages
    }
}

/// Infers the resume point from previously persisted records
///
/// Pure: no I/O and no hidden state, so calling it twice on the same input
/// always gives the same answer.
pub fn analyze(
    records: &[Record],
    expected_items_per_page: usize,
    key: &IdentityKey,
) -> CheckpointState {
    let Some(last_page) = records.iter().map(|r| r.page_number).max() else {
        return CheckpointState::fresh();
    };

    let distinct: HashSet<&str> = records
        .iter()
        .filter(|r| r.page_number == last_page)
        .filter_map(|r| key.identity(r))
        .collect();
    let last_page_items = distinct.len();

    if last_page_items >= expected_items_per_page {
        return CheckpointState {
            resume_page: last_page.saturating_add(1),
            known_total_pages: 0,
            retained_records: records.to_vec(),
            last_page: Some(last_page),
            last_page_items,
            purged_records: 0,
        };
    }

    let retained_records: Vec<Record> = records
        .iter()
        .filter(|r| r.page_number != last_page)
        .cloned()
        .collect();
    let purged_records = records.len() - retained_records.len();

    CheckpointState {
        // Page 0 never comes from a real source; treat it as page 1
        resume_page: last_page.max(1),
        known_total_pages: 0,
        retained_records,
        last_page: Some(last_page),
        last_page_items,
        purged_records,
    }
}
