//! Navigator capability
//!
//! The navigator is the external page-automation layer: it knows how to log
//! in, move between result pages, enumerate the items on a page and extract
//! records from one item (possibly opening detail views along the way). The
//! coordinator treats it as an opaque capability and only relies on the
//! contract below.

use crate::record::Record;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Returned by [`Navigator::discover_total_pages`] when the count is unknown
pub const UNKNOWN_TOTAL_PAGES: u32 = 0;

/// Errors reported by a navigator
#[derive(Debug, Error)]
pub enum NavigatorError {
    /// Moving to a page failed; the page can be skipped
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// Listing or extracting items failed; the item or page can be skipped
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// The underlying session is gone (browser crashed, logged out); the run cannot continue
    #[error("Session lost: {0}")]
    Session(String),
}

impl NavigatorError {
    /// Returns true if the run cannot continue after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Session(_))
    }
}

/// Result type for navigator operations
pub type NavResult<T> = Result<T, NavigatorError>;

/// Capability the coordinator drives page by page
///
/// Calls are never interrupted by the coordinator; an implementation should
/// bound its own waits so a hung page does not stall the run forever.
#[async_trait]
pub trait Navigator: Send {
    /// Opaque handle to one item listed on the current page
    type Item: fmt::Display + Send + Sync;

    /// Prepares the session (start a browser, log in, open the listing)
    async fn open(&mut self) -> NavResult<()> {
        Ok(())
    }

    /// Best-effort page count, or [`UNKNOWN_TOTAL_PAGES`]
    async fn discover_total_pages(&mut self) -> NavResult<u32>;

    /// Moves to page `page` (1-based); `Ok(false)` means the move did not happen
    async fn go_to_page(&mut self, page: u32) -> NavResult<bool>;

    /// Page the source reports as current, for post-navigation verification
    ///
    /// [`UNKNOWN_TOTAL_PAGES`] (0) means the page could not be determined.
    async fn current_page_number(&mut self) -> NavResult<u32>;

    /// Items listed on the current page, in display order
    async fn list_items(&mut self) -> NavResult<Vec<Self::Item>>;

    /// Records produced by one item; zero records is a valid outcome
    async fn extract_records(&mut self, item: &Self::Item) -> NavResult<Vec<Record>>;

    /// Releases the session; called once after the run whatever its outcome
    async fn close(&mut self) {}
}
