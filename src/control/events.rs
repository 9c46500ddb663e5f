//! Progress and status events published by a crawl run

use serde::Serialize;
use std::fmt;

/// Severity of a status event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Success,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Success => "success",
        };
        f.write_str(label)
    }
}

/// Snapshot of how far the run has got
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub current_page: u32,
    pub total_pages: u32,
    pub record_count: usize,
    /// Pages before `current_page` as a share of `total_pages`, 0..=100
    pub percent_complete: f64,
    pub status_label: String,
}

impl ProgressEvent {
    pub fn new(
        current_page: u32,
        total_pages: u32,
        record_count: usize,
        status_label: impl Into<String>,
    ) -> Self {
        let percent_complete = if total_pages > 0 {
            let done = current_page.saturating_sub(1).min(total_pages);
            f64::from(done) / f64::from(total_pages) * 100.0
        } else {
            0.0
        };
        Self {
            current_page,
            total_pages,
            record_count,
            percent_complete,
            status_label: status_label.into(),
        }
    }

    /// Final progress for a run that attempted every page
    pub fn finished(total_pages: u32, record_count: usize, status_label: impl Into<String>) -> Self {
        Self {
            current_page: total_pages,
            total_pages,
            record_count,
            percent_complete: 100.0,
            status_label: status_label.into(),
        }
    }
}

/// Human-readable message about something that happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub message: String,
    pub severity: Severity,
}

impl StatusEvent {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

/// Any event carried by the control channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CrawlEvent {
    Progress(ProgressEvent),
    Status(StatusEvent),
}
