//! Statistics over a persisted record set
//!
//! This module summarizes what a job has collected so far and where the
//! next run would resume.

use crate::checkpoint::{analyze, CheckpointState, IdentityKey};
use crate::record::Record;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};

/// Per-page breakdown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageStatistics {
    /// Records produced on the page
    pub records: usize,

    /// Distinct items the records belong to
    pub distinct_items: usize,
}

/// Record set statistics summary
#[derive(Debug, Clone)]
pub struct RecordStatistics {
    /// Total number of records stored
    pub total_records: usize,

    /// Breakdown by page number
    pub pages: BTreeMap<u32, PageStatistics>,

    /// Earliest and latest capture times
    pub first_captured: Option<DateTime<Utc>>,
    pub last_captured: Option<DateTime<Utc>>,

    /// Pages holding fewer distinct items than a full page
    pub short_pages: Vec<u32>,

    /// What the next run would do with this data
    pub checkpoint: CheckpointState,
}

/// Computes statistics for a record set
pub fn compute_statistics(
    records: &[Record],
    key: &IdentityKey,
    expected_items_per_page: usize,
) -> RecordStatistics {
    let mut items: BTreeMap<u32, (usize, HashSet<&str>)> = BTreeMap::new();
    for record in records {
        let entry = items.entry(record.page_number).or_default();
        entry.0 += 1;
        if let Some(id) = key.identity(record) {
            entry.1.insert(id);
        }
    }

    let pages: BTreeMap<u32, PageStatistics> = items
        .into_iter()
        .map(|(page, (count, ids))| {
            (
                page,
                PageStatistics {
                    records: count,
                    distinct_items: ids.len(),
                },
            )
        })
        .collect();

    let short_pages = pages
        .iter()
        .filter(|(_, s)| s.distinct_items < expected_items_per_page)
        .map(|(page, _)| *page)
        .collect();

    let mut checkpoint = analyze(records, expected_items_per_page, key);
    // The statistics only need the decision, not a second copy of the data
    checkpoint.retained_records = Vec::new();

    RecordStatistics {
        total_records: records.len(),
        first_captured: records.iter().map(|r| r.captured_at).min(),
        last_captured: records.iter().map(|r| r.captured_at).max(),
        pages,
        short_pages,
        checkpoint,
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &RecordStatistics) {
    println!("=== Record Statistics ===\n");

    println!("Overview:");
    println!("  Total records: {}", stats.total_records);
    println!("  Pages with records: {}", stats.pages.len());
    if let (Some(first), Some(last)) = (stats.first_captured, stats.last_captured) {
        println!("  Captured between: {} and {}", first.to_rfc3339(), last.to_rfc3339());
    }
    println!();

    if !stats.pages.is_empty() {
        println!("Pages:");
        for (page, page_stats) in &stats.pages {
            println!(
                "  Page {}: {} records, {} items",
                page, page_stats.records, page_stats.distinct_items
            );
        }
        println!();
    }

    if !stats.short_pages.is_empty() {
        println!("Short pages: {:?}", stats.short_pages);
        println!();
    }

    let cp = &stats.checkpoint;
    println!("Checkpoint:");
    match cp.last_page {
        None => println!("  Store is empty, next run starts at page 1"),
        Some(last) if cp.purged_last_page() => println!(
            "  Page {} is incomplete ({} items); its {} records will be collected again",
            last, cp.last_page_items, cp.purged_records
        ),
        Some(last) => println!(
            "  Page {} is complete ({} items)",
            last, cp.last_page_items
        ),
    }
    println!("  Next run resumes at page {}", cp.resume_page);
}
