//! Crawl coordinator - main orchestration logic
//!
//! This module contains the page/item loop that drives a [`Navigator`],
//! including:
//! - Resuming from the checkpoint inferred from persisted records
//! - Resolving the page range from discovery and caller overrides
//! - Honouring pause and stop at safe points between units of work
//! - Flushing the full record set after every page, on stop and on failure

use crate::checkpoint::{analyze, CheckpointState, IdentityKey};
use crate::config::{Config, PacingConfig};
use crate::control::{ControlChannel, ProgressEvent, Severity};
use crate::crawler::navigator::{Navigator, UNKNOWN_TOTAL_PAGES};
use crate::crawler::pacing::Pacer;
use crate::record::Record;
use crate::state::RunState;
use crate::storage::{self, RecordStore, RetryPolicy};
use crate::{HarvestError, Result};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Caller overrides for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunRequest {
    /// First page to collect; defaults to the checkpoint's resume page
    pub start_page: Option<u32>,

    /// Last page to collect; defaults to the discovered (or assumed) total
    pub end_page: Option<u32>,

    /// Only the first N items of each page are collected
    pub item_limit_per_page: Option<usize>,
}

impl RunRequest {
    pub fn pages(start_page: u32, end_page: u32) -> Self {
        Self {
            start_page: Some(start_page),
            end_page: Some(end_page),
            item_limit_per_page: None,
        }
    }
}

/// Outcome of a run that did not fail
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// `Completed` or `Stopped`
    pub final_state: RunState,
    pub start_page: u32,
    pub end_page: u32,
    /// Page count used for progress reporting
    pub total_pages: u32,
    pub pages_attempted: u32,
    pub pages_skipped: u32,
    pub items_attempted: usize,
    pub items_failed: usize,
    /// Records produced during this run
    pub records_collected: usize,
    /// Records held at the end, including those resumed from the store
    pub record_count: usize,
    /// True if the last flush failed and the store is behind memory
    pub unflushed: bool,
}

/// Job parameters the coordinator needs from the configuration
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub job_name: String,
    pub identity: IdentityKey,
    pub expected_items_per_page: usize,
    pub assumed_total_pages: u32,
    pub pacing: PacingConfig,
    pub retry: RetryPolicy,
}

impl CrawlSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            job_name: config.job.name.clone(),
            identity: IdentityKey::new(config.job.identity_fields.iter().cloned()),
            expected_items_per_page: config.job.expected_items_per_page,
            assumed_total_pages: config.job.assumed_total_pages,
            pacing: config.pacing.clone(),
            retry: RetryPolicy::from(&config.storage),
        }
    }
}

/// Inclusive page range a run walks through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageRange {
    pub start: u32,
    pub end: u32,
    pub total_pages: u32,
    /// The checkpoint is already past a known last page
    pub already_complete: bool,
}

/// Works out which pages to visit
///
/// `checkpoint.known_total_pages` is [`UNKNOWN_TOTAL_PAGES`] when the
/// navigator could not tell, in which case `assumed_total` stands in for it.
pub(crate) fn resolve_range(
    request: &RunRequest,
    checkpoint: &CheckpointState,
    assumed_total: u32,
) -> PageRange {
    let discovered_total = checkpoint.known_total_pages;
    let known = discovered_total != UNKNOWN_TOTAL_PAGES;
    let start = request.start_page.unwrap_or(checkpoint.resume_page).max(1);
    let total = if known { discovered_total } else { assumed_total.max(1) };

    let end = match request.end_page {
        Some(end) if known => end.min(discovered_total),
        Some(end) => end,
        None => total,
    };
    let end = end.max(start);

    PageRange {
        start,
        end,
        total_pages: total.max(end),
        already_complete: request.start_page.is_none() && checkpoint.is_finished(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    Completed,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageOutcome {
    Collected,
    Skipped,
    Stopped,
}

/// Records collected for the current page
///
/// When the page already has held records (an explicit re-collection, or a
/// navigator that landed on another page), those are replaced only once the
/// whole page has been attempted. An unfinished re-collection keeps the held
/// records instead.
#[derive(Debug, Default)]
struct PageBuffer {
    page: Option<u32>,
    replaces_held: bool,
    records: Vec<Record>,
}

#[derive(Debug, Clone, Copy, Default)]
struct RunTally {
    pages_attempted: u32,
    pages_skipped: u32,
    items_attempted: usize,
    items_failed: usize,
    records_collected: usize,
}

/// Main crawl coordinator
///
/// Owns the navigator, the record store and the in-memory record set for the
/// duration of a run. Operators interact through the shared
/// [`ControlChannel`] only.
pub struct Coordinator<N, S> {
    navigator: N,
    store: S,
    control: Arc<ControlChannel>,
    settings: CrawlSettings,
    pacer: Pacer,
    records: Vec<Record>,
    /// Records of the page being collected, merged into `records` once it ends
    page_buffer: PageBuffer,
    dirty: bool,
    tally: RunTally,
}

impl<N, S> Coordinator<N, S>
where
    N: Navigator,
    S: RecordStore,
{
    pub fn new(settings: CrawlSettings, navigator: N, store: S, control: Arc<ControlChannel>) -> Self {
        let pacer = Pacer::new(&settings.pacing);
        Self {
            navigator,
            store,
            control,
            settings,
            pacer,
            records: Vec::new(),
            page_buffer: PageBuffer::default(),
            dirty: false,
            tally: RunTally::default(),
        }
    }

    /// Builds a coordinator with its own control channel sized from the configuration
    pub fn from_config(config: &Config, navigator: N, store: S) -> Self {
        let control = Arc::new(ControlChannel::new(config.events.capacity));
        Self::new(CrawlSettings::from_config(config), navigator, store, control)
    }

    pub fn control(&self) -> &Arc<ControlChannel> {
        &self.control
    }

    /// Records held in memory
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs the job on a dedicated tokio task
    pub fn spawn(mut self, request: RunRequest) -> CrawlHandle
    where
        N: 'static,
        N::Item: 'static,
        S: 'static,
    {
        let control = Arc::clone(&self.control);
        let task = tokio::spawn(async move { self.run(request).await });
        CrawlHandle { control, task }
    }

    /// Runs the job to completion, stop or failure
    ///
    /// Returns the summary for `Completed` and `Stopped` runs. A failure has
    /// already been flushed (best effort), published as an error status and
    /// recorded as `Failed` when the error is returned.
    pub async fn run(&mut self, request: RunRequest) -> Result<RunSummary> {
        self.control.reset_for_new_run();
        self.records.clear();
        self.page_buffer = PageBuffer::default();
        self.dirty = false;
        self.tally = RunTally::default();

        self.enter(RunState::Running);
        self.report(
            Severity::Info,
            format!("Starting job '{}'", self.settings.job_name),
        );

        let persisted = match self.store.load() {
            Ok(records) => records,
            Err(e) => {
                // Nothing collected yet, and writing now could clobber data we failed to read
                self.report(
                    Severity::Error,
                    format!("Could not load records from {}: {}", self.store.describe(), e),
                );
                self.enter(RunState::Failed);
                return Err(e.into());
            }
        };

        let mut checkpoint = analyze(
            &persisted,
            self.settings.expected_items_per_page,
            &self.settings.identity,
        );
        self.log_checkpoint(&checkpoint);
        self.records = std::mem::take(&mut checkpoint.retained_records);

        let outcome = self.drive(request, checkpoint).await;

        if let Err(payload) = AssertUnwindSafe(self.navigator.close()).catch_unwind().await {
            self.report(
                Severity::Warning,
                format!("Navigator panicked while closing: {}", panic_message(payload)),
            );
        }

        self.finish(outcome).await
    }

    // ===== Run Phases =====

    async fn drive(&mut self, request: RunRequest, checkpoint: CheckpointState) -> Result<(LoopExit, PageRange)> {
        guarded(self.navigator.open()).await??;

        let discovered = match guarded(self.navigator.discover_total_pages()).await? {
            Ok(total) => total,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                self.report(Severity::Warning, format!("Page count discovery failed: {}", e));
                UNKNOWN_TOTAL_PAGES
            }
        };

        if discovered == UNKNOWN_TOTAL_PAGES {
            self.report(
                Severity::Warning,
                format!(
                    "Total page count unknown, assuming {}",
                    self.settings.assumed_total_pages
                ),
            );
        } else {
            tracing::info!("Source lists {} pages", discovered);
        }

        let checkpoint = checkpoint.with_total_pages(discovered);
        let range = resolve_range(&request, &checkpoint, self.settings.assumed_total_pages);

        if range.already_complete {
            self.report(
                Severity::Info,
                format!(
                    "Checkpoint is at page {}, past the last page {}; nothing left to collect",
                    checkpoint.resume_page, checkpoint.known_total_pages
                ),
            );
            return Ok((LoopExit::Completed, range));
        }

        self.report(
            Severity::Info,
            format!(
                "Collecting pages {} to {} ({} records already held)",
                range.start,
                range.end,
                self.records.len()
            ),
        );

        let exit = self.collect_range(&range, request.item_limit_per_page).await?;
        Ok((exit, range))
    }

    async fn collect_range(&mut self, range: &PageRange, item_limit: Option<usize>) -> Result<LoopExit> {
        for page in range.start..=range.end {
            if self.at_safe_point().await {
                return Ok(LoopExit::Stopped);
            }

            self.tally.pages_attempted += 1;
            self.report(
                Severity::Info,
                format!("Processing page {}/{}", page, range.total_pages),
            );
            self.emit_progress(page, range, "navigating");

            match self.collect_page(page, range, item_limit).await? {
                PageOutcome::Collected => {}
                PageOutcome::Skipped => self.tally.pages_skipped += 1,
                PageOutcome::Stopped => return Ok(LoopExit::Stopped),
            }

            if page < range.end {
                self.pacer.between_pages(&self.control).await;
            }
        }

        Ok(LoopExit::Completed)
    }

    async fn collect_page(
        &mut self,
        page: u32,
        range: &PageRange,
        item_limit: Option<usize>,
    ) -> Result<PageOutcome> {
        match guarded(self.navigator.go_to_page(page)).await? {
            Ok(true) => {}
            Ok(false) => {
                self.report(
                    Severity::Error,
                    format!("Could not navigate to page {}, skipping it", page),
                );
                return Ok(PageOutcome::Skipped);
            }
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                self.report(
                    Severity::Error,
                    format!("Navigation to page {} failed, skipping it: {}", page, e),
                );
                return Ok(PageOutcome::Skipped);
            }
        }

        let record_page = match guarded(self.navigator.current_page_number()).await? {
            Ok(actual) if actual == page || actual == UNKNOWN_TOTAL_PAGES => page,
            Ok(actual) => {
                self.report(
                    Severity::Warning,
                    format!(
                        "Asked for page {} but the source shows page {}; recording it as page {}",
                        page, actual, actual
                    ),
                );
                actual
            }
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                self.report(
                    Severity::Warning,
                    format!(
                        "Could not verify the current page after navigating to page {}: {}",
                        page, e
                    ),
                );
                page
            }
        };

        let mut items = match guarded(self.navigator.list_items()).await? {
            Ok(items) => items,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                self.report(
                    Severity::Warning,
                    format!("Could not list items on page {}, skipping it: {}", page, e),
                );
                return Ok(PageOutcome::Skipped);
            }
        };

        if items.is_empty() {
            self.report(
                Severity::Warning,
                format!("No items found on page {}, skipping it", page),
            );
            return Ok(PageOutcome::Skipped);
        }

        if let Some(limit) = item_limit {
            items.truncate(limit);
        }

        let count = items.len();
        tracing::info!("Page {} lists {} items", record_page, count);
        self.begin_page(record_page);

        for (index, item) in items.iter().enumerate() {
            if self.at_safe_point().await {
                return Ok(PageOutcome::Stopped);
            }

            self.tally.items_attempted += 1;
            tracing::info!("Processing item {}/{}: {}", index + 1, count, item);

            match guarded(self.navigator.extract_records(item)).await? {
                Ok(records) => {
                    let produced = records.len();
                    self.page_buffer.records.extend(records.into_iter().map(|mut record| {
                        record.page_number = record_page;
                        record
                    }));
                    self.tally.records_collected += produced;
                    tracing::debug!("Item {} produced {} records", item, produced);
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    self.tally.items_failed += 1;
                    self.report(
                        Severity::Error,
                        format!("Item {}/{} ({}) failed: {}", index + 1, count, item, e),
                    );
                }
            }

            self.emit_progress(page, range, "collecting");

            if index + 1 < count {
                self.pacer.between_items(&self.control).await;
            }
        }

        self.commit_page();
        self.flush().await;
        self.report(
            Severity::Info,
            format!(
                "Page {} done, {} records held",
                record_page,
                self.records.len()
            ),
        );

        Ok(PageOutcome::Collected)
    }

    async fn finish(&mut self, outcome: Result<(LoopExit, PageRange)>) -> Result<RunSummary> {
        self.settle_partial_page();
        match outcome {
            Ok((exit, range)) => {
                let saved = self.flush().await;
                let final_state = match exit {
                    LoopExit::Completed => {
                        self.enter(RunState::Completed);
                        self.control.progress(ProgressEvent::finished(
                            range.total_pages,
                            self.records.len(),
                            RunState::Completed.label(),
                        ));
                        self.report(
                            Severity::Success,
                            format!(
                                "Job '{}' finished with {} records",
                                self.settings.job_name,
                                self.records.len()
                            ),
                        );
                        RunState::Completed
                    }
                    LoopExit::Stopped => {
                        self.enter(RunState::Stopped);
                        let message = if saved {
                            format!("Stopped, {} records saved", self.records.len())
                        } else {
                            format!("Stopped, but {} records could not be saved", self.records.len())
                        };
                        self.report(Severity::Warning, message);
                        RunState::Stopped
                    }
                };
                Ok(self.summary(final_state, &range))
            }
            Err(fault) => {
                self.report(Severity::Error, format!("Run failed: {}", fault));
                if self.dirty {
                    self.report(
                        Severity::Warning,
                        format!("Emergency save of {} records", self.records.len()),
                    );
                    self.flush().await;
                }
                self.enter(RunState::Failed);
                Err(fault)
            }
        }
    }

    // ===== Helpers =====

    /// Handles pause and stop between units of work; returns true to stop
    async fn at_safe_point(&mut self) -> bool {
        if self.control.is_stop_requested() {
            self.enter(RunState::Stopping);
            return true;
        }

        if self.control.is_pause_requested() {
            self.enter(RunState::Paused);
            self.report(Severity::Warning, "Paused, waiting for resume");

            if self.pacer.wait_while_paused(&self.control).await {
                self.enter(RunState::Stopping);
                return true;
            }

            self.enter(RunState::Running);
            self.report(Severity::Info, "Resumed");
        }

        false
    }

    /// Writes the full record set if anything changed since the last good write
    ///
    /// Returns false if the write failed; the records stay in memory.
    async fn flush(&mut self) -> bool {
        if !self.dirty {
            return true;
        }

        let control = Arc::clone(&self.control);
        let location = self.store.describe();
        let result = storage::overwrite(&self.store, &self.records, &self.settings.retry, |locked| {
            control.status(
                Severity::Warning,
                format!(
                    "{} is locked by another program, close it to continue saving (attempt {}/{})",
                    location, locked.attempt, locked.max_attempts
                ),
            );
        })
        .await;

        match result {
            Ok(()) => {
                self.dirty = false;
                true
            }
            Err(e) => {
                self.report(
                    Severity::Error,
                    format!(
                        "Saving {} records failed, keeping them in memory for the next save: {}",
                        self.records.len(),
                        e
                    ),
                );
                false
            }
        }
    }

    /// Starts buffering records for `record_page`
    fn begin_page(&mut self, record_page: u32) {
        self.page_buffer = PageBuffer {
            page: Some(record_page),
            replaces_held: self.records.iter().any(|r| r.page_number == record_page),
            records: Vec::new(),
        };
    }

    /// Merges a fully attempted page, replacing anything held for it
    fn commit_page(&mut self) {
        let buffer = std::mem::take(&mut self.page_buffer);
        let Some(page) = buffer.page else {
            return;
        };

        if buffer.replaces_held && buffer.records.is_empty() {
            self.report(
                Severity::Warning,
                format!("Page {} yielded no records this time, keeping its held records", page),
            );
            return;
        }

        if buffer.replaces_held {
            let before = self.records.len();
            self.records.retain(|record| record.page_number != page);
            let replaced = before - self.records.len();
            self.report(
                Severity::Warning,
                format!(
                    "Replaced {} held records of page {} with {} collected again",
                    replaced,
                    page,
                    buffer.records.len()
                ),
            );
            if replaced > 0 {
                self.dirty = true;
            }
        }

        if !buffer.records.is_empty() {
            self.dirty = true;
        }
        self.records.extend(buffer.records);
    }

    /// Deals with a page left unfinished by a stop or a failure
    ///
    /// New pages keep what was collected; a page that already had held
    /// records keeps those and drops the partial re-collection.
    fn settle_partial_page(&mut self) {
        let buffer = std::mem::take(&mut self.page_buffer);
        let Some(page) = buffer.page else {
            return;
        };

        if buffer.replaces_held {
            if !buffer.records.is_empty() {
                self.report(
                    Severity::Warning,
                    format!(
                        "Page {} was not collected again in full, keeping its held records and dropping {} new ones",
                        page,
                        buffer.records.len()
                    ),
                );
            }
            return;
        }

        if !buffer.records.is_empty() {
            self.dirty = true;
        }
        self.records.extend(buffer.records);
    }

    fn log_checkpoint(&self, checkpoint: &CheckpointState) {
        match checkpoint.last_page {
            None => tracing::info!("No records persisted yet, starting at page 1"),
            Some(last) if checkpoint.purged_last_page() => self.report(
                Severity::Warning,
                format!(
                    "Page {} is incomplete ({}/{} items), dropped {} records and resuming there",
                    last,
                    checkpoint.last_page_items,
                    self.settings.expected_items_per_page,
                    checkpoint.purged_records
                ),
            ),
            Some(last) => self.report(
                Severity::Info,
                format!(
                    "Page {} is complete, resuming at page {} with {} records",
                    last,
                    checkpoint.resume_page,
                    checkpoint.retained_records.len()
                ),
            ),
        }
    }

    fn emit_progress(&self, page: u32, range: &PageRange, label: &str) {
        self.control.progress(ProgressEvent::new(
            page,
            range.total_pages,
            self.records.len() + self.page_buffer.records.len(),
            label,
        ));
    }

    /// Logs a status message and publishes it to subscribers
    fn report(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Info | Severity::Success => tracing::info!("{}", message),
            Severity::Warning => tracing::warn!("{}", message),
            Severity::Error => tracing::error!("{}", message),
        }
        self.control.status(severity, message);
    }

    fn enter(&self, next: RunState) {
        let cell = self.control.state_cell();
        match cell.transition(next) {
            Ok(previous) if previous != next => {
                tracing::debug!("Run state {} -> {}", previous, next);
            }
            Ok(_) => {}
            Err(current) => {
                tracing::warn!("Unexpected run state change {} -> {}", current, next);
                cell.force(next);
            }
        }
    }

    fn summary(&self, final_state: RunState, range: &PageRange) -> RunSummary {
        RunSummary {
            final_state,
            start_page: range.start,
            end_page: range.end,
            total_pages: range.total_pages,
            pages_attempted: self.tally.pages_attempted,
            pages_skipped: self.tally.pages_skipped,
            items_attempted: self.tally.items_attempted,
            items_failed: self.tally.items_failed,
            records_collected: self.tally.records_collected,
            record_count: self.records.len(),
            unflushed: self.dirty,
        }
    }
}

/// Handle to a coordinator running on its own task
#[derive(Debug)]
pub struct CrawlHandle {
    control: Arc<ControlChannel>,
    task: JoinHandle<Result<RunSummary>>,
}

impl CrawlHandle {
    pub fn pause(&self) {
        self.control.request_pause();
    }

    pub fn resume(&self) {
        self.control.request_resume();
    }

    pub fn stop(&self) {
        self.control.request_stop();
    }

    /// Run state snapshot
    pub fn status(&self) -> RunState {
        self.control.run_state()
    }

    pub fn control(&self) -> &Arc<ControlChannel> {
        &self.control
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the run to end
    pub async fn wait(self) -> Result<RunSummary> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                self.control.state_cell().force(RunState::Failed);
                Err(HarvestError::Panic(panic_message(e.into_panic())))
            }
            Err(_) => {
                self.control.state_cell().force(RunState::Failed);
                Err(HarvestError::Cancelled)
            }
        }
    }
}

/// Runs a navigator call, turning a panic inside it into an error
async fn guarded<F>(future: F) -> Result<F::Output>
where
    F: Future,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|payload| HarvestError::Panic(panic_message(payload)))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
