//! Integration tests for the crawl coordinator
//!
//! These tests drive the full page/item loop with a scripted navigator and
//! check what ends up in the record store, the run state and the event
//! stream.

use async_trait::async_trait;
use page_harvest::checkpoint::{analyze, IdentityKey};
use page_harvest::config::PacingConfig;
use page_harvest::control::{ControlChannel, CrawlEvent, Severity, StatusEvent};
use page_harvest::crawler::{
    Coordinator, CrawlSettings, NavResult, Navigator, NavigatorError, RunRequest,
};
use page_harvest::record::Record;
use page_harvest::state::RunState;
use page_harvest::storage::{RecordStore, RetryPolicy, SqliteRecordStore, StorageError, StorageResult};
use page_harvest::HarvestError;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

type ItemHook = Box<dyn Fn(&str) + Send>;

/// Navigator over synthetic pages whose items are named `p{page}-i{index}`
struct ScriptedNavigator {
    total_pages: u32,
    pages: BTreeMap<u32, usize>,
    current: u32,
    unreachable: HashSet<u32>,
    redirects: HashMap<u32, u32>,
    failing_items: HashSet<String>,
    session_lost_at: Option<String>,
    panic_at: Option<String>,
    verify_error: bool,
    panic_on_close: bool,
    on_item: Option<ItemHook>,
    visited_items: Arc<Mutex<Vec<String>>>,
    visited_pages: Arc<Mutex<Vec<u32>>>,
    closed: Arc<AtomicBool>,
}

impl ScriptedNavigator {
    fn new(total_pages: u32, items_per_page: usize) -> Self {
        Self {
            total_pages,
            pages: (1..=total_pages).map(|p| (p, items_per_page)).collect(),
            current: 0,
            unreachable: HashSet::new(),
            redirects: HashMap::new(),
            failing_items: HashSet::new(),
            session_lost_at: None,
            panic_at: None,
            verify_error: false,
            panic_on_close: false,
            on_item: None,
            visited_items: Arc::new(Mutex::new(Vec::new())),
            visited_pages: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn visited_items(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.visited_items)
    }

    fn visited_pages(&self) -> Arc<Mutex<Vec<u32>>> {
        Arc::clone(&self.visited_pages)
    }
}

#[async_trait]
impl Navigator for ScriptedNavigator {
    type Item = String;

    async fn discover_total_pages(&mut self) -> NavResult<u32> {
        Ok(self.total_pages)
    }

    async fn go_to_page(&mut self, page: u32) -> NavResult<bool> {
        self.visited_pages.lock().unwrap().push(page);
        if self.unreachable.contains(&page) || !self.pages.contains_key(&page) {
            return Ok(false);
        }
        self.current = self.redirects.get(&page).copied().unwrap_or(page);
        Ok(true)
    }

    async fn current_page_number(&mut self) -> NavResult<u32> {
        if self.verify_error {
            return Err(NavigatorError::Navigation("page indicator missing".to_string()));
        }
        Ok(self.current)
    }

    async fn list_items(&mut self) -> NavResult<Vec<String>> {
        let count = self.pages.get(&self.current).copied().unwrap_or(0);
        Ok((1..=count)
            .map(|i| format!("p{}-i{}", self.current, i))
            .collect())
    }

    async fn extract_records(&mut self, item: &String) -> NavResult<Vec<Record>> {
        self.visited_items.lock().unwrap().push(item.clone());
        if let Some(hook) = &self.on_item {
            hook(item);
        }
        if self.session_lost_at.as_deref() == Some(item.as_str()) {
            return Err(NavigatorError::Session("browser closed".to_string()));
        }
        if self.panic_at.as_deref() == Some(item.as_str()) {
            panic!("navigator bug on {}", item);
        }
        if self.failing_items.contains(item) {
            return Err(NavigatorError::Extraction(format!("no detail table for {}", item)));
        }
        Ok(vec![Record::new(0)
            .field("institution", item.as_str())
            .field("program", "Accounting")])
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if self.panic_on_close {
            panic!("browser already gone");
        }
    }
}

/// In-memory store that reports itself locked for a number of write attempts
#[derive(Default)]
struct ContendedStore {
    records: Mutex<Vec<Record>>,
    locked_attempts_left: AtomicU32,
    successful_writes: Mutex<Vec<usize>>,
}

impl RecordStore for ContendedStore {
    fn load(&self) -> StorageResult<Vec<Record>> {
        Ok(self.records.lock().unwrap().clone())
    }

    fn write_snapshot(&self, records: &[Record]) -> StorageResult<()> {
        let left = self.locked_attempts_left.load(Ordering::SeqCst);
        if left > 0 {
            self.locked_attempts_left.store(left - 1, Ordering::SeqCst);
            return Err(StorageError::ResourceLocked("open in a spreadsheet".to_string()));
        }
        *self.records.lock().unwrap() = records.to_vec();
        self.successful_writes.lock().unwrap().push(records.len());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory store".to_string()
    }
}

fn settings() -> CrawlSettings {
    CrawlSettings {
        job_name: "test-job".to_string(),
        identity: IdentityKey::single("institution"),
        expected_items_per_page: 10,
        assumed_total_pages: 33,
        pacing: PacingConfig::immediate(),
        retry: RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        },
    }
}

fn sqlite_store(dir: &TempDir) -> SqliteRecordStore {
    SqliteRecordStore::new(dir.path().join("records.db")).with_export(dir.path().join("records.csv"))
}

fn drain_status(rx: &mut broadcast::Receiver<CrawlEvent>) -> Vec<StatusEvent> {
    let mut statuses = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let CrawlEvent::Status(status) = event {
            statuses.push(status);
        }
    }
    statuses
}

fn page_records(page: u32, items: usize) -> Vec<Record> {
    (1..=items)
        .map(|i| {
            Record::new(page)
                .field("institution", format!("p{}-i{}", page, i))
                .field("program", "Accounting")
        })
        .collect()
}

fn identities(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.get("institution").map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_end_to_end_two_pages() {
    let dir = TempDir::new().unwrap();
    let control = Arc::new(ControlChannel::new(1024));
    let mut rx = control.subscribe();

    let mut coordinator = Coordinator::new(
        settings(),
        ScriptedNavigator::new(2, 10),
        sqlite_store(&dir),
        Arc::clone(&control),
    );

    let summary = coordinator.run(RunRequest::default()).await.unwrap();

    assert_eq!(summary.final_state, RunState::Completed);
    assert_eq!(summary.record_count, 20);
    assert_eq!(summary.pages_attempted, 2);
    assert_eq!(summary.pages_skipped, 0);
    assert!(!summary.unflushed);
    assert_eq!(control.run_state(), RunState::Completed);
    assert!(coordinator.navigator().closed.load(Ordering::SeqCst));

    let stored = sqlite_store(&dir).load().unwrap();
    assert_eq!(stored.len(), 20);
    assert_eq!(stored.iter().filter(|r| r.page_number == 1).count(), 10);
    assert_eq!(stored.iter().filter(|r| r.page_number == 2).count(), 10);
    assert!(dir.path().join("records.csv").exists());

    let mut last_progress = None;
    let mut success = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            CrawlEvent::Progress(p) => last_progress = Some(p),
            CrawlEvent::Status(s) => success |= s.severity == Severity::Success,
        }
    }
    let last_progress = last_progress.unwrap();
    assert_eq!(last_progress.percent_complete, 100.0);
    assert_eq!(last_progress.record_count, 20);
    assert!(success);
}

#[tokio::test]
async fn test_rerun_after_completion_collects_nothing() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir);
    store.write_snapshot(&[page_records(1, 10), page_records(2, 10)].concat()).unwrap();

    let navigator = ScriptedNavigator::new(2, 10);
    let pages = navigator.visited_pages();
    let control = Arc::new(ControlChannel::default());
    let mut coordinator = Coordinator::new(settings(), navigator, store, control);

    let summary = coordinator.run(RunRequest::default()).await.unwrap();

    assert_eq!(summary.final_state, RunState::Completed);
    assert_eq!(summary.record_count, 20);
    assert!(pages.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_interrupted_run_resumes_at_incomplete_page() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir);
    store.write_snapshot(&[page_records(1, 10), page_records(2, 4)].concat()).unwrap();

    let checkpoint = analyze(&store.load().unwrap(), 10, &IdentityKey::single("institution"));
    assert_eq!(checkpoint.resume_page, 2);
    assert_eq!(checkpoint.retained_records.len(), 10);

    let navigator = ScriptedNavigator::new(2, 10);
    let pages = navigator.visited_pages();
    let mut coordinator =
        Coordinator::new(settings(), navigator, store, Arc::new(ControlChannel::default()));

    let summary = coordinator.run(RunRequest::default()).await.unwrap();

    assert_eq!(summary.start_page, 2);
    assert_eq!(*pages.lock().unwrap(), vec![2]);

    let stored = sqlite_store(&dir).load().unwrap();
    assert_eq!(stored.len(), 20);
    let ids: HashSet<String> = identities(&stored).into_iter().collect();
    assert_eq!(ids.len(), 20);
}

#[tokio::test]
async fn test_stop_flushes_completed_items() {
    let dir = TempDir::new().unwrap();
    let control = Arc::new(ControlChannel::new(1024));

    let mut navigator = ScriptedNavigator::new(3, 10);
    let items = navigator.visited_items();
    let stopper = Arc::clone(&control);
    navigator.on_item = Some(Box::new(move |item| {
        if item == "p1-i3" {
            stopper.request_stop();
        }
    }));

    let mut coordinator = Coordinator::new(settings(), navigator, sqlite_store(&dir), Arc::clone(&control));
    let summary = coordinator.run(RunRequest::default()).await.unwrap();

    assert_eq!(summary.final_state, RunState::Stopped);
    assert_eq!(control.run_state(), RunState::Stopped);
    assert_eq!(items.lock().unwrap().len(), 3);

    let stored = sqlite_store(&dir).load().unwrap();
    assert_eq!(identities(&stored), vec!["p1-i1", "p1-i2", "p1-i3"]);
}

#[tokio::test]
async fn test_stop_before_start_visits_nothing() {
    let dir = TempDir::new().unwrap();
    let control = Arc::new(ControlChannel::default());
    control.request_stop();

    let navigator = ScriptedNavigator::new(2, 10);
    let pages = navigator.visited_pages();
    let mut coordinator = Coordinator::new(settings(), navigator, sqlite_store(&dir), Arc::clone(&control));

    let summary = coordinator.run(RunRequest::default()).await.unwrap();

    assert_eq!(summary.final_state, RunState::Stopped);
    assert_eq!(summary.pages_attempted, 0);
    assert!(pages.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_pause_holds_items_until_resume() {
    let dir = TempDir::new().unwrap();
    let control = Arc::new(ControlChannel::new(1024));

    let mut navigator = ScriptedNavigator::new(2, 10);
    let items = navigator.visited_items();
    let pauser = Arc::clone(&control);
    navigator.on_item = Some(Box::new(move |item| {
        if item == "p1-i2" {
            pauser.request_pause();
        }
    }));

    let coordinator = Coordinator::new(settings(), navigator, sqlite_store(&dir), Arc::clone(&control));
    let handle = coordinator.spawn(RunRequest::default());

    let mut waited = Duration::ZERO;
    while handle.status() != RunState::Paused {
        assert!(waited < Duration::from_secs(5), "run never paused");
        tokio::time::sleep(Duration::from_millis(5)).await;
        waited += Duration::from_millis(5);
    }

    assert_eq!(items.lock().unwrap().len(), 2);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(items.lock().unwrap().len(), 2);
    assert_eq!(handle.status(), RunState::Paused);

    handle.resume();
    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.final_state, RunState::Completed);
    let visited = items.lock().unwrap().clone();
    assert_eq!(visited.len(), 20);
    assert_eq!(visited[2], "p1-i3");
    let unique: HashSet<&String> = visited.iter().collect();
    assert_eq!(unique.len(), 20);
}

#[tokio::test]
async fn test_write_contention_loses_nothing() {
    let store = Arc::new(ContendedStore::default());
    store.locked_attempts_left.store(4, Ordering::SeqCst);

    let control = Arc::new(ControlChannel::new(1024));
    let mut rx = control.subscribe();
    let mut coordinator = Coordinator::new(
        settings(),
        ScriptedNavigator::new(2, 10),
        Arc::clone(&store),
        Arc::clone(&control),
    );

    let summary = coordinator.run(RunRequest::default()).await.unwrap();

    assert_eq!(summary.final_state, RunState::Completed);
    assert!(!summary.unflushed);
    assert_eq!(*store.successful_writes.lock().unwrap(), vec![20]);

    let stored = store.records.lock().unwrap().clone();
    let ids: HashSet<String> = identities(&stored).into_iter().collect();
    assert_eq!(stored.len(), 20);
    assert_eq!(ids.len(), 20);

    let statuses = drain_status(&mut rx);
    let lock_warnings = statuses
        .iter()
        .filter(|s| s.severity == Severity::Warning && s.message.contains("locked"))
        .count();
    assert_eq!(lock_warnings, 3);
    assert!(statuses
        .iter()
        .any(|s| s.severity == Severity::Error && s.message.contains("Saving")));
    assert_eq!(control.run_state(), RunState::Completed);
}

#[tokio::test]
async fn test_persistent_lock_reports_unflushed() {
    let store = Arc::new(ContendedStore::default());
    store.locked_attempts_left.store(u32::MAX, Ordering::SeqCst);

    let mut coordinator = Coordinator::new(
        settings(),
        ScriptedNavigator::new(1, 10),
        Arc::clone(&store),
        Arc::new(ControlChannel::default()),
    );

    let summary = coordinator.run(RunRequest::default()).await.unwrap();

    assert_eq!(summary.final_state, RunState::Completed);
    assert!(summary.unflushed);
    assert_eq!(coordinator.records().len(), 10);
    assert!(store.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_pages_and_items_are_skipped() {
    let dir = TempDir::new().unwrap();
    let mut navigator = ScriptedNavigator::new(3, 10);
    navigator.unreachable.insert(2);
    navigator.failing_items.insert("p3-i4".to_string());

    let mut coordinator =
        Coordinator::new(settings(), navigator, sqlite_store(&dir), Arc::new(ControlChannel::default()));
    let summary = coordinator.run(RunRequest::default()).await.unwrap();

    assert_eq!(summary.final_state, RunState::Completed);
    assert_eq!(summary.pages_attempted, 3);
    assert_eq!(summary.pages_skipped, 1);
    assert_eq!(summary.items_failed, 1);
    assert_eq!(summary.record_count, 19);

    let stored = sqlite_store(&dir).load().unwrap();
    assert!(stored.iter().all(|r| r.page_number != 2));
    assert!(!identities(&stored).contains(&"p3-i4".to_string()));
}

#[tokio::test]
async fn test_empty_page_is_skipped() {
    let dir = TempDir::new().unwrap();
    let mut navigator = ScriptedNavigator::new(2, 10);
    navigator.pages.insert(1, 0);

    let mut coordinator =
        Coordinator::new(settings(), navigator, sqlite_store(&dir), Arc::new(ControlChannel::default()));
    let summary = coordinator.run(RunRequest::default()).await.unwrap();

    assert_eq!(summary.pages_skipped, 1);
    assert_eq!(summary.record_count, 10);
}

#[tokio::test]
async fn test_records_stamped_with_actual_page() {
    let dir = TempDir::new().unwrap();
    let mut navigator = ScriptedNavigator::new(3, 2);
    navigator.redirects.insert(2, 3);

    let mut coordinator =
        Coordinator::new(settings(), navigator, sqlite_store(&dir), Arc::new(ControlChannel::default()));
    coordinator.run(RunRequest::pages(2, 2)).await.unwrap();

    let stored = sqlite_store(&dir).load().unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|r| r.page_number == 3));
}

#[tokio::test]
async fn test_item_limit_and_explicit_range() {
    let dir = TempDir::new().unwrap();
    let navigator = ScriptedNavigator::new(5, 10);
    let pages = navigator.visited_pages();

    let mut coordinator =
        Coordinator::new(settings(), navigator, sqlite_store(&dir), Arc::new(ControlChannel::default()));
    let request = RunRequest {
        start_page: Some(2),
        end_page: Some(3),
        item_limit_per_page: Some(3),
    };
    let summary = coordinator.run(request).await.unwrap();

    assert_eq!((summary.start_page, summary.end_page), (2, 3));
    assert_eq!(*pages.lock().unwrap(), vec![2, 3]);
    assert_eq!(summary.record_count, 6);
}

#[tokio::test]
async fn test_explicit_start_recollects_held_pages() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir);
    store.write_snapshot(&[page_records(1, 10), page_records(2, 10)].concat()).unwrap();

    let mut coordinator = Coordinator::new(
        settings(),
        ScriptedNavigator::new(2, 10),
        store,
        Arc::new(ControlChannel::default()),
    );
    let summary = coordinator.run(RunRequest::pages(2, 2)).await.unwrap();

    assert_eq!(summary.record_count, 20);
    let stored = sqlite_store(&dir).load().unwrap();
    let ids: HashSet<String> = identities(&stored).into_iter().collect();
    assert_eq!(ids.len(), 20);
}

#[tokio::test]
async fn test_failed_page_in_explicit_range_keeps_held_records() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir);
    store
        .write_snapshot(&[page_records(1, 10), page_records(2, 10), page_records(3, 10)].concat())
        .unwrap();

    let mut navigator = ScriptedNavigator::new(3, 10);
    navigator.unreachable.insert(2);

    let mut coordinator = Coordinator::new(settings(), navigator, store, Arc::new(ControlChannel::default()));
    let summary = coordinator.run(RunRequest::pages(1, 3)).await.unwrap();

    assert_eq!(summary.final_state, RunState::Completed);
    assert_eq!(summary.pages_skipped, 1);
    assert_eq!(summary.record_count, 30);

    let stored = sqlite_store(&dir).load().unwrap();
    assert_eq!(stored.len(), 30);
    assert_eq!(stored.iter().filter(|r| r.page_number == 2).count(), 10);
    let ids: HashSet<String> = identities(&stored).into_iter().collect();
    assert_eq!(ids.len(), 30);

    let checkpoint = analyze(&stored, 10, &IdentityKey::single("institution"));
    assert_eq!(checkpoint.resume_page, 4);
}

#[tokio::test]
async fn test_redirected_page_replaces_records_of_actual_page() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir);
    store
        .write_snapshot(&[page_records(1, 10), page_records(2, 10), page_records(3, 10)].concat())
        .unwrap();

    let mut navigator = ScriptedNavigator::new(3, 10);
    navigator.redirects.insert(2, 3);

    let mut coordinator = Coordinator::new(settings(), navigator, store, Arc::new(ControlChannel::default()));
    let summary = coordinator.run(RunRequest::pages(2, 2)).await.unwrap();

    assert_eq!(summary.record_count, 30);
    let stored = sqlite_store(&dir).load().unwrap();
    assert_eq!(stored.len(), 30);
    assert_eq!(stored.iter().filter(|r| r.page_number == 2).count(), 10);
    assert_eq!(stored.iter().filter(|r| r.page_number == 3).count(), 10);
    let ids: HashSet<String> = identities(&stored).into_iter().collect();
    assert_eq!(ids.len(), 30);
}

#[tokio::test]
async fn test_recollection_without_records_keeps_held_page() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir);
    store.write_snapshot(&[page_records(1, 10), page_records(2, 10)].concat()).unwrap();

    let mut navigator = ScriptedNavigator::new(2, 10);
    navigator.failing_items = (1..=10).map(|i| format!("p2-i{}", i)).collect();

    let mut coordinator = Coordinator::new(settings(), navigator, store, Arc::new(ControlChannel::default()));
    let summary = coordinator.run(RunRequest::pages(2, 2)).await.unwrap();

    assert_eq!(summary.items_failed, 10);
    assert_eq!(summary.record_count, 20);
    let stored = sqlite_store(&dir).load().unwrap();
    assert_eq!(stored.iter().filter(|r| r.page_number == 2).count(), 10);
}

#[tokio::test]
async fn test_stop_during_recollection_keeps_held_page() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir);
    store
        .write_snapshot(&[page_records(1, 10), page_records(2, 10), page_records(3, 10)].concat())
        .unwrap();

    let control = Arc::new(ControlChannel::new(1024));
    let mut rx = control.subscribe();
    let mut navigator = ScriptedNavigator::new(3, 10);
    let stopper = Arc::clone(&control);
    navigator.on_item = Some(Box::new(move |item| {
        if item == "p2-i3" {
            stopper.request_stop();
        }
    }));

    let mut coordinator = Coordinator::new(settings(), navigator, store, Arc::clone(&control));
    let summary = coordinator.run(RunRequest::pages(2, 3)).await.unwrap();

    assert_eq!(summary.final_state, RunState::Stopped);
    assert_eq!(summary.record_count, 30);
    assert!(!summary.unflushed);

    let stored = sqlite_store(&dir).load().unwrap();
    assert_eq!(stored.len(), 30);
    assert_eq!(stored.iter().filter(|r| r.page_number == 2).count(), 10);

    let statuses = drain_status(&mut rx);
    assert!(statuses
        .iter()
        .any(|s| s.severity == Severity::Warning && s.message.contains("keeping its held records")));
}

#[tokio::test]
async fn test_unverifiable_page_reports_warning() {
    let dir = TempDir::new().unwrap();
    let control = Arc::new(ControlChannel::new(1024));
    let mut rx = control.subscribe();

    let mut navigator = ScriptedNavigator::new(1, 2);
    navigator.verify_error = true;

    let mut coordinator = Coordinator::new(settings(), navigator, sqlite_store(&dir), Arc::clone(&control));
    let summary = coordinator.run(RunRequest::default()).await.unwrap();

    assert_eq!(summary.final_state, RunState::Completed);
    let stored = sqlite_store(&dir).load().unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|r| r.page_number == 1));

    let statuses = drain_status(&mut rx);
    assert!(statuses
        .iter()
        .any(|s| s.severity == Severity::Warning && s.message.contains("page indicator missing")));
}

#[tokio::test]
async fn test_panic_while_closing_reports_warning() {
    let dir = TempDir::new().unwrap();
    let control = Arc::new(ControlChannel::new(1024));
    let mut rx = control.subscribe();

    let mut navigator = ScriptedNavigator::new(1, 2);
    navigator.panic_on_close = true;

    let mut coordinator = Coordinator::new(settings(), navigator, sqlite_store(&dir), Arc::clone(&control));
    let summary = coordinator.run(RunRequest::default()).await.unwrap();

    assert_eq!(summary.final_state, RunState::Completed);
    assert_eq!(control.run_state(), RunState::Completed);
    assert_eq!(sqlite_store(&dir).load().unwrap().len(), 2);

    let statuses = drain_status(&mut rx);
    assert!(statuses.iter().any(|s| s.severity == Severity::Warning
        && s.message.contains("closing")
        && s.message.contains("browser already gone")));
}

#[tokio::test]
async fn test_unknown_total_uses_assumed_pages() {
    let dir = TempDir::new().unwrap();
    let mut navigator = ScriptedNavigator::new(2, 10);
    navigator.total_pages = 0;
    let pages = navigator.visited_pages();

    let mut config = settings();
    config.assumed_total_pages = 4;
    let mut coordinator =
        Coordinator::new(config, navigator, sqlite_store(&dir), Arc::new(ControlChannel::default()));
    let summary = coordinator.run(RunRequest::default()).await.unwrap();

    assert_eq!(summary.end_page, 4);
    assert_eq!(*pages.lock().unwrap(), vec![1, 2, 3, 4]);
    assert_eq!(summary.pages_skipped, 2);
    assert_eq!(summary.record_count, 20);
}

#[tokio::test]
async fn test_session_loss_fails_after_emergency_save() {
    let dir = TempDir::new().unwrap();
    let control = Arc::new(ControlChannel::new(1024));
    let mut rx = control.subscribe();

    let mut navigator = ScriptedNavigator::new(2, 10);
    navigator.session_lost_at = Some("p2-i5".to_string());
    let closed = Arc::clone(&navigator.closed);

    let mut coordinator = Coordinator::new(settings(), navigator, sqlite_store(&dir), Arc::clone(&control));
    let result = coordinator.run(RunRequest::default()).await;

    assert!(matches!(
        result,
        Err(HarvestError::Navigator(NavigatorError::Session(_)))
    ));
    assert_eq!(control.run_state(), RunState::Failed);
    assert!(closed.load(Ordering::SeqCst));

    let stored = sqlite_store(&dir).load().unwrap();
    assert_eq!(stored.len(), 14);

    let checkpoint = analyze(&stored, 10, &IdentityKey::single("institution"));
    assert_eq!(checkpoint.resume_page, 2);

    let statuses = drain_status(&mut rx);
    assert!(statuses.iter().any(|s| s.severity == Severity::Error));
}

#[tokio::test]
async fn test_navigator_panic_fails_run() {
    let dir = TempDir::new().unwrap();
    let control = Arc::new(ControlChannel::default());

    let mut navigator = ScriptedNavigator::new(1, 10);
    navigator.panic_at = Some("p1-i3".to_string());

    let mut coordinator = Coordinator::new(settings(), navigator, sqlite_store(&dir), Arc::clone(&control));
    let result = coordinator.run(RunRequest::default()).await;

    assert!(matches!(result, Err(HarvestError::Panic(ref m)) if m.contains("p1-i3")));
    assert_eq!(control.run_state(), RunState::Failed);
    assert_eq!(sqlite_store(&dir).load().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unreadable_store_fails_without_navigating() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("records.db");
    std::fs::write(&db_path, vec![b'x'; 4096]).unwrap();

    let navigator = ScriptedNavigator::new(2, 10);
    let pages = navigator.visited_pages();
    let control = Arc::new(ControlChannel::default());
    let mut coordinator = Coordinator::new(settings(), navigator, sqlite_store(&dir), Arc::clone(&control));

    let result = coordinator.run(RunRequest::default()).await;

    assert!(matches!(
        result,
        Err(HarvestError::Storage(StorageError::Unreadable(_)))
    ));
    assert_eq!(control.run_state(), RunState::Failed);
    assert!(pages.lock().unwrap().is_empty());
    assert_eq!(std::fs::read(Path::new(&db_path)).unwrap(), vec![b'x'; 4096]);
}

#[tokio::test]
async fn test_channel_drives_a_second_run() {
    let dir = TempDir::new().unwrap();
    let control = Arc::new(ControlChannel::default());

    let mut first = ScriptedNavigator::new(2, 10);
    let stopper = Arc::clone(&control);
    first.on_item = Some(Box::new(move |item| {
        if item == "p1-i5" {
            stopper.request_stop();
        }
    }));
    let mut coordinator = Coordinator::new(settings(), first, sqlite_store(&dir), Arc::clone(&control));
    let summary = coordinator.run(RunRequest::default()).await.unwrap();
    assert_eq!(summary.final_state, RunState::Stopped);
    assert_eq!(summary.record_count, 5);

    let mut coordinator = Coordinator::new(
        settings(),
        ScriptedNavigator::new(2, 10),
        sqlite_store(&dir),
        Arc::clone(&control),
    );
    let summary = coordinator.run(RunRequest::default()).await.unwrap();

    assert_eq!(summary.final_state, RunState::Completed);
    assert_eq!(summary.start_page, 1);
    assert_eq!(summary.record_count, 20);
}

#[tokio::test]
async fn test_crawl_replays_fixture_from_config() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("programs.db");
    let config = page_harvest::config::parse_config(&format!(
        r#"
[job]
name = "programs"
identity-fields = ["institution", "university"]
expected-items-per-page = 2

[output]
database-path = "{}"

[pacing]
item-delay-ms = [0, 0]
page-delay-ms = [0, 0]
poll-interval-ms = 5
"#,
        db_path.display().to_string().replace('\\', "/")
    ))
    .unwrap();

    let navigator = page_harvest::FixtureNavigator::from_json(
        r#"{
            "total_pages": 2,
            "pages": [
                { "page": 1, "items": [
                    { "name": "Alpha", "records": [ { "institution": "Alpha", "program": "Law" } ] },
                    { "name": "Beta", "records": [ { "university": "Beta", "program": "Art" } ] }
                ] },
                { "page": 2, "items": [
                    { "name": "Gamma", "fail": true },
                    { "name": "Delta", "records": [ { "institution": "Delta", "program": "Math" } ] }
                ] }
            ]
        }"#,
    )
    .unwrap();

    let summary = page_harvest::crawler::crawl(&config, navigator, RunRequest::default())
        .await
        .unwrap();

    assert_eq!(summary.final_state, RunState::Completed);
    assert_eq!(summary.items_failed, 1);
    assert_eq!(summary.record_count, 3);

    let stored = SqliteRecordStore::new(&db_path).load().unwrap();
    assert_eq!(stored.len(), 3);
    assert!(dir.path().join("programs.csv").exists());

    // Page 2 holds one distinct item of two, so the next run starts there again
    let checkpoint = analyze(&stored, 2, &IdentityKey::new(["institution", "university"]));
    assert_eq!(checkpoint.resume_page, 2);
}
