//! Operator control signals and event delivery
//!
//! The operator side (a UI thread, a stdin reader, a signal handler) and the
//! crawl worker share only a [`ControlChannel`]. Signals are atomic flags the
//! worker polls at its safe points; events travel through a bounded
//! broadcast channel so a slow consumer never blocks the worker.

use crate::control::events::{CrawlEvent, ProgressEvent, Severity, StatusEvent};
use crate::state::{RunState, RunStateCell};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Default number of events buffered per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Shared control surface between operators and the crawl worker
#[derive(Debug)]
pub struct ControlChannel {
    pause_requested: AtomicBool,
    stop_requested: AtomicBool,
    state: RunStateCell,
    events: broadcast::Sender<CrawlEvent>,
}

impl ControlChannel {
    /// Creates a channel buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            pause_requested: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            state: RunStateCell::default(),
            events,
        }
    }

    // ===== Operator Signals =====

    /// Asks the worker to pause before its next item
    pub fn request_pause(&self) {
        if !self.pause_requested.swap(true, Ordering::AcqRel) {
            tracing::info!("Pause requested");
            self.status(Severity::Warning, "Pause requested");
        }
    }

    /// Lets a paused worker continue with its next unprocessed item
    pub fn request_resume(&self) {
        if self.pause_requested.swap(false, Ordering::AcqRel) {
            tracing::info!("Resume requested");
            self.status(Severity::Info, "Resume requested");
        }
    }

    /// Asks the worker to flush and stop at its next safe point
    pub fn request_stop(&self) {
        if !self.stop_requested.swap(true, Ordering::AcqRel) {
            tracing::info!("Stop requested");
            self.status(Severity::Warning, "Stop requested, saving collected records");
        }
    }

    pub fn is_pause_requested(&self) -> bool {
        self.pause_requested.load(Ordering::Acquire)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Snapshot of the run state
    pub fn run_state(&self) -> RunState {
        self.state.get()
    }

    pub(crate) fn state_cell(&self) -> &RunStateCell {
        &self.state
    }

    /// Clears signals left over from a finished run so the channel can drive another
    pub(crate) fn reset_for_new_run(&self) {
        if self.state.get().is_terminal() {
            self.pause_requested.store(false, Ordering::Release);
            self.stop_requested.store(false, Ordering::Release);
            self.state.force(RunState::Idle);
        }
    }

    // ===== Events =====

    /// Publishes an event to every current subscriber
    pub fn publish(&self, event: CrawlEvent) {
        // No subscribers is fine; events are fire-and-forget
        let _ = self.events.send(event);
    }

    pub fn progress(&self, event: ProgressEvent) {
        self.publish(CrawlEvent::Progress(event));
    }

    /// Publishes a status event; the worker logs it at the matching level
    pub fn status(&self, severity: Severity, message: impl Into<String>) {
        self.publish(CrawlEvent::Status(StatusEvent::new(severity, message)));
    }

    /// Returns a raw receiver of every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.events.subscribe()
    }

    /// Runs `handler` on its own task for every progress event
    ///
    /// Must be called inside a tokio runtime. The task ends once the channel
    /// is dropped.
    pub fn subscribe_progress<F>(&self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(ProgressEvent) + Send + 'static,
    {
        self.spawn_listener(move |event| {
            if let CrawlEvent::Progress(progress) = event {
                handler(progress);
            }
        })
    }

    /// Runs `handler` on its own task for every status event
    pub fn subscribe_status<F>(&self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(StatusEvent) + Send + 'static,
    {
        self.spawn_listener(move |event| {
            if let CrawlEvent::Status(status) = event {
                handler(status);
            }
        })
    }

    fn spawn_listener<F>(&self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(CrawlEvent) + Send + 'static,
    {
        let mut rx = self.events.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => handler(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!("Event subscriber fell behind, {} events dropped", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for ControlChannel {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
