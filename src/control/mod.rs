//! Control module: operator signals, run-state snapshots and events
//!
//! # Components
//!
//! - `ControlChannel`: pause/resume/stop flags, run-state snapshot, event fan-out
//! - `CrawlEvent`: progress and status events consumed by front ends

mod channel;
mod events;

pub use channel::{ControlChannel, DEFAULT_EVENT_CAPACITY};
pub use events::{CrawlEvent, ProgressEvent, Severity, StatusEvent};
