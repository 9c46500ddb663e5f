//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `RunState`: the orchestrator's state machine (idle, running, paused, ...)
//! - `RunStateCell`: lock-free snapshot cell shared with observers

mod run_state;

// Re-export main types
pub use run_state::{RunState, RunStateCell};
