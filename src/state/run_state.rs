/// Run state definitions for the crawl orchestrator
///
/// This module defines the states a crawl run moves through and a lock-free
/// cell observers can read at any time.
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Represents the current state of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    // ===== Before Start =====
    /// Orchestrator built but not started
    Idle,

    // ===== Active States =====
    /// Loop is collecting pages
    Running,

    /// Operator paused the run; no new item starts until resumed
    Paused,

    /// Stop observed; finishing the current unit and flushing
    Stopping,

    // ===== Terminal States =====
    /// Operator stop completed after a final flush
    Stopped,

    /// Every page in range was attempted
    Completed,

    /// An unrecoverable fault ended the run after an emergency flush
    Failed,
}

impl RunState {
    /// Returns true if this is a terminal state (the run is over)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Failed)
    }

    /// Returns true if the worker is still inside its loop
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::Stopping)
    }

    /// Returns true if the run ended without a fault
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed)
    }

    /// Checks whether the state machine allows moving to `next`
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Idle, Running) => true,
            (Running, Paused) | (Paused, Running) => true,
            (Running, Stopping) | (Paused, Stopping) => true,
            (Stopping, Stopped) => true,
            (Running, Completed) => true,
            (Running | Paused | Stopping, Failed) => true,
            // A run that fails before the loop starts (e.g. unreadable store)
            (Idle, Failed) => true,
            _ => false,
        }
    }

    /// Short lowercase label used in logs and progress events
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Paused => 2,
            Self::Stopping => 3,
            Self::Stopped => 4,
            Self::Completed => 5,
            Self::Failed => 6,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Paused,
            3 => Self::Stopping,
            4 => Self::Stopped,
            5 => Self::Completed,
            6 => Self::Failed,
            _ => Self::Idle,
        }
    }

    /// Returns all possible run states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Idle,
            Self::Running,
            Self::Paused,
            Self::Stopping,
            Self::Stopped,
            Self::Completed,
            Self::Failed,
        ]
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Lock-free holder for the current run state
///
/// Only the orchestrator writes; any number of observers read snapshots.
#[derive(Debug)]
pub struct RunStateCell {
    value: AtomicU8,
}

impl RunStateCell {
    pub fn new(initial: RunState) -> Self {
        Self {
            value: AtomicU8::new(initial.to_u8()),
        }
    }

    /// Current state snapshot
    pub fn get(&self) -> RunState {
        RunState::from_u8(self.value.load(Ordering::Acquire))
    }

    /// Moves to `next` if the transition is allowed, returning the previous state
    pub fn transition(&self, next: RunState) -> Result<RunState, RunState> {
        let mut current = self.value.load(Ordering::Acquire);
        loop {
            let from = RunState::from_u8(current);
            if from == next {
                return Ok(from);
            }
            if !from.can_transition_to(next) {
                return Err(from);
            }
            match self.value.compare_exchange_weak(
                current,
                next.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(from),
                Err(actual) => current = actual,
            }
        }
    }

    /// Unconditionally sets the state
    pub(crate) fn force(&self, state: RunState) {
        self.value.store(state.to_u8(), Ordering::Release);
    }
}

impl Default for RunStateCell {
    fn default() -> Self {
        Self::new(RunState::Idle)
    }
}
