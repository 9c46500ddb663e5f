//! Request pacing and cooperative waiting
//!
//! This module handles:
//! - Randomized delays between items and between pages, bounding the request
//!   rate toward the source
//! - Sleeping in poll-interval slices so a stop request cuts a delay short
//! - Waiting while the operator has the run paused

use crate::config::PacingConfig;
use crate::control::ControlChannel;
use rand::Rng;
use std::time::Duration;

/// Inclusive range a randomized delay is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn from_millis(range: [u64; 2]) -> Self {
        let [a, b] = range;
        Self {
            min: Duration::from_millis(a.min(b)),
            max: Duration::from_millis(a.max(b)),
        }
    }

    /// Draws one delay from the range
    pub fn sample(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if min == max {
            return self.min;
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

/// Pacing policy applied by the coordinator
#[derive(Debug, Clone)]
pub struct Pacer {
    item_delay: DelayRange,
    page_delay: DelayRange,
    poll_interval: Duration,
}

impl Pacer {
    pub fn new(config: &PacingConfig) -> Self {
        Self {
            item_delay: DelayRange::from_millis(config.item_delay_ms),
            page_delay: DelayRange::from_millis(config.page_delay_ms),
            poll_interval: config.poll_interval().max(Duration::from_millis(1)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Waits the inter-item delay; returns false if a stop cut it short
    pub async fn between_items(&self, control: &ControlChannel) -> bool {
        let delay = self.item_delay.sample();
        sleep_unless_stopped(control, delay, self.poll_interval).await
    }

    /// Waits the inter-page delay; returns false if a stop cut it short
    pub async fn between_pages(&self, control: &ControlChannel) -> bool {
        let delay = self.page_delay.sample();
        sleep_unless_stopped(control, delay, self.poll_interval).await
    }

    /// Blocks while a pause is requested; returns true if a stop arrived
    pub async fn wait_while_paused(&self, control: &ControlChannel) -> bool {
        wait_while_paused(control, self.poll_interval).await
    }
}

/// Sleeps for `total` in `poll` slices, returning false as soon as a stop is requested
pub async fn sleep_unless_stopped(control: &ControlChannel, total: Duration, poll: Duration) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        if control.is_stop_requested() {
            return false;
        }
        let slice = remaining.min(poll);
        tokio::time::sleep(slice).await;
        remaining = remaining.saturating_sub(slice);
    }
    !control.is_stop_requested()
}

/// Polls every `poll` while paused; returns true if a stop was requested
pub async fn wait_while_paused(control: &ControlChannel, poll: Duration) -> bool {
    while control.is_pause_requested() && !control.is_stop_requested() {
        tokio::time::sleep(poll).await;
    }
    control.is_stop_requested()
}
