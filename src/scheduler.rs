//! Fixed-cadence telemetry polling

use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::debug;

/// Drives the periodic `getData` poll.
///
/// Ticks are laid out on a grid anchored at [`start`](PollScheduler::start),
/// so handler time never shifts later ticks. Ticks missed while the link was
/// busy are skipped, not replayed, and a stopped scheduler never ticks.
pub struct PollScheduler {
    period: Duration,
    interval: Option<Interval>,
    ticks: u64,
}

impl PollScheduler {
    pub fn new(period: Duration) -> Self {
        Self { period, interval: None, ticks: 0 }
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Ticks delivered since construction.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Start (or restart) with the first tick one period from now.
    pub fn start(&mut self) {
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = Some(interval);
        debug!(period = ?self.period, "Poll scheduler started");
    }

    pub fn stop(&mut self) {
        if self.interval.take().is_some() {
            debug!(ticks = self.ticks, "Poll scheduler stopped");
        }
    }

    /// Wait for the next tick. Never completes while stopped.
    pub async fn tick(&mut self) -> u64 {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
                self.ticks += 1;
                self.ticks
            }
            None => std::future::pending().await,
        }
    }
}
