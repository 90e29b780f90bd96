//! Rate pacing
//!
//! Batch targets advance by `batch_size / rate` from the previous target rather than from the
//! time the batch actually went out, so a late tick is caught up and the achieved rate converges
//! to the configured one.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
    /// `None` once the schedule runs past what an `Instant` can represent
    next: Option<Instant>,
}

impl Pacer {
    /// `rate` must be positive; the first batch is due at `first`
    pub fn new(rate: f64, batch_size: u64, first: Instant) -> Self {
        // Vanishingly small rates saturate instead of overflowing
        let interval =
            Duration::try_from_secs_f64(batch_size.max(1) as f64 / rate).unwrap_or(Duration::MAX);
        Self {
            interval,
            next: Some(first),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Target time of the next batch; advances the schedule
    pub fn next_tick(&mut self) -> Option<Instant> {
        let tick = self.next?;
        self.next = tick.checked_add(self.interval);
        Some(tick)
    }
}
