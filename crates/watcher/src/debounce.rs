//! Quiet-period tracking
//!
//! Holds delivery back until no new change has been observed for a full
//! quiet period, so a burst of writes arrives as one batch.

use std::time::{Duration, Instant};

/// Quiet-period timer restarted by every observed change
#[derive(Debug, Clone)]
pub struct QuietPeriod {
    duration: Duration,
    last_change: Option<Instant>,
}

impl QuietPeriod {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            last_change: None,
        }
    }

    /// Restart the timer at `now`
    pub fn record_change(&mut self, now: Instant) {
        self.last_change = Some(now);
    }

    /// Whether a full quiet period has passed since the last change
    pub fn is_settled(&self, now: Instant) -> bool {
        match self.last_change {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.duration,
        }
    }

    /// Time left before the timer settles
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_change {
            None => Duration::ZERO,
            Some(last) => self
                .duration
                .saturating_sub(now.saturating_duration_since(last)),
        }
    }
}
