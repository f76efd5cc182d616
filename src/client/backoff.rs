//! Reconnect Backoff
//!
//! Delay schedule between connection attempts: doubles after every attempt,
//! capped at a maximum, and back to the initial delay once connected.

use std::time::Duration;

// == Backoff ==
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_ms: u64,
    max_ms: u64,
    current_ms: u64,
}

impl Backoff {
    /// Creates a schedule starting at `initial_ms` and never exceeding `max_ms`.
    ///
    /// A zero initial delay is raised to 1ms, and a cap below the initial
    /// delay is raised to it.
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        let initial_ms = initial_ms.max(1);
        Self {
            initial_ms,
            max_ms: max_ms.max(initial_ms),
            current_ms: initial_ms,
        }
    }

    /// Returns the delay before the next attempt and advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_ms;
        self.current_ms = self.current_ms.saturating_mul(2).min(self.max_ms);
        Duration::from_millis(delay)
    }

    /// Starts over from the initial delay.
    pub fn reset(&mut self) {
        self.current_ms = self.initial_ms;
    }
}
