//! Exponential reconnect delay.

use std::time::Duration;

/// Doubles from `initial` up to `cap`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    cap: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, cap: Duration) -> Self {
        Self {
            initial,
            cap: cap.max(initial),
            current: None,
        }
    }

    /// The delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = match self.current {
            None => self.initial,
            Some(prev) => prev.checked_mul(2).unwrap_or(self.cap).min(self.cap),
        };
        self.current = Some(delay);
        delay
    }

    /// Starts over from `initial`.
    pub fn reset(&mut self) {
        self.current = None;
    }
}
