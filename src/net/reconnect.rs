//! Reconnection policy — bounded exponential backoff.
//!
//! `delay(i) = base * 2^i` for attempt index `i` starting at 0. The counter
//! only moves forward when a retry is actually scheduled and goes back to
//! zero when a connection opens.

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    base_delay: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    #[must_use]
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self { base_delay, max_attempts, attempts: 0 }
    }

    /// Delay for a given attempt index. Saturates instead of overflowing.
    #[must_use]
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let factor = 2_u32.checked_pow(attempt_index).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Claim the next retry slot.
    ///
    /// Returns the delay to wait and bumps the counter, or `None` once the
    /// bound is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let delay = self.delay_for(self.attempts);
        self.attempts += 1;
        Some(delay)
    }

    /// Called on a successful open.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[cfg(test)]
#[path = "reconnect_test.rs"]
mod tests;
