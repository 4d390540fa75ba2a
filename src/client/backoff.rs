//! Reconnect delay schedule

use crate::storage::ClientSettings;
use std::time::Duration;

/// Linear backoff: `base × attempt`, capped, with a bounded attempt count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max_delay: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    /// Create a schedule
    ///
    /// # Arguments
    /// * `base` - Delay before the first retry
    /// * `max_delay` - Ceiling for any single delay
    /// * `max_attempts` - Consecutive retries before giving up
    pub fn new(base: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_delay,
            max_attempts,
            attempt: 0,
        }
    }

    /// Schedule configured for the live-channel client
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(
            Duration::from_millis(settings.reconnect_base_delay_ms),
            Duration::from_millis(settings.reconnect_max_delay_ms),
            settings.max_reconnect_attempts,
        )
    }

    /// Advance to the next attempt and return how long to wait before it
    ///
    /// Returns `None` once `max_attempts` retries have been handed out.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        self.attempt += 1;
        Some(self.delay_for(self.attempt))
    }

    /// Delay for a given 1-based attempt number
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(attempt).min(self.max_delay)
    }

    /// Retries handed out since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// No retries left
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Start over after a successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
