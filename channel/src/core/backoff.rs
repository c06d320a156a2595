//! Reconnect policy
//!
//! Tracks the remaining-attempts counter and the delay before the next
//! attempt. Delays grow by the configured multiplier up to the cap; a
//! multiplier of 1.0 gives the fixed delay. The counter only refills once a
//! connection has delivered task data, so a peer that accepts and then drops
//! every connection still runs it down.

use std::time::Duration;

use crate::config::ChannelConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    attempts: u32,
    remaining: u32,
    base_delay: Duration,
    next_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(attempts: u32, base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            attempts,
            remaining: attempts,
            base_delay,
            next_delay: base_delay,
            multiplier: multiplier.max(1.0),
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_config(config: &ChannelConfig) -> Self {
        Self::new(
            config.reconnect_attempts,
            config.reconnect_delay(),
            config.backoff_multiplier,
            config.max_reconnect_delay(),
        )
    }

    /// The connection delivered task data: re-seed the counter and the delay
    pub fn on_healthy(&mut self) {
        self.remaining = self.attempts;
        self.next_delay = self.base_delay;
    }

    /// Consume one attempt, returning how long to wait before it; `None` when exhausted
    pub fn next_attempt(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let delay = self.next_delay;
        let grown = self.next_delay.mul_f64(self.multiplier);
        self.next_delay = grown.min(self.max_delay);
        Some(delay)
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Attempts consumed since the last successful connection
    pub fn consumed(&self) -> u32 {
        self.attempts - self.remaining
    }
}
