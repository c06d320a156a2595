//! Channel-wide diagnostic counters
//!
//! Shared by every connection actor opened through one manager.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ChannelStats {
    connect_attempts: AtomicU64,
    connections_opened: AtomicU64,
    reconnect_attempts: AtomicU64,
    frames_received: AtomicU64,
    decode_failures: AtomicU64,
    events_delivered: AtomicU64,
    heartbeats_sent: AtomicU64,
    progress_regressions: AtomicU64,
}

/// Point-in-time copy of [`ChannelStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub connect_attempts: u64,
    pub connections_opened: u64,
    pub reconnect_attempts: u64,
    pub frames_received: u64,
    pub decode_failures: u64,
    pub events_delivered: u64,
    pub heartbeats_sent: u64,
    pub progress_regressions: u64,
}

impl ChannelStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) -> u64 {
        self.decode_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_delivery(&self) {
        self.events_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_heartbeat(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_progress_regression(&self) {
        self.progress_regressions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            progress_regressions: self.progress_regressions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let stats = ChannelStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_decode_failure_counter() {
        let stats = ChannelStats::new();
        assert_eq!(stats.record_decode_failure(), 1);
        assert_eq!(stats.record_decode_failure(), 2);
        stats.record_frame();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.decode_failures, 2);
        assert_eq!(snapshot.frames_received, 1);
    }
}
