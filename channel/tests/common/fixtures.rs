//! Event and configuration fixtures

use shared::{Event, LogEntry, LogLevel, ProgressSnapshot, TaskId, TaskSummary};
use task_channel::{ChannelConfig, MockSourceConfig, MockStep, TransportKind};

pub struct TestFixtures;

impl TestFixtures {
    pub fn task(id: &str) -> TaskId {
        TaskId::from(id)
    }

    /// Mock transport, two retries 100ms apart, no heartbeat
    pub fn config() -> ChannelConfig {
        ChannelConfig {
            transport: TransportKind::Mock,
            reconnect_attempts: 2,
            reconnect_delay_ms: 100,
            max_reconnect_delay_ms: 1000,
            heartbeat_interval_ms: None,
            ..Default::default()
        }
    }

    pub fn mock_source(step: f64, seed: u64) -> MockSourceConfig {
        MockSourceConfig {
            tick_interval_ms: 100,
            log_interval_min_ms: 100,
            log_interval_max_ms: 300,
            progress_step: Some(step),
            seed: Some(seed),
            ..Default::default()
        }
    }

    pub fn progress(value: f64) -> ProgressSnapshot {
        let mut snapshot = ProgressSnapshot {
            progress: value,
            current_units: (value * 18.0) as u64,
            total_units: 1800,
            rate: 25.0,
            eta_seconds: (100.0 - value) * 0.5,
            cpu_usage: 40.0 + value / 2.0,
            memory_usage: 55.0,
            gpu_usage: 80.0,
            ..Default::default()
        };
        snapshot.counts_by_category.insert("car".to_string(), value as u64);
        snapshot
    }

    pub fn progress_event(value: f64) -> Event {
        Event::Progress { data: Self::progress(value) }
    }

    pub fn log_event(n: usize) -> Event {
        Event::Log { data: LogEntry::new(LogLevel::Info, format!("log line {n}")) }
    }

    pub fn complete_event(task_id: &str) -> Event {
        Event::Complete {
            task_id: Self::task(task_id),
            summary: TaskSummary {
                total_units: 1800,
                total_detections: 12,
                duration_seconds: 72.0,
                average_rate: 25.0,
                ..Default::default()
            },
        }
    }

    pub fn steps(events: &[Event]) -> Vec<MockStep> {
        events.iter().map(MockStep::event).collect()
    }
}
