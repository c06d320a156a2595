//! Mock event source
//!
//! Generates the same event shapes as a real task feed. Seeded runs are
//! reproducible: the generator never reads the clock for anything it emits
//! except log and connect timestamps.

use std::collections::HashMap;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use shared::{task_debug, Event, LogEntry, LogLevel, ProgressSnapshot, TaskId, TaskSummary};
use crate::config::MockSourceConfig;

const LOG_MESSAGES: [(LogLevel, &str); 8] = [
    (LogLevel::Info, "Processing frame batch"),
    (LogLevel::Info, "Model inference running"),
    (LogLevel::Info, "Writing intermediate results"),
    (LogLevel::Success, "Batch processed successfully"),
    (LogLevel::Success, "Checkpoint saved"),
    (LogLevel::Warning, "Low confidence detections in batch"),
    (LogLevel::Warning, "Memory usage above 80%"),
    (LogLevel::Error, "Frame decode failed, skipping"),
];

const INJECTED_ERRORS: [&str; 3] = [
    "GPU out of memory",
    "Input stream stalled",
    "Model weights checksum mismatch",
];

const EVENT_BUFFER: usize = 64;

pub struct MockEventSource {
    task_id: TaskId,
    config: MockSourceConfig,
    rng: StdRng,
    progress: f64,
    ticks: u64,
    counts: HashMap<String, u64>,
    peak_memory: f64,
    peak_compute: f64,
    rate_total: f64,
}

impl MockEventSource {
    pub fn new(task_id: TaskId, config: MockSourceConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            task_id,
            config,
            rng,
            progress: 0.0,
            ticks: 0,
            counts: HashMap::new(),
            peak_memory: 0.0,
            peak_compute: 0.0,
            rate_total: 0.0,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.progress >= 100.0
    }

    pub fn connected_event(&self) -> Event {
        Event::connected(self.task_id.clone())
    }

    /// Advance progress by one tick; `None` once progress reached 100
    pub fn next_progress(&mut self) -> Option<Event> {
        if self.is_finished() {
            return None;
        }

        let step = match self.config.progress_step {
            Some(step) => step,
            None => self.rng.gen_range(0.5..2.5),
        };
        self.progress = (self.progress + step).min(100.0);
        self.ticks += 1;

        let total_units = self.config.total_units;
        let current_units = ((self.progress / 100.0) * total_units as f64).round() as u64;
        let rate: f64 = self.rng.gen_range(20.0..30.0);
        self.rate_total += rate;
        let eta_seconds = (total_units - current_units.min(total_units)) as f64 / rate;

        let cpu_usage: f64 = self.rng.gen_range(30.0..70.0);
        let memory_usage: f64 = self.rng.gen_range(40.0..80.0);
        let gpu_usage: f64 = self.rng.gen_range(50.0..90.0);
        self.peak_memory = self.peak_memory.max(memory_usage);
        self.peak_compute = self.peak_compute.max(gpu_usage);

        if let Some(category) = self.config.categories.choose(&mut self.rng) {
            let found = self.rng.gen_range(0..5);
            *self.counts.entry(category.clone()).or_insert(0) += found;
        }

        Some(Event::Progress {
            data: ProgressSnapshot {
                progress: self.progress,
                current_units,
                total_units,
                rate,
                eta_seconds,
                cpu_usage,
                memory_usage,
                gpu_usage,
                counts_by_category: self.counts.clone(),
            },
        })
    }

    /// A log line, or an application error when error injection fires
    pub fn next_log(&mut self) -> Event {
        if self.config.inject_errors && self.rng.gen_bool(self.config.error_probability) {
            let message = INJECTED_ERRORS.choose(&mut self.rng).copied().unwrap_or("Task failed");
            return Event::error(self.task_id.clone(), message);
        }

        let (level, message) = LOG_MESSAGES.choose(&mut self.rng).copied().unwrap_or(LOG_MESSAGES[0]);
        let entry = LogEntry::new(level, message)
            .with_detail("tick", json!(self.ticks))
            .with_detail("progress", json!(self.progress));
        Event::Log { data: entry }
    }

    pub fn next_log_delay(&mut self) -> Duration {
        let ms = self.rng.gen_range(self.config.log_interval_min_ms..=self.config.log_interval_max_ms);
        Duration::from_millis(ms)
    }

    /// Final summary; durations are derived from ticks so seeded runs match
    pub fn complete_event(&self) -> Event {
        let duration_seconds = (self.ticks * self.config.tick_interval_ms) as f64 / 1000.0;
        let average_rate = if self.ticks > 0 { self.rate_total / self.ticks as f64 } else { 0.0 };

        Event::Complete {
            task_id: self.task_id.clone(),
            summary: TaskSummary {
                total_units: self.config.total_units,
                total_detections: self.counts.values().sum(),
                duration_seconds,
                average_rate,
                counts_by_category: self.counts.clone(),
                peak_memory: self.peak_memory,
                peak_compute: self.peak_compute,
            },
        }
    }

    /// Whole lifecycle without timers: connected, one progress and one log per step, complete
    pub fn lifecycle_script(&mut self) -> Vec<Event> {
        let mut events = vec![self.connected_event()];
        while let Some(progress) = self.next_progress() {
            events.push(progress);
            events.push(self.next_log());
        }
        events.push(self.complete_event());
        events
    }

    /// Emit events on independent progress and log timers until complete
    ///
    /// Stops early when the receiver goes away.
    pub async fn run(mut self, tx: mpsc::Sender<Event>) {
        if tx.send(self.connected_event()).await.is_err() {
            return;
        }

        let tick = self.config.tick_interval();
        let mut progress_timer = interval_at(Instant::now() + tick, tick);
        let log_timer = tokio::time::sleep(self.next_log_delay());
        tokio::pin!(log_timer);

        loop {
            tokio::select! {
                _ = progress_timer.tick() => {
                    if let Some(event) = self.next_progress() {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    if self.is_finished() {
                        task_debug!(self.task_id, ticks = self.ticks, "Mock source finished");
                        let _ = tx.send(self.complete_event()).await;
                        return;
                    }
                }
                _ = &mut log_timer => {
                    if tx.send(self.next_log()).await.is_err() {
                        return;
                    }
                    let delay = self.next_log_delay();
                    log_timer.as_mut().reset(Instant::now() + delay);
                }
            }
        }
    }

    /// Run on a background task
    pub fn spawn(self) -> (mpsc::Receiver<Event>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let handle = tokio::spawn(self.run(tx));
        (rx, handle)
    }
}
