//! Feed → channel events
//!
//! One JSON object per frame, tagged by `type`. The tag set is closed: any
//! other `type` is a decode failure on the receiving side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::types::TaskId;

/// Every tag the channel accepts
pub const EVENT_TYPES: [&str; 6] = ["connected", "progress", "log", "complete", "error", "disconnected"];

/// Latest-known execution metrics for a task; replaced wholesale on every progress event
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    /// Fractional completion, 0–100
    pub progress: f64,
    pub current_units: u64,
    pub total_units: u64,
    /// Units per second
    pub rate: f64,
    pub eta_seconds: f64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub gpu_usage: f64,
    #[serde(default)]
    pub counts_by_category: HashMap<String, u64>,
}

/// Severity of a task log line
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

/// Append-only task log record
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub id: String,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Map<String, serde_json::Value>>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            level,
            message: message.into(),
            timestamp: Utc::now(),
            details: None,
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.get_or_insert_with(serde_json::Map::new).insert(key.into(), value);
        self
    }
}

/// Final statistics reported when a task completes
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub total_units: u64,
    pub total_detections: u64,
    pub duration_seconds: f64,
    pub average_rate: f64,
    #[serde(default)]
    pub counts_by_category: HashMap<String, u64>,
    pub peak_memory: f64,
    pub peak_compute: f64,
}

/// Typed event delivered by a task feed
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Connected {
        #[serde(rename = "taskId")]
        task_id: TaskId,
        timestamp: DateTime<Utc>,
    },
    Progress {
        data: ProgressSnapshot,
    },
    Log {
        data: LogEntry,
    },
    Complete {
        #[serde(rename = "taskId")]
        task_id: TaskId,
        summary: TaskSummary,
    },
    Error {
        #[serde(rename = "taskId")]
        task_id: TaskId,
        error: String,
    },
    Disconnected {
        #[serde(rename = "taskId")]
        task_id: TaskId,
        reason: String,
    },
}

impl Event {
    pub fn connected(task_id: TaskId) -> Self {
        Event::Connected { task_id, timestamp: Utc::now() }
    }

    pub fn error(task_id: TaskId, error: impl Into<String>) -> Self {
        Event::Error { task_id, error: error.into() }
    }

    pub fn disconnected(task_id: TaskId, reason: impl Into<String>) -> Self {
        Event::Disconnected { task_id, reason: reason.into() }
    }

    /// Wire tag of this event
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Connected { .. } => "connected",
            Event::Progress { .. } => "progress",
            Event::Log { .. } => "log",
            Event::Complete { .. } => "complete",
            Event::Error { .. } => "error",
            Event::Disconnected { .. } => "disconnected",
        }
    }

    pub fn to_json(&self) -> crate::SharedResult<String> {
        serde_json::to_string(self).map_err(|e| crate::SharedError::SerializationError {
            message: e.to_string(),
        })
    }
}
