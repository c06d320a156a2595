//! Feed server state
//!
//! Task statuses for the control surface plus stream bookkeeping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

use shared::{TaskAction, TaskId};
use crate::config::FeedServerConfig;

/// Lifecycle of a task as seen by the control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug)]
pub struct FeedServerState {
    pub config: FeedServerConfig,
    tasks: RwLock<HashMap<TaskId, TaskStatus>>,
    stops: broadcast::Sender<TaskId>,
    active_streams: AtomicU32,
    streams_served: AtomicU64,
    started_at: Instant,
}

impl FeedServerState {
    pub fn new(config: FeedServerConfig) -> Self {
        let (stops, _) = broadcast::channel(64);
        Self {
            config,
            tasks: RwLock::new(HashMap::new()),
            stops,
            active_streams: AtomicU32::new(0),
            streams_served: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Apply a control action; `Err` carries the rejection reason
    pub async fn apply(&self, task_id: &TaskId, action: TaskAction) -> Result<String, String> {
        let mut tasks = self.tasks.write().await;
        let status = tasks.get(task_id).copied().unwrap_or(TaskStatus::Idle);

        match (action, status) {
            (TaskAction::Start, TaskStatus::Running) => Err(format!("task {task_id} is already running")),
            (TaskAction::Start, _) => {
                tasks.insert(task_id.clone(), TaskStatus::Running);
                Ok(format!("task {task_id} started"))
            }
            (TaskAction::Stop, TaskStatus::Running) => {
                tasks.insert(task_id.clone(), TaskStatus::Stopped);
                self.end_streams(task_id);
                Ok(format!("task {task_id} stopped"))
            }
            (TaskAction::Stop, _) => Err(format!("task {task_id} is not running")),
            (TaskAction::Restart, _) => {
                tasks.insert(task_id.clone(), TaskStatus::Running);
                self.end_streams(task_id);
                Ok(format!("task {task_id} restarted"))
            }
        }
    }

    pub async fn status(&self, task_id: &TaskId) -> TaskStatus {
        self.tasks.read().await.get(task_id).copied().unwrap_or(TaskStatus::Idle)
    }

    pub async fn task_count(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Receiver of task ids whose streams must end
    pub fn stop_notifications(&self) -> broadcast::Receiver<TaskId> {
        self.stops.subscribe()
    }

    fn end_streams(&self, task_id: &TaskId) {
        // No receivers just means nobody is streaming this task
        let _ = self.stops.send(task_id.clone());
    }

    pub fn stream_opened(&self) {
        self.active_streams.fetch_add(1, Ordering::Relaxed);
        self.streams_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stream_closed(&self) {
        self.active_streams.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn active_streams(&self) -> u32 {
        self.active_streams.load(Ordering::Relaxed)
    }

    pub fn streams_served(&self) -> u64 {
        self.streams_served.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> FeedServerState {
        FeedServerState::new(FeedServerConfig::default())
    }

    #[tokio::test]
    async fn test_start_then_start_again_is_rejected() {
        let state = state();
        let task = TaskId::from("t1");

        assert!(state.apply(&task, TaskAction::Start).await.is_ok());
        assert_eq!(state.status(&task).await, TaskStatus::Running);
        assert_eq!(
            state.apply(&task, TaskAction::Start).await,
            Err("task t1 is already running".to_string())
        );
    }

    #[tokio::test]
    async fn test_stop_requires_running_task() {
        let state = state();
        let task = TaskId::from("t1");

        assert!(state.apply(&task, TaskAction::Stop).await.is_err());
        state.apply(&task, TaskAction::Start).await.unwrap();
        assert!(state.apply(&task, TaskAction::Stop).await.is_ok());
        assert_eq!(state.status(&task).await, TaskStatus::Stopped);
    }

    #[tokio::test]
    async fn test_stop_and_restart_end_streams() {
        let state = state();
        let task = TaskId::from("t1");
        let mut stops = state.stop_notifications();

        state.apply(&task, TaskAction::Restart).await.unwrap();
        state.apply(&task, TaskAction::Stop).await.unwrap();

        assert_eq!(stops.recv().await.unwrap(), task);
        assert_eq!(stops.recv().await.unwrap(), task);
        assert_eq!(state.task_count().await, 1);
    }

    #[test]
    fn test_stream_counters() {
        let state = state();
        state.stream_opened();
        state.stream_opened();
        state.stream_closed();
        assert_eq!(state.active_streams(), 1);
        assert_eq!(state.streams_served(), 2);
    }
}
