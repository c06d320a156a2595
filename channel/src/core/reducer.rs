//! State reducer
//!
//! Folds events into the latest-known view of a task. `reduce` is pure: it
//! takes the current state by value and returns the next one.

use chrono::{DateTime, Utc};

use shared::{ConnectionState, Event, ProgressSnapshot, TaskId, TaskSummary};
use crate::core::log_buffer::LogBuffer;

/// Observer-visible state of one task channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelState {
    pub task_id: TaskId,
    pub connection: ConnectionState,
    /// Number of the current connection epoch; 0 before the first connection
    pub epoch: u64,
    pub progress: Option<ProgressSnapshot>,
    pub logs: LogBuffer,
    pub finished: bool,
    pub summary: Option<TaskSummary>,
    pub last_error: Option<String>,
    pub last_disconnect: Option<String>,
    /// The current snapshot went backwards compared to the previous one
    pub progress_regressed: bool,
    pub regressions: u64,
    /// Progress events dropped because the task already completed this epoch
    pub ignored_after_complete: u64,
    pub last_event_at: Option<DateTime<Utc>>,
    completed_epoch: Option<u64>,
}

impl ChannelState {
    pub fn new(task_id: TaskId, log_capacity: usize) -> Self {
        Self {
            task_id,
            connection: ConnectionState::Idle,
            epoch: 0,
            progress: None,
            logs: LogBuffer::new(log_capacity),
            finished: false,
            summary: None,
            last_error: None,
            last_disconnect: None,
            progress_regressed: false,
            regressions: 0,
            ignored_after_complete: 0,
            last_event_at: None,
            completed_epoch: None,
        }
    }

    pub fn with_connection(mut self, connection: ConnectionState) -> Self {
        self.connection = connection;
        self
    }

    /// Start a new connection epoch; last-known values stay visible
    pub fn begin_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self.progress_regressed = false;
        self
    }

    /// Progress of the latest snapshot, if any arrived yet
    pub fn progress_value(&self) -> Option<f64> {
        self.progress.as_ref().map(|p| p.progress)
    }

    /// Whether the task completed during the current epoch
    pub fn completed_this_epoch(&self) -> bool {
        self.completed_epoch == Some(self.epoch)
    }

    /// There is data on screen but the connection behind it is not live
    pub fn is_stale(&self) -> bool {
        !self.connection.is_live() && (self.progress.is_some() || !self.logs.is_empty())
    }
}

/// Fold one event into the state
pub fn reduce(mut state: ChannelState, event: &Event) -> ChannelState {
    state.last_event_at = Some(Utc::now());

    match event {
        Event::Connected { .. } => {}
        Event::Progress { data } => {
            if state.completed_this_epoch() {
                state.ignored_after_complete += 1;
                return state;
            }
            if state.finished {
                // Completed in an earlier epoch and running again
                state.finished = false;
                state.summary = None;
                state.completed_epoch = None;
            }
            let regressed = state.progress_value().is_some_and(|previous| data.progress < previous);
            if regressed {
                state.regressions += 1;
            }
            state.progress_regressed = regressed;
            state.progress = Some(data.clone());
        }
        Event::Log { data } => {
            state.logs.push(data.clone());
        }
        Event::Complete { summary, .. } => {
            state.finished = true;
            state.summary = Some(summary.clone());
            state.completed_epoch = Some(state.epoch);
        }
        Event::Error { error, .. } => {
            state.last_error = Some(error.clone());
        }
        Event::Disconnected { reason, .. } => {
            state.last_disconnect = Some(reason.clone());
        }
    }

    state
}
