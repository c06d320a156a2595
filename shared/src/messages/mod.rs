//! Message types for the task event channel
//!
//! - `events`: frames pushed by a task feed to the channel
//! - `client`: frames the channel sends to the feed
//! - `control`: the REST task-control contract

pub mod events;
pub mod client;
pub mod control;

pub use events::{Event, ProgressSnapshot, LogEntry, LogLevel, TaskSummary, EVENT_TYPES};

pub use client::ClientFrame;

pub use control::{TaskAction, ControlResponse};
