//! Shared types for the task event channel
//!
//! Contains the wire contract between a task feed (real server or mock) and
//! the client-side channel, plus the identifiers and logging helpers used by
//! every component.

pub mod types;
pub mod errors;
pub mod logging;
pub mod messages;

pub use types::*;
pub use errors::*;

pub use messages::{
    // Feed → channel events
    Event, ProgressSnapshot, LogEntry, LogLevel, TaskSummary, EVENT_TYPES,

    // Channel → feed frames
    ClientFrame,

    // Task control surface
    TaskAction, ControlResponse,
};
