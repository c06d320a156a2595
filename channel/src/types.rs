//! Type definitions for the channel
//!
//! Data carried between the transport, the connection actor and observers.

use std::fmt;
use std::sync::Arc;

use shared::{ConnectionState, Event, TaskId};
use crate::core::ChannelState;

/// Frame as received from a transport, before decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFrame {
    Text(String),
    Binary(Vec<u8>),
}

impl RawFrame {
    pub fn len(&self) -> usize {
        match self {
            RawFrame::Text(text) => text.len(),
            RawFrame::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for RawFrame {
    fn from(value: &str) -> Self {
        RawFrame::Text(value.to_string())
    }
}

/// Identifier handed out by the registry for each subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// Why an observer is being notified
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateCause {
    /// Last-known state delivered right after subscribing
    CatchUp,
    /// A decoded or synthesized event was folded into the state
    Event(Event),
    /// The connection moved to a new state
    Connection(ConnectionState),
}

/// Notification pushed to every observer of a task
#[derive(Debug, Clone)]
pub struct ChannelUpdate {
    pub task_id: TaskId,
    pub cause: UpdateCause,
    pub state: Arc<ChannelState>,
}

impl ChannelUpdate {
    pub fn event(&self) -> Option<&Event> {
        match &self.cause {
            UpdateCause::Event(event) => Some(event),
            _ => None,
        }
    }
}
