//! Channel → feed frames

use serde::{Deserialize, Serialize};

use crate::types::TaskId;

/// Outbound frames; heartbeats travel as transport-level pings, not JSON
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        #[serde(rename = "taskId")]
        task_id: TaskId,
    },
}

impl ClientFrame {
    pub fn subscribe(task_id: TaskId) -> Self {
        ClientFrame::Subscribe { task_id }
    }

    pub fn task_id(&self) -> &TaskId {
        match self {
            ClientFrame::Subscribe { task_id } => task_id,
        }
    }
}
