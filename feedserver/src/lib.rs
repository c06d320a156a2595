//! Mock task feed server
//!
//! Serves the task feed contract over WebSocket, backed by the seeded mock
//! event source, plus the REST task-control surface.

pub mod config;
pub mod error;
pub mod server;
pub mod state;

// Re-export main types
pub use config::{FeedServerConfig, DEFAULT_PORT};
pub use error::{FeedServerError, FeedServerResult};
pub use server::FeedServer;
pub use state::{FeedServerState, TaskStatus};
