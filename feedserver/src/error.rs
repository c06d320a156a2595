//! Feed server error types

use thiserror::Error;
use shared::SharedError;

#[derive(Error, Debug)]
pub enum FeedServerError {
    #[error("Failed to bind {addr}: {message}")]
    BindFailed { addr: String, message: String },

    #[error("WebSocket error: {message}")]
    WebSocket { message: String },

    #[error("Invalid subscribe frame: {details}")]
    InvalidSubscribe { details: String },

    #[error("No subscribe frame within {timeout_ms}ms")]
    SubscribeTimeout { timeout_ms: u64 },

    #[error("Client went away")]
    ClientGone,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Shared component error")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl FeedServerError {
    pub fn websocket(error: impl std::fmt::Display) -> Self {
        FeedServerError::WebSocket { message: error.to_string() }
    }
}

pub type FeedServerResult<T> = Result<T, FeedServerError>;
