//! Channel-specific error types

use thiserror::Error;
use shared::SharedError;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Connection to {url} failed: {message}")]
    ConnectFailed { url: String, message: String },

    #[error("Connection to {url} timed out after {timeout_ms}ms")]
    ConnectTimeout { url: String, timeout_ms: u64 },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Task control request failed: {action} {task_id}: {message}")]
    TaskControl { action: String, task_id: String, message: String },

    #[error("Shared component error")]
    SharedError(#[from] SharedError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),
}

impl ChannelError {
    pub fn transport(message: impl Into<String>) -> Self {
        ChannelError::Transport { message: message.into() }
    }

    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ChannelError::InvalidConfig { field: field.into(), reason: reason.into() }
    }

    pub fn connect_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        ChannelError::ConnectFailed { url: url.into(), message: message.into() }
    }
}

pub type ChannelResult<T> = Result<T, ChannelError>;
