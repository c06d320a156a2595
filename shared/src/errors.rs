//! Shared error types for the task event channel

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Serialization failed: {message}")]
    SerializationError { message: String },

    #[error("Deserialization failed: {message}")]
    DeserializationError { message: String },

    #[error("Invalid task id: {input:?}")]
    InvalidTaskId { input: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("Unknown task action: {action}")]
    UnknownAction { action: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
