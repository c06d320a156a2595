//! Frame decoder
//!
//! Turns a raw transport frame into one of the closed set of [`Event`]s.
//! Anything else is a [`DecodeFailure`]; decoding never panics, so one bad
//! frame cannot take the connection down.

use serde_json::Value;
use thiserror::Error;

use shared::{Event, EVENT_TYPES};
use crate::types::RawFrame;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeFailure {
    #[error("frame is not valid UTF-8")]
    NotUtf8,

    #[error("frame is not valid JSON: {0}")]
    Malformed(String),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has no string `type` field")]
    MissingType,

    #[error("unknown event type {0:?}")]
    UnknownType(String),

    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: String, reason: String },

    #[error("progress {0} is outside 0..=100")]
    ProgressOutOfRange(f64),
}

impl DecodeFailure {
    /// Short label for counters and logs
    pub fn reason(&self) -> &'static str {
        match self {
            DecodeFailure::NotUtf8 => "not_utf8",
            DecodeFailure::Malformed(_) => "malformed",
            DecodeFailure::NotAnObject => "not_object",
            DecodeFailure::MissingType => "missing_type",
            DecodeFailure::UnknownType(_) => "unknown_type",
            DecodeFailure::InvalidPayload { .. } => "invalid_payload",
            DecodeFailure::ProgressOutOfRange(_) => "progress_out_of_range",
        }
    }
}

/// Decode a transport frame; binary frames must carry UTF-8 JSON
pub fn decode(frame: &RawFrame) -> Result<Event, DecodeFailure> {
    match frame {
        RawFrame::Text(text) => decode_str(text),
        RawFrame::Binary(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|_| DecodeFailure::NotUtf8)?;
            decode_str(text)
        }
    }
}

pub fn decode_str(text: &str) -> Result<Event, DecodeFailure> {
    let value: Value = serde_json::from_str(text).map_err(|e| DecodeFailure::Malformed(e.to_string()))?;

    let kind = match &value {
        Value::Object(fields) => match fields.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            _ => return Err(DecodeFailure::MissingType),
        },
        _ => return Err(DecodeFailure::NotAnObject),
    };

    if !EVENT_TYPES.contains(&kind.as_str()) {
        return Err(DecodeFailure::UnknownType(kind));
    }

    let event: Event = serde_json::from_value(value).map_err(|e| DecodeFailure::InvalidPayload {
        kind: kind.clone(),
        reason: e.to_string(),
    })?;

    if let Event::Progress { data } = &event {
        if !(0.0..=100.0).contains(&data.progress) {
            return Err(DecodeFailure::ProgressOutOfRange(data.progress));
        }
    }

    Ok(event)
}
