//! Core channel logic
//!
//! Pure functions and value types with no I/O: frame decoding, the state
//! reducer, the bounded log buffer and the reconnect policy.

pub mod backoff;
pub mod decoder;
pub mod log_buffer;
pub mod reducer;

pub use backoff::ReconnectPolicy;
pub use decoder::{decode, DecodeFailure};
pub use log_buffer::LogBuffer;
pub use reducer::{reduce, ChannelState};
