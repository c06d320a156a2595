//! Task event channel
//!
//! Per-task streaming connections that decode typed task events, fold them
//! into a latest-known state and fan that state out to observers. A mock
//! event source speaks the same contract for local runs and tests.

pub mod config;
pub mod core;
pub mod error;
pub mod services;
pub mod state;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{ChannelConfig, MockSourceConfig, TransportKind, COMPACT_LOG_LIMIT, DEFAULT_LOG_CAPACITY};
pub use self::core::{decode, reduce, ChannelState, DecodeFailure, LogBuffer, ReconnectPolicy};
pub use error::{ChannelError, ChannelResult};
pub use services::{
    build_transport, ConnectionHandle, ConnectionManager, HttpTaskControl, MockEventSource, MockPlan, MockRemote,
    MockStep, MockTransport, Subscription, SubscriptionRegistry, WsTransport,
};
pub use state::{ChannelStats, StatsSnapshot};
pub use traits::{observer_fn, Observer, TaskControl, Transport, TransportConnection};
pub use types::{ChannelUpdate, ObserverId, RawFrame, UpdateCause};
