//! Service implementations
//!
//! Connection lifecycle, subscription bookkeeping and the concrete
//! transports and task-control client behind the service traits.

pub mod connection_manager;
pub mod mock_source;
pub mod mock_transport;
pub mod subscription_registry;
pub mod task_control;
pub mod ws_transport;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use crate::config::{ChannelConfig, TransportKind};
use crate::traits::Transport;

// Re-export service implementations
pub use connection_manager::{ConnectionHandle, ConnectionManager};
pub use mock_source::MockEventSource;
pub use mock_transport::{MockPlan, MockRemote, MockStep, MockTransport};
pub use subscription_registry::{Subscription, SubscriptionRegistry};
pub use task_control::HttpTaskControl;
pub use ws_transport::WsTransport;

/// Transport named by the configuration
pub fn build_transport(config: &ChannelConfig) -> Arc<dyn Transport> {
    match config.transport {
        TransportKind::WebSocket => Arc::new(WsTransport::new()),
        TransportKind::Mock => Arc::new(MockTransport::with_source(config.mock.clone())),
    }
}
