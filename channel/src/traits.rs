//! Service trait definitions for dependency injection
//!
//! All I/O is reached through these traits so the channel logic can be driven
//! by test doubles.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use shared::{ClientFrame, ControlResponse, TaskAction, TaskId};
use crate::error::ChannelResult;
use crate::types::{ChannelUpdate, RawFrame};

/// Opens streaming connections to a task feed
#[async_trait]
pub trait Transport: Send + Sync {
    /// Complete the transport handshake for `task_id` at `endpoint`
    async fn connect(&self, endpoint: &str, task_id: &TaskId) -> ChannelResult<Box<dyn TransportConnection>>;
}

#[cfg(test)]
impl std::fmt::Debug for dyn TransportConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TransportConnection")
    }
}

/// One established connection
#[async_trait]
pub trait TransportConnection: Send {
    /// Send a JSON frame to the feed
    async fn send(&mut self, frame: &ClientFrame) -> ChannelResult<()>;

    /// Next inbound frame; `None` once the peer has closed the connection
    async fn recv(&mut self) -> Option<ChannelResult<RawFrame>>;

    /// Transport-level keepalive
    async fn heartbeat(&mut self) -> ChannelResult<()>;

    /// Close from our side
    async fn close(&mut self) -> ChannelResult<()>;
}

/// Consumer of channel updates for one task
///
/// Called from the connection actor; implementations must not block.
#[mockall::automock]
pub trait Observer: Send + Sync {
    fn on_update(&self, update: &ChannelUpdate);
}

impl Observer for mpsc::UnboundedSender<ChannelUpdate> {
    fn on_update(&self, update: &ChannelUpdate) {
        // A dropped receiver just means nobody is listening any more
        let _ = self.send(update.clone());
    }
}

/// Observer backed by a closure
pub struct FnObserver<F>(F);

impl<F> Observer for FnObserver<F>
where
    F: Fn(&ChannelUpdate) + Send + Sync,
{
    fn on_update(&self, update: &ChannelUpdate) {
        (self.0)(update)
    }
}

/// Wrap a closure as a shareable observer
pub fn observer_fn<F>(f: F) -> Arc<dyn Observer>
where
    F: Fn(&ChannelUpdate) + Send + Sync + 'static,
{
    Arc::new(FnObserver(f))
}

/// REST task-control surface (start/stop/restart)
#[mockall::automock]
#[async_trait]
pub trait TaskControl: Send + Sync {
    async fn execute(&self, task_id: &TaskId, action: TaskAction) -> ChannelResult<ControlResponse>;
}
