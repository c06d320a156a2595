//! In-process transport
//!
//! Each connect attempt consumes the next scripted [`MockPlan`]; when the
//! queue is empty the fallback plan applies. With a mock source fallback this
//! is the `--mock` mode of the monitor; with the refuse fallback it is a test
//! double whose probes expose what the channel did.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use shared::{ClientFrame, Event, TaskId};
use crate::config::MockSourceConfig;
use crate::error::{ChannelError, ChannelResult};
use crate::services::mock_source::MockEventSource;
use crate::traits::{Transport, TransportConnection};
use crate::types::RawFrame;

/// One scripted action of a mock connection
#[derive(Debug, Clone)]
pub enum MockStep {
    Frame(RawFrame),
    Delay(Duration),
    /// Clean close by the peer
    Close,
    /// Mid-stream transport error
    Fail(String),
}

impl MockStep {
    pub fn event(event: &Event) -> Self {
        match event.to_json() {
            Ok(json) => MockStep::Frame(RawFrame::Text(json)),
            Err(e) => MockStep::Fail(e.to_string()),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        MockStep::Frame(RawFrame::Text(text.into()))
    }
}

/// What the next connect attempt does
pub enum MockPlan {
    Refuse(String),
    /// Handshake never completes
    Hang,
    /// Replay steps, then stay open
    Accept(Vec<MockStep>),
    /// Steps pushed at runtime through a [`MockRemote`]
    Remote(mpsc::UnboundedReceiver<MockStep>),
    /// Stream a live mock event source for the task
    Source(MockSourceConfig),
}

impl MockPlan {
    pub fn remote() -> (MockPlan, MockRemote) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MockPlan::Remote(rx), MockRemote { tx })
    }

    pub fn refuse() -> MockPlan {
        MockPlan::Refuse("connection refused".to_string())
    }
}

/// Server side of a [`MockPlan::Remote`] connection
#[derive(Clone)]
pub struct MockRemote {
    tx: mpsc::UnboundedSender<MockStep>,
}

impl MockRemote {
    /// Returns false once the connection is gone
    pub fn send_event(&self, event: &Event) -> bool {
        self.tx.send(MockStep::event(event)).is_ok()
    }

    pub fn send_raw(&self, frame: RawFrame) -> bool {
        self.tx.send(MockStep::Frame(frame)).is_ok()
    }

    pub fn close(&self) -> bool {
        self.tx.send(MockStep::Close).is_ok()
    }

    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.tx.send(MockStep::Fail(message.into())).is_ok()
    }

    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[derive(Clone)]
enum Fallback {
    Refuse,
    Source(MockSourceConfig),
}

#[derive(Default)]
struct Probes {
    connect_attempts: AtomicUsize,
    live: AtomicUsize,
    heartbeats: AtomicUsize,
    sent: Mutex<Vec<(TaskId, ClientFrame)>>,
}

#[derive(Clone)]
pub struct MockTransport {
    plans: Arc<Mutex<VecDeque<MockPlan>>>,
    fallback: Fallback,
    probes: Arc<Probes>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Scripted transport that refuses once its plans run out
    pub fn new() -> Self {
        Self {
            plans: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Fallback::Refuse,
            probes: Arc::new(Probes::default()),
        }
    }

    /// Every unscripted connection streams a mock event source
    pub fn with_source(config: MockSourceConfig) -> Self {
        Self { fallback: Fallback::Source(config), ..Self::new() }
    }

    pub fn push_plan(&self, plan: MockPlan) -> &Self {
        lock(&self.plans).push_back(plan);
        self
    }

    pub fn connect_attempts(&self) -> usize {
        self.probes.connect_attempts.load(Ordering::SeqCst)
    }

    /// Connections currently open; dropped connections are subtracted
    pub fn live_connections(&self) -> usize {
        self.probes.live.load(Ordering::SeqCst)
    }

    pub fn heartbeats(&self) -> usize {
        self.probes.heartbeats.load(Ordering::SeqCst)
    }

    pub fn sent_frames(&self) -> Vec<(TaskId, ClientFrame)> {
        lock(&self.probes.sent).clone()
    }

    fn next_plan(&self) -> MockPlan {
        if let Some(plan) = lock(&self.plans).pop_front() {
            return plan;
        }
        match &self.fallback {
            Fallback::Refuse => MockPlan::refuse(),
            Fallback::Source(config) => MockPlan::Source(config.clone()),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, endpoint: &str, task_id: &TaskId) -> ChannelResult<Box<dyn TransportConnection>> {
        self.probes.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let feed = match self.next_plan() {
            MockPlan::Refuse(reason) => return Err(ChannelError::connect_failed(endpoint, reason)),
            MockPlan::Hang => std::future::pending().await,
            MockPlan::Accept(steps) => Feed::Script(steps.into()),
            MockPlan::Remote(rx) => Feed::Remote(rx),
            MockPlan::Source(config) => {
                let (rx, handle) = MockEventSource::new(task_id.clone(), config).spawn();
                Feed::Source(rx, handle)
            }
        };

        self.probes.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            task_id: task_id.clone(),
            feed,
            probes: Arc::clone(&self.probes),
        }))
    }
}

enum Feed {
    Script(VecDeque<MockStep>),
    Remote(mpsc::UnboundedReceiver<MockStep>),
    Source(mpsc::Receiver<Event>, JoinHandle<()>),
}

struct MockConnection {
    task_id: TaskId,
    feed: Feed,
    probes: Arc<Probes>,
}

#[async_trait]
impl TransportConnection for MockConnection {
    async fn send(&mut self, frame: &ClientFrame) -> ChannelResult<()> {
        lock(&self.probes.sent).push((self.task_id.clone(), frame.clone()));
        Ok(())
    }

    async fn recv(&mut self) -> Option<ChannelResult<RawFrame>> {
        loop {
            let step = match &mut self.feed {
                Feed::Script(steps) => match steps.pop_front() {
                    Some(step) => step,
                    None => std::future::pending().await,
                },
                // A dropped remote closes the connection
                Feed::Remote(rx) => rx.recv().await.unwrap_or(MockStep::Close),
                Feed::Source(rx, _) => match rx.recv().await {
                    Some(event) => MockStep::event(&event),
                    None => MockStep::Close,
                },
            };

            match step {
                MockStep::Frame(frame) => return Some(Ok(frame)),
                MockStep::Delay(delay) => tokio::time::sleep(delay).await,
                MockStep::Close => return None,
                MockStep::Fail(message) => return Some(Err(ChannelError::transport(message))),
            }
        }
    }

    async fn heartbeat(&mut self) -> ChannelResult<()> {
        self.probes.heartbeats.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> ChannelResult<()> {
        Ok(())
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.probes.live.fetch_sub(1, Ordering::SeqCst);
        if let Feed::Source(_, handle) = &self.feed {
            handle.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_refuses_when_unscripted() {
        let transport = MockTransport::new();
        let result = transport.connect("mock://feed", &TaskId::from("t1")).await;
        assert_matches!(result, Err(ChannelError::ConnectFailed { .. }));
        assert_eq!(transport.connect_attempts(), 1);
        assert_eq!(transport.live_connections(), 0);
    }

    #[tokio::test]
    async fn test_scripted_steps_in_order() {
        let transport = MockTransport::new();
        transport.push_plan(MockPlan::Accept(vec![
            MockStep::text("a"),
            MockStep::Delay(Duration::from_millis(1)),
            MockStep::text("b"),
            MockStep::Close,
        ]));

        let mut connection = transport.connect("mock://feed", &TaskId::from("t1")).await.unwrap();
        assert_eq!(transport.live_connections(), 1);
        assert_matches!(connection.recv().await, Some(Ok(RawFrame::Text(t))) if t == "a");
        assert_matches!(connection.recv().await, Some(Ok(RawFrame::Text(t))) if t == "b");
        assert!(connection.recv().await.is_none());

        drop(connection);
        assert_eq!(transport.live_connections(), 0);
    }

    #[tokio::test]
    async fn test_remote_controls_connection() {
        let transport = MockTransport::new();
        let (plan, remote) = MockPlan::remote();
        transport.push_plan(plan);

        let mut connection = transport.connect("mock://feed", &TaskId::from("t1")).await.unwrap();
        connection.send(&ClientFrame::subscribe(TaskId::from("t1"))).await.unwrap();
        remote.fail("reset by peer");

        assert_matches!(connection.recv().await, Some(Err(ChannelError::Transport { .. })));
        assert_eq!(transport.sent_frames().len(), 1);
    }
}
