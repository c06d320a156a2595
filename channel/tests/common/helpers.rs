//! Harness around a registry backed by the mock transport

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use shared::{ConnectionState, Event, TaskId};
use task_channel::{ChannelConfig, ChannelUpdate, MockPlan, MockTransport, Subscription, SubscriptionRegistry, UpdateCause};

use super::fixtures::TestFixtures;

const WAIT_LIMIT: Duration = Duration::from_secs(300);

pub struct ChannelHarness {
    pub transport: MockTransport,
    pub registry: SubscriptionRegistry,
}

impl ChannelHarness {
    pub fn new() -> Self {
        Self::with_config(TestFixtures::config())
    }

    pub fn with_config(config: ChannelConfig) -> Self {
        let transport = MockTransport::new();
        let registry = SubscriptionRegistry::new(Arc::new(transport.clone()), config);
        Self { transport, registry }
    }

    pub fn plan(&self, plan: MockPlan) -> &Self {
        self.transport.push_plan(plan);
        self
    }

    pub async fn subscribe(&self, task_id: &TaskId) -> (Subscription, mpsc::UnboundedReceiver<ChannelUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.registry.subscribe(task_id.clone(), Arc::new(tx)).await;
        (subscription, rx)
    }
}

pub struct TestHelpers;

impl TestHelpers {
    /// Collect updates until `done` matches one (inclusive)
    pub async fn collect_until<F>(rx: &mut mpsc::UnboundedReceiver<ChannelUpdate>, mut done: F) -> Vec<ChannelUpdate>
    where
        F: FnMut(&ChannelUpdate) -> bool,
    {
        let mut seen = Vec::new();
        loop {
            let update = timeout(WAIT_LIMIT, rx.recv())
                .await
                .expect("timed out waiting for update")
                .expect("observer channel closed");
            let stop = done(&update);
            seen.push(update);
            if stop {
                return seen;
            }
        }
    }

    pub async fn until_connection(
        rx: &mut mpsc::UnboundedReceiver<ChannelUpdate>,
        expected: ConnectionState,
    ) -> Vec<ChannelUpdate> {
        Self::collect_until(rx, |u| u.cause == UpdateCause::Connection(expected)).await
    }

    pub fn progress_values(updates: &[ChannelUpdate]) -> Vec<f64> {
        updates
            .iter()
            .filter_map(|u| match u.event() {
                Some(Event::Progress { data }) => Some(data.progress),
                _ => None,
            })
            .collect()
    }

    pub fn is_progress(update: &ChannelUpdate, value: f64) -> bool {
        matches!(update.event(), Some(Event::Progress { data }) if data.progress == value)
    }

    /// Poll an async condition under (possibly paused) tokio time
    pub async fn eventually<F, Fut>(mut condition: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..500 {
            if condition().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}
