//! Feed server spun up on an ephemeral port plus channel-side helpers

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use feedserver::{FeedServer, FeedServerConfig};
use shared::{Event, TaskId};
use task_channel::{
    ChannelConfig, ChannelUpdate, MockSourceConfig, Subscription, SubscriptionRegistry, TransportKind, UpdateCause,
    WsTransport,
};

const WAIT_LIMIT: Duration = Duration::from_secs(10);

pub struct TestServer {
    pub addr: SocketAddr,
    pub server: FeedServer,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(source: MockSourceConfig) -> Self {
        Self::start_with(FeedServerConfig { source, subscribe_timeout_ms: 500, ..Default::default() }).await
    }

    pub async fn start_with(config: FeedServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = FeedServer::new(config);
        let serving = server.clone();
        let handle = tokio::spawn(async move {
            let _ = serving.serve(listener).await;
        });
        Self { addr, server, handle }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn http_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Registry talking WebSocket to this server
    pub fn registry(&self) -> SubscriptionRegistry {
        let config = ChannelConfig {
            url: self.ws_url(),
            transport: TransportKind::WebSocket,
            reconnect_attempts: 3,
            reconnect_delay_ms: 50,
            max_reconnect_delay_ms: 200,
            connect_timeout_ms: Some(2000),
            heartbeat_interval_ms: None,
            ..Default::default()
        };
        SubscriptionRegistry::new(Arc::new(WsTransport::new()), config)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct TestHelpers;

impl TestHelpers {
    /// Fast, fixed-step source
    pub fn source(step: f64, tick_ms: u64) -> MockSourceConfig {
        MockSourceConfig {
            tick_interval_ms: tick_ms,
            log_interval_min_ms: 5,
            log_interval_max_ms: 15,
            progress_step: Some(step),
            seed: Some(11),
            ..Default::default()
        }
    }

    pub async fn subscribe(
        registry: &SubscriptionRegistry,
        task_id: &str,
    ) -> (Subscription, mpsc::UnboundedReceiver<ChannelUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = registry.subscribe(TaskId::from(task_id), Arc::new(tx)).await;
        (subscription, rx)
    }

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

    pub fn progress_values(updates: &[ChannelUpdate]) -> Vec<f64> {
        updates
            .iter()
            .filter_map(|u| match u.event() {
                Some(Event::Progress { data }) => Some(data.progress),
                _ => None,
            })
            .collect()
    }

    pub fn is_connection(update: &ChannelUpdate, expected: shared::ConnectionState) -> bool {
        update.cause == UpdateCause::Connection(expected)
    }

    pub async fn eventually<F, Fut>(mut condition: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if condition().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}
