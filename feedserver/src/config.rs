//! Feed server configuration

use std::net::SocketAddr;
use std::time::Duration;

use task_channel::MockSourceConfig;
use crate::error::{FeedServerError, FeedServerResult};

pub const DEFAULT_PORT: u16 = 8765;

#[derive(Debug, Clone)]
pub struct FeedServerConfig {
    pub bind: SocketAddr,
    /// Generator settings for every streamed task
    pub source: MockSourceConfig,
    /// Required bearer token for task control; open when unset
    pub api_token: Option<String>,
    pub subscribe_timeout_ms: u64,
}

impl Default for FeedServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            source: MockSourceConfig::default(),
            api_token: None,
            subscribe_timeout_ms: 10_000,
        }
    }
}

impl FeedServerConfig {
    pub fn validate(&self) -> FeedServerResult<()> {
        self.source
            .validate()
            .map_err(|e| FeedServerError::Config(e.to_string()))?;
        if self.subscribe_timeout_ms == 0 {
            return Err(FeedServerError::Config("subscribe timeout must be positive".to_string()));
        }
        Ok(())
    }

    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_millis(self.subscribe_timeout_ms)
    }
}
