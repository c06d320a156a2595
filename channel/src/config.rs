//! Channel configuration
//!
//! Defaults, then environment (`TASK_CHANNEL_*`, `.env` honoured), then CLI
//! flags in the binary. Every layer ends with [`ChannelConfig::validate`].

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use shared::TaskId;
use crate::error::{ChannelError, ChannelResult};

/// Log entries kept for the full log panel
pub const DEFAULT_LOG_CAPACITY: usize = 50;

/// Log entries shown by compact displays
pub const COMPACT_LOG_LIMIT: usize = 20;

/// Placeholder substituted with the task id in endpoint URLs
pub const TASK_ID_PLACEHOLDER: &str = "{task_id}";

/// Which transport implementation backs the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    WebSocket,
    Mock,
}

impl std::str::FromStr for TransportKind {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "websocket" | "ws" => Ok(TransportKind::WebSocket),
            "mock" => Ok(TransportKind::Mock),
            other => Err(ChannelError::config("transport", format!("unknown transport {other:?}"))),
        }
    }
}

/// Settings for the connection manager of every task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelConfig {
    /// Feed endpoint; may contain `{task_id}`
    pub url: String,
    /// Consecutive failed attempts tolerated before the connection fails
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    /// 1.0 keeps the delay fixed
    pub backoff_multiplier: f64,
    pub max_reconnect_delay_ms: u64,
    /// Unbounded handshake when unset
    pub connect_timeout_ms: Option<u64>,
    pub heartbeat_interval_ms: Option<u64>,
    pub log_capacity: usize,
    pub transport: TransportKind,
    pub mock: MockSourceConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8765/ws".to_string(),
            reconnect_attempts: 5,
            reconnect_delay_ms: 3000,
            backoff_multiplier: 1.0,
            max_reconnect_delay_ms: 30_000,
            connect_timeout_ms: None,
            heartbeat_interval_ms: Some(30_000),
            log_capacity: DEFAULT_LOG_CAPACITY,
            transport: TransportKind::WebSocket,
            mock: MockSourceConfig::default(),
        }
    }
}

impl ChannelConfig {
    /// Defaults overlaid with the process environment (and `.env`)
    pub fn from_env() -> ChannelResult<Self> {
        let _ = dotenv::dotenv();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for the `TASK_CHANNEL_*` keys
    pub fn from_vars<F>(lookup: F) -> ChannelResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("TASK_CHANNEL_URL") {
            config.url = url;
        }
        if let Some(value) = lookup("TASK_CHANNEL_RECONNECT_ATTEMPTS") {
            config.reconnect_attempts = parse_var("TASK_CHANNEL_RECONNECT_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("TASK_CHANNEL_RECONNECT_DELAY_MS") {
            config.reconnect_delay_ms = parse_var("TASK_CHANNEL_RECONNECT_DELAY_MS", &value)?;
        }
        if let Some(value) = lookup("TASK_CHANNEL_BACKOFF_MULTIPLIER") {
            config.backoff_multiplier = parse_var("TASK_CHANNEL_BACKOFF_MULTIPLIER", &value)?;
        }
        if let Some(value) = lookup("TASK_CHANNEL_MAX_RECONNECT_DELAY_MS") {
            config.max_reconnect_delay_ms = parse_var("TASK_CHANNEL_MAX_RECONNECT_DELAY_MS", &value)?;
        }
        if let Some(value) = lookup("TASK_CHANNEL_CONNECT_TIMEOUT_MS") {
            config.connect_timeout_ms = Some(parse_var("TASK_CHANNEL_CONNECT_TIMEOUT_MS", &value)?);
        }
        if let Some(value) = lookup("TASK_CHANNEL_HEARTBEAT_MS") {
            let ms: u64 = parse_var("TASK_CHANNEL_HEARTBEAT_MS", &value)?;
            // 0 turns heartbeats off
            config.heartbeat_interval_ms = (ms > 0).then_some(ms);
        }
        if let Some(value) = lookup("TASK_CHANNEL_LOG_CAPACITY") {
            config.log_capacity = parse_var("TASK_CHANNEL_LOG_CAPACITY", &value)?;
        }
        if let Some(value) = lookup("TASK_CHANNEL_TRANSPORT") {
            config.transport = value.parse()?;
        }
        if let Some(value) = lookup("TASK_CHANNEL_MOCK_SEED") {
            config.mock.seed = Some(parse_var("TASK_CHANNEL_MOCK_SEED", &value)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ChannelResult<()> {
        if self.transport == TransportKind::WebSocket {
            let probe = self.url.replace(TASK_ID_PLACEHOLDER, "probe");
            let parsed = Url::parse(&probe)?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(ChannelError::config("url", format!("expected ws:// or wss://, got {}", parsed.scheme())));
            }
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            return Err(ChannelError::config("backoffMultiplier", "must be a finite value >= 1.0"));
        }
        if self.max_reconnect_delay_ms < self.reconnect_delay_ms {
            return Err(ChannelError::config("maxReconnectDelayMs", "must not be below reconnectDelayMs"));
        }
        if self.connect_timeout_ms == Some(0) {
            return Err(ChannelError::config("connectTimeoutMs", "must be positive when set"));
        }
        if self.heartbeat_interval_ms == Some(0) {
            return Err(ChannelError::config("heartbeatIntervalMs", "must be positive when set"));
        }
        if self.log_capacity == 0 {
            return Err(ChannelError::config("logCapacity", "must be positive"));
        }
        self.mock.validate()
    }

    /// Concrete endpoint for a task
    pub fn endpoint_for(&self, task_id: &TaskId) -> String {
        self.url.replace(TASK_ID_PLACEHOLDER, task_id.as_str())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval_ms.map(Duration::from_millis)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> ChannelResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ChannelError::config(key, format!("cannot parse {value:?}")))
}

/// Behaviour of the mock event source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MockSourceConfig {
    pub tick_interval_ms: u64,
    pub log_interval_min_ms: u64,
    pub log_interval_max_ms: u64,
    pub inject_errors: bool,
    /// Chance per log tick of emitting an error event when injection is on
    pub error_probability: f64,
    /// Fixed progress increment; random 0.5–2.5 per tick when unset
    pub progress_step: Option<f64>,
    pub seed: Option<u64>,
    pub total_units: u64,
    pub categories: Vec<String>,
}

impl Default for MockSourceConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            log_interval_min_ms: 2000,
            log_interval_max_ms: 5000,
            inject_errors: false,
            error_probability: 0.1,
            progress_step: None,
            seed: None,
            total_units: 1800,
            categories: ["person", "car", "bicycle", "truck"].iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl MockSourceConfig {
    pub fn validate(&self) -> ChannelResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(ChannelError::config("mock.tickIntervalMs", "must be positive"));
        }
        if self.log_interval_min_ms == 0 || self.log_interval_min_ms > self.log_interval_max_ms {
            return Err(ChannelError::config("mock.logIntervalMinMs", "must be positive and not above logIntervalMaxMs"));
        }
        if !(0.0..=1.0).contains(&self.error_probability) {
            return Err(ChannelError::config("mock.errorProbability", "must be within 0..=1"));
        }
        if let Some(step) = self.progress_step {
            if !(step > 0.0 && step <= 100.0) {
                return Err(ChannelError::config("mock.progressStep", "must be within (0, 100]"));
            }
        }
        if self.total_units == 0 {
            return Err(ChannelError::config("mock.totalUnits", "must be positive"));
        }
        if self.categories.is_empty() {
            return Err(ChannelError::config("mock.categories", "at least one category is required"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
