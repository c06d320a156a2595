//! WebSocket transport
//!
//! tokio-tungstenite client for real task feeds. Heartbeats are WebSocket
//! pings so the JSON contract stays closed.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use shared::{task_debug, ClientFrame, TaskId};
use crate::error::{ChannelError, ChannelResult};
use crate::traits::{Transport, TransportConnection};
use crate::types::RawFrame;

#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, endpoint: &str, task_id: &TaskId) -> ChannelResult<Box<dyn TransportConnection>> {
        let (stream, response) = connect_async(endpoint)
            .await
            .map_err(|e| ChannelError::connect_failed(endpoint, e.to_string()))?;

        task_debug!(task_id, status = response.status().as_u16(), "WebSocket handshake complete");
        Ok(Box::new(WsConnection { stream }))
    }
}

pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl TransportConnection for WsConnection {
    async fn send(&mut self, frame: &ClientFrame) -> ChannelResult<()> {
        let text = serde_json::to_string(frame)?;
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| ChannelError::transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<ChannelResult<RawFrame>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(RawFrame::Text(text))),
                Ok(Message::Binary(bytes)) => return Some(Ok(RawFrame::Binary(bytes))),
                Ok(Message::Close(_)) => return None,
                // Pings are answered by tungstenite itself
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => return None,
                Err(e) => return Some(Err(ChannelError::transport(e.to_string()))),
            }
        }
    }

    async fn heartbeat(&mut self) -> ChannelResult<()> {
        self.stream
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| ChannelError::transport(e.to_string()))
    }

    async fn close(&mut self) -> ChannelResult<()> {
        match self.stream.close(None).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(ChannelError::transport(e.to_string())),
        }
    }
}
