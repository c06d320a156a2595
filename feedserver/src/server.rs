//! Mock task feed server
//!
//! Speaks the task feed contract over WebSocket and answers the task-control
//! API, streaming a seeded mock event source per subscription.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use shared::{
    logging, task_debug, task_info, task_warn, ClientFrame, Component, ControlResponse, Event, TaskAction, TaskId,
};
use task_channel::MockEventSource;
use crate::config::FeedServerConfig;
use crate::error::{FeedServerError, FeedServerResult};
use crate::state::FeedServerState;

#[derive(Clone)]
pub struct FeedServer {
    state: Arc<FeedServerState>,
}

impl FeedServer {
    pub fn new(config: FeedServerConfig) -> Self {
        Self { state: Arc::new(FeedServerState::new(config)) }
    }

    pub fn state(&self) -> &Arc<FeedServerState> {
        &self.state
    }

    pub fn build_router(&self) -> Router {
        Router::new()
            // Task feed
            .route("/ws", get(websocket_handler))

            // Task control
            .route("/tasks/:task_id/:action", post(control_handler))

            // Health check
            .route("/health", get(health_check))

            .layer(
                ServiceBuilder::new()
                    .layer(CorsLayer::permissive())
                    .into_inner(),
            )
            .with_state(self.clone())
    }

    /// Bind the configured address and serve until Ctrl+C
    pub async fn run(&self) -> FeedServerResult<()> {
        let bind = self.state.config.bind;
        let listener = TcpListener::bind(bind).await.map_err(|e| FeedServerError::BindFailed {
            addr: bind.to_string(),
            message: e.to_string(),
        })?;

        tokio::select! {
            result = self.serve(listener) => result,
            _ = tokio::signal::ctrl_c() => {
                logging::log_shutdown(Component::FeedServer, "Received Ctrl+C signal");
                Ok(())
            }
        }
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> FeedServerResult<()> {
        let addr: SocketAddr = listener.local_addr()?;
        logging::log_startup(Component::FeedServer, &format!("task feed on ws://{addr}/ws"));

        axum::serve(listener, self.build_router()).await?;
        Ok(())
    }
}

// HTTP Handlers

async fn health_check(State(server): State<FeedServer>) -> Json<serde_json::Value> {
    let state = &server.state;
    Json(json!({
        "status": "ok",
        "activeStreams": state.active_streams(),
        "streamsServed": state.streams_served(),
        "tasks": state.task_count().await,
        "uptimeSeconds": state.uptime_seconds(),
    }))
}

async fn control_handler(
    State(server): State<FeedServer>,
    Path((task_id, action)): Path<(String, String)>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Some(token) = &server.state.config.api_token {
        let expected = format!("Bearer {token}");
        let provided = headers.get(header::AUTHORIZATION).and_then(|value| value.to_str().ok());
        if provided != Some(expected.as_str()) {
            return (StatusCode::UNAUTHORIZED, Json(ControlResponse::failed("missing or invalid bearer token")));
        }
    }

    let task_id = match TaskId::parse(&task_id) {
        Ok(task_id) => task_id,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(ControlResponse::failed(e.to_string()))),
    };
    let action: TaskAction = match action.parse() {
        Ok(action) => action,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(ControlResponse::failed(e.to_string()))),
    };

    match server.state.apply(&task_id, action).await {
        Ok(message) => {
            task_info!(task_id, action = %action, "Control action applied");
            (StatusCode::OK, Json(ControlResponse::ok(message)))
        }
        Err(reason) => {
            task_warn!(task_id, action = %action, "Control action rejected: {}", reason);
            (StatusCode::CONFLICT, Json(ControlResponse::failed(reason)))
        }
    }
}

async fn websocket_handler(ws: WebSocketUpgrade, State(server): State<FeedServer>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, server))
}

async fn handle_websocket(mut socket: WebSocket, server: FeedServer) {
    let timeout = server.state.config.subscribe_timeout();
    let task_id = match tokio::time::timeout(timeout, wait_for_subscribe(&mut socket)).await {
        Ok(Ok(task_id)) => task_id,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Rejecting feed connection");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
        Err(_) => {
            let e = FeedServerError::SubscribeTimeout { timeout_ms: timeout.as_millis() as u64 };
            tracing::warn!(error = %e, "Rejecting feed connection");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    server.state.stream_opened();
    task_info!(task_id, active = server.state.active_streams(), "Streaming task feed");

    match stream_task(&mut socket, &server.state, &task_id).await {
        Ok(()) => {
            task_debug!(task_id, "Feed stream ended");
        }
        Err(e) => logging::log_error(Component::FeedServer, "Feed stream", &e),
    }
    server.state.stream_closed();
}

async fn wait_for_subscribe(socket: &mut WebSocket) -> FeedServerResult<TaskId> {
    loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => {
                let frame: ClientFrame = serde_json::from_str(&text)
                    .map_err(|e| FeedServerError::InvalidSubscribe { details: e.to_string() })?;
                return Ok(frame.task_id().clone());
            }
            Some(Ok(Message::Binary(_))) => {
                return Err(FeedServerError::InvalidSubscribe { details: "binary frame".to_string() });
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => return Err(FeedServerError::ClientGone),
            Some(Err(e)) => return Err(FeedServerError::websocket(e)),
        }
    }
}

async fn stream_task(socket: &mut WebSocket, state: &FeedServerState, task_id: &TaskId) -> FeedServerResult<()> {
    let mut stops = state.stop_notifications();
    let source = MockEventSource::new(task_id.clone(), state.config.source.clone());
    let (mut events, producer) = source.spawn();

    let result = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if let Err(e) = socket.send(Message::Text(event.to_json()?)).await {
                        break Err(FeedServerError::websocket(e));
                    }
                }
                // Source finished after its complete event
                None => break Ok(()),
            },
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Close(_))) | None => {
                    producer.abort();
                    return Ok(());
                }
                Some(Err(e)) => break Err(FeedServerError::websocket(e)),
                // Pings are answered by axum; repeated subscribes are ignored
                Some(Ok(_)) => {}
            },
            stopped = stops.recv() => match stopped {
                Ok(stopped) if stopped == *task_id => {
                    let notice = Event::disconnected(task_id.clone(), "task stopped");
                    let _ = socket.send(Message::Text(notice.to_json()?)).await;
                    break Ok(());
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break Ok(()),
            },
        }
    };

    producer.abort();
    let _ = socket.send(Message::Close(None)).await;
    result
}
