use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use crate::client::{self, CommandPublisher, MAX_FRAME_SIZE};
use crate::hub::{ClientId, ClientSession, HubHandle};

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            max_send_queue: 256,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub publisher: Arc<dyn CommandPublisher>,
    pub max_send_queue: usize,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Bind and start serving. Returns a handle that keeps the serve task alive.
pub async fn start(
    config: ServerConfig,
    hub: HubHandle,
    publisher: Arc<dyn CommandPublisher>,
) -> Result<ServerHandle, std::io::Error> {
    let state = AppState {
        hub,
        publisher,
        max_send_queue: config.max_send_queue,
    };

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "chat server listening");

    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server,
    })
}

/// Handle returned by `start()` — keeps the serve task alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}

#[derive(Deserialize)]
struct JoinParams {
    nickname: Option<String>,
}

/// WebSocket upgrade handler. The surrounding web layer resolves the display
/// name; this boundary only receives it as a query parameter.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<JoinParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let nickname = params.nickname.unwrap_or_else(|| "Unknown".to_string());
    ws.max_message_size(MAX_FRAME_SIZE)
        .max_frame_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| accept(socket, nickname, state))
}

/// Accept a live connection as a chat participant: register with the hub
/// (which replays history into the fresh mailbox), then run both pumps
/// until the session ends.
async fn accept(socket: WebSocket, nickname: String, state: AppState) {
    let id = ClientId::new();
    let (tx, rx) = mpsc::channel(state.max_send_queue);

    state
        .hub
        .register(ClientSession {
            id: id.clone(),
            nickname: nickname.clone(),
            mailbox: tx,
        })
        .await;
    tracing::info!(client_id = %id, nickname = %nickname, "participant connected");

    client::handle_connection(
        socket,
        id,
        nickname,
        state.hub.clone(),
        Arc::clone(&state.publisher),
        rx,
    )
    .await;
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let clients = state.hub.count().await;
    axum::Json(serde_json::json!({
        "status": "healthy",
        "clients": clients,
    }))
}
