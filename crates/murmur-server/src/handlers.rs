//! Connection handlers for Murmur server.
//!
//! This module handles the HTTP routes and the WebSocket session lifecycle.

use crate::bbs::BbsClient;
use crate::config::Config;
use crate::error::ApiError;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use murmur_core::metrics::record_error;
use murmur_core::{MessageStore, Registry, Relay};
use murmur_protocol::ChatMessage;
use murmur_transport::{websocket, Outbound, TransportError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Live sessions.
    pub registry: Arc<Registry>,
    /// Per-connection relay logic.
    pub relay: Relay,
    /// External message store.
    pub store: Arc<dyn MessageStore>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn MessageStore>) -> Self {
        let registry = Arc::new(Registry::with_config(config.registry_config()));
        let relay = Relay::new(registry.clone(), store.clone(), config.relay_config());

        Self {
            registry,
            relay,
            store,
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let store = BbsClient::new(&config.store).context("Failed to create store client")?;
    let state = Arc::new(AppState::new(config.clone(), Arc::new(store)));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Murmur server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );
    info!("Message store: {}", config.store.base_url);

    serve(listener, state).await
}

/// Serve the application on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server stops with an I/O error.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let app = router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/api/messages", get(messages_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.registry.len(),
    }))
}

/// Message history, read through from the external store.
async fn messages_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let posts = state.store.fetch_posts().await?;
    Ok(Json(posts.into_iter().map(ChatMessage::from).collect()))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.max_message_size(state.config.limits.max_message_size)
        .on_failed_upgrade(move |e: axum::Error| {
            let err = TransportError::Handshake(e.to_string());
            warn!(remote = %remote, error = %err, "WebSocket upgrade failed");
            record_error("handshake");
        })
        .on_upgrade(move |socket| handle_websocket(socket, remote, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, remote: SocketAddr, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (outbound, mut inbound) = websocket::split(socket, state.config.limits.max_message_size);
    let outbound = Arc::new(outbound);

    let session = match state.registry.admit(outbound.clone()) {
        Ok(session) => session,
        Err(e) => {
            warn!(remote = %remote, error = %e, "Rejecting WebSocket connection");
            record_error("capacity");
            let _ = outbound.close().await;
            return;
        }
    };

    debug!(session = %session, remote = %remote, "WebSocket connected");

    // Errors are logged and counted by the relay itself
    let _ = state
        .relay
        .run(session, &mut inbound, outbound.as_ref())
        .await;

    if let Err(e) = outbound.close().await {
        debug!(session = %session, error = %e, "Failed to close WebSocket");
    }

    debug!(session = %session, "WebSocket disconnected");
}
