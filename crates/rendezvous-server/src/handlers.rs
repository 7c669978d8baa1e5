//! Connection handlers for the Rendezvous server.
//!
//! This module handles the connection lifecycle and hands every inbound
//! frame to the relay.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use rendezvous_core::{Outbound, Relay};
use rendezvous_protocol::codec;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Handle to the relay task.
    pub relay: Relay,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state, spawning the relay task.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            relay: Relay::spawn(config.relay_config()),
            config,
        }
    }
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config));
    let websocket_path = state.config.transport.websocket_path.clone();
    let app = app(state);

    let listener = TcpListener::bind(addr).await?;

    info!("Rendezvous relay listening on {}", addr);
    info!("WebSocket endpoint: ws://{}{}", addr, websocket_path);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Registry statistics handler.
async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.relay.stats().await {
        Ok(stats) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({
                "connections": stats.connection_count,
                "identities": stats.identity_count,
                "streams": stats.stream_count,
                "room_scoped": stats.room_scoped_count,
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}

/// Multiple of `max_message_size` at which the transport itself gives up on
/// a message and closes the socket. Anything between the two limits reaches
/// the read loop and is dropped there, leaving the connection usable.
const TRANSPORT_LIMIT_FACTOR: usize = 16;

/// Hard cap handed to the WebSocket layer.
fn transport_message_limit(max_message_size: usize) -> usize {
    max_message_size.saturating_mul(TRANSPORT_LIMIT_FACTOR)
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.max_message_size(transport_message_limit(
        state.config.limits.max_message_size,
    ))
    .on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(mut socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (outbound_tx, mut outbound_rx) =
        mpsc::channel::<Outbound>(state.config.limits.outbound_queue_capacity.max(1));

    let connection_id = match state.relay.register(outbound_tx).await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "Refusing connection");
            metrics::record_error("register");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    // Writer: drains the outbound queue so slow sockets never hold up the relay
    let writer = tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            let text = outbound.to_text();
            metrics::record_message(text.len(), "outbound");
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let max_size = state.config.limits.max_message_size;

    // Frames are dispatched one at a time, so a connection's messages are
    // arbitrated in arrival order.
    while let Some(msg) = receiver.next().await {
        let frame: Arc<str> = match msg {
            Ok(Message::Text(text)) => match codec::check_size(text.len(), max_size) {
                Ok(()) => Arc::from(text),
                Err(e) => {
                    debug!(connection = %connection_id, error = %e, "Dropping frame");
                    continue;
                }
            },
            Ok(Message::Binary(data)) => match codec::decode_text(&data, max_size) {
                Ok(text) => Arc::from(text),
                Err(e) => {
                    debug!(connection = %connection_id, error = %e, "Dropping frame");
                    continue;
                }
            },
            // tungstenite answers pings on its own
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => {
                debug!(connection = %connection_id, "Received close frame");
                break;
            }
            Err(e) => {
                warn!(connection = %connection_id, error = %e, "WebSocket error");
                metrics::record_error("websocket");
                break;
            }
        };

        metrics::record_message(frame.len(), "inbound");
        let start = Instant::now();

        match state.relay.dispatch(connection_id, frame).await {
            Ok(outcome) => metrics::record_outcome(&outcome),
            Err(e) => {
                error!(connection = %connection_id, error = %e, "Relay unavailable");
                metrics::record_error("relay");
                break;
            }
        }

        metrics::record_latency(start.elapsed().as_secs_f64());
    }

    // Cleanup: leave the registry before anything else can route to us
    if let Err(e) = state.relay.unregister(connection_id).await {
        error!(connection = %connection_id, error = %e, "Failed to unregister");
    }
    writer.abort();

    debug!(connection = %connection_id, "WebSocket disconnected");
}
