//! Connection handlers for the aircast server.
//!
//! This module handles the connection lifecycle: the WebSocket upgrade,
//! the per-connection event loop, and the global heartbeat and status
//! timers.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use aircast_core::{Outbound, Router as RelayRouter};
use aircast_protocol::codec;
use anyhow::Result;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The message router.
    pub router: RelayRouter,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            router: RelayRouter::new(config.router_config(), config.access_policy()),
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
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    spawn_timers(&state);

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("aircast listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Build the axum application.
fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Spawn the heartbeat sweep and the periodic status broadcast.
fn spawn_timers(state: &Arc<AppState>) {
    let heartbeat = Arc::clone(state);
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(heartbeat.config.heartbeat.interval_ms));
        loop {
            ticker.tick().await;
            let evicted = heartbeat.router.sweep();
            for _ in &evicted {
                metrics::record_eviction();
            }
        }
    });

    let status = Arc::clone(state);
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(status.config.status.interval_ms));
        loop {
            ticker.tick().await;
            status.router.broadcast_status();
            metrics::set_active_listeners(status.router.stats().listener_count);
        }
    });
}

/// Health check handler: a plain-text success body for external probes.
async fn health_handler() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

/// Handle one WebSocket connection from accept to cleanup.
///
/// A single task owns both halves of the socket and selects over inbound
/// messages, the control lane, and the listener frame queue. Every
/// outbound write is awaited before the next is attempted, so at most one
/// frame is in flight per connection.
async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (mut sender, mut receiver) = socket.split();
    let (control_tx, mut control_rx) = mpsc::unbounded_channel();
    let handle = state.router.accept(addr.to_string(), control_tx);
    let frames = handle.frames().clone();

    debug!(connection = %handle.id(), origin = %addr, "WebSocket connected");

    loop {
        tokio::select! {
            biased;

            // Control lane: registration acks, routed messages, probes.
            Some(event) = control_rx.recv() => {
                match event {
                    Outbound::Message(message) => {
                        match codec::encode(&message) {
                            Ok(text) => {
                                metrics::record_message(text.len(), "outbound");
                                if sender.send(Message::Text(text)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                error!(connection = %handle.id(), error = %e, "Failed to encode message");
                            }
                        }
                    }
                    Outbound::Ping => {
                        if sender.send(Message::Ping(Vec::new())).await.is_err() {
                            break;
                        }
                    }
                    Outbound::Close(reason) => {
                        debug!(connection = %handle.id(), reason = reason.as_str(), "Closing connection");
                        let _ = sender
                            .send(Message::Close(Some(CloseFrame {
                                code: reason.code(),
                                reason: reason.as_str().into(),
                            })))
                            .await;
                        break;
                    }
                }
            }

            // Media lane: one queued frame at a time.
            frame = frames.pop() => {
                if sender.send(Message::Binary(frame.to_vec())).await.is_err() {
                    // Delivery failure is not retried; the frame is
                    // abandoned and the liveness path reaps the peer.
                    break;
                }
            }

            // Inbound traffic.
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        metrics::record_message(text.len(), "inbound");
                        match codec::decode(&text) {
                            Ok(message) => state.router.handle_message(&handle, message),
                            Err(e) => {
                                // Malformed: discarded, the connection stays open.
                                debug!(connection = %handle.id(), error = %e, "Discarding malformed message");
                                metrics::record_error("malformed");
                            }
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let outcome = state.router.handle_binary(&handle, Bytes::from(data));
                        metrics::record_relay(outcome.recipients, outcome.dropped);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        state.router.handle_pong(&handle);
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %handle.id(), "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %handle.id(), error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %handle.id(), "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Synchronous registry cleanup plus counterpart notification.
    state.router.disconnect(&handle);

    debug!(connection = %handle.id(), "WebSocket disconnected");
}
