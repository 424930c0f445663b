//! `WebSocket` handler for the live notification stream.
//!
//! Clients connect to `GET /ws/clocksignal` and receive every
//! [`Notification`] as a JSON text frame. The handler uses a
//! [`broadcast::Receiver`] so all connected clients see the same stream.
//!
//! If a client falls behind, lagged messages are silently skipped and
//! the client resumes from the most recent notification.
//!
//! [`Notification`]: clocksignal_core::relay::Notification
//! [`broadcast::Receiver`]: tokio::sync::broadcast::Receiver

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` connection and begin
/// streaming notifications.
///
/// # Route
///
/// `GET /ws/clocksignal`
pub async fn ws_clocksignal(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Subscribe to the hub and forward each notification as a text frame
/// until either side goes away.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    debug!("WebSocket subscriber connected");

    let mut rx = state.subscribe();

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(notification) => {
                        let json = match serde_json::to_string(&notification) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to serialize notification: {e}");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            debug!("WebSocket subscriber disconnected (send failed)");
                            return;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "WebSocket subscriber lagged, skipping ahead");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Notification hub closed, shutting down WebSocket");
                        return;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket subscriber disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket subscriber disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    // The stream is one-way; client text and binary frames are ignored.
                    _ => {}
                }
            }
        }
    }
}
