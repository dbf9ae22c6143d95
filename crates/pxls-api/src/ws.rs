//! `WebSocket` handler for live board updates.
//!
//! Clients connect to `GET /ws` and receive a JSON text frame for every
//! [`BoardEvent`]: `{"type":"pixel","x":..,"y":..,"color":..}` for each
//! accepted placement and `{"type":"alert","message":..}` for operator
//! alerts.
//!
//! Each connection is one [`BroadcastHub`](pxls_core::BroadcastHub)
//! subscription. A connection that falls too far behind is dropped by the
//! hub; its stream then ends and the socket is closed.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use pxls_core::BoardEvent;
use tracing::{debug, warn};

use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` connection and begin
/// streaming board events.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_updates(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Handle the `WebSocket` lifecycle: subscribe to the hub and forward
/// each event as a text frame until either side goes away.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    let mut subscription = state.hub().subscribe();
    let id = subscription.id();
    debug!(
        subscriber = %id,
        subscribers = state.hub().subscriber_count(),
        "WebSocket client connected"
    );

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else {
                    debug!(subscriber = %id, "subscription dropped by hub, closing");
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                };
                let Some(msg) = encode(&event) else {
                    continue;
                };
                if socket.send(msg).await.is_err() {
                    debug!(subscriber = %id, "WebSocket client disconnected (send failed)");
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(subscriber = %id, "WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!(subscriber = %id, "WebSocket client disconnected (pong failed)");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(subscriber = %id, "WebSocket error: {e}");
                        break;
                    }
                    _ => {
                        // Clients have nothing to say on this channel.
                    }
                }
            }
        }
    }

    state.hub().unsubscribe(id);
}

fn encode(event: &BoardEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!("Failed to serialize board event: {e}");
            None
        }
    }
}
