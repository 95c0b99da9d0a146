//! WebSocket streaming endpoint.
//!
//! Each socket is one registry connection: inbound `start`/`stop` requests
//! drive the registry, and everything the registry pushes for the connection
//! is written back out as JSON text frames.

use super::api::AppState;
use crate::protocol::ClientRequest;
use crate::session::{ConnectionId, SessionRegistry};
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Deregisters the connection however the socket task ends, including
/// cancellation during server shutdown.
struct ConnectionGuard {
    id: ConnectionId,
    registry: Arc<SessionRegistry>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.disconnect(self.id);
    }
}

/// GET /ws
pub async fn stream_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.registry, state.shutdown))
}

async fn handle_socket(
    socket: WebSocket,
    registry: Arc<SessionRegistry>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (id, mut outbound_rx) = registry.connect();
    let _guard = ConnectionGuard {
        id,
        registry: registry.clone(),
    };

    loop {
        tokio::select! {
            // The item keeps its backlog slot until the frame is written
            Some(outbound) = outbound_rx.recv() => {
                let text = match outbound.message.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(connection_id = %id, error = %e, "Failed to encode stream message");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }

            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => match ClientRequest::from_json(&text) {
                        Ok(request) => registry.handle_request(id, request),
                        Err(e) => warn!(
                            connection_id = %id,
                            error = %e,
                            "Discarding malformed client message"
                        ),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(connection_id = %id, error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }

            changed = shutdown.changed() => {
                let stopping = changed.is_err() || *shutdown.borrow();
                if !stopping {
                    continue;
                }
                let close_frame = CloseFrame {
                    code: close_code::AWAY,
                    reason: "server shutting down".into(),
                };
                let _ = ws_tx.send(Message::Close(Some(close_frame))).await;
                break;
            }
        }
    }
}
