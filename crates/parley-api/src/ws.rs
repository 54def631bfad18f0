//! WebSocket endpoint: join/leave/typing/send over a live connection.
//!
//! Each connection gets a bounded outbound channel drained by a dedicated
//! write task; the read loop parses client events and dispatches them
//! against the registry and the relay. Transport disconnect triggers an
//! implicit leave from every joined session plus a disconnected broadcast
//! to the remaining watchers.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use parley_core::types::Sender;

use crate::events::{ClientEvent, ConnectionStatus, ServerEvent};
use crate::registry::ClientConnection;
use crate::state::AppState;

/// Outbound channel depth per connection. A watcher that falls this far
/// behind starts dropping events rather than blocking broadcasts.
const OUTBOUND_BUFFER: usize = 64;

/// GET /ws/chat - upgrade to a chat WebSocket.
pub async fn ws_chat(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (tx, mut rx) = mpsc::channel::<Arc<String>>(OUTBOUND_BUFFER);
    let conn = Arc::new(ClientConnection::new(Uuid::new_v4().to_string(), tx));
    debug!(conn_id = %conn.id, "WebSocket connected");

    // Write task: drain the outbound channel onto the socket.
    let write_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if ws_tx
                .send(WsMessage::Text((*message).clone().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // Read loop: dispatch client events until the peer goes away.
    while let Some(Ok(message)) = ws_rx.next().await {
        let text = match message {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let event: ClientEvent = match serde_json::from_str(&text) {
            Ok(event) => event,
            Err(e) => {
                debug!(conn_id = %conn.id, error = %e, "Ignoring malformed client event");
                continue;
            }
        };

        if !dispatch_event(event, &conn, &state).await {
            break;
        }
    }

    // Implicit leave for every session this connection was watching, then
    // tell the remaining watchers.
    let former = state.registry.disconnect(&conn.id);
    for session_id in former {
        state.registry.broadcast(
            session_id,
            &ServerEvent::connection(ConnectionStatus::Disconnected),
        );
    }
    write_task.abort();
    debug!(conn_id = %conn.id, "WebSocket disconnected");
}

/// Handle one client event. Returns false to close the connection.
async fn dispatch_event(event: ClientEvent, conn: &Arc<ClientConnection>, state: &AppState) -> bool {
    match event {
        ClientEvent::Join { session_id } => {
            // Session ids are validated here exactly as on the HTTP paths.
            let session_id = match Uuid::parse_str(session_id.trim()) {
                Ok(id) => id,
                Err(_) => {
                    warn!(conn_id = %conn.id, "Join with invalid session id; closing");
                    return false;
                }
            };

            state.registry.join(session_id, Arc::clone(conn));
            state.registry.broadcast(
                session_id,
                &ServerEvent::connection(ConnectionStatus::Connected),
            );
            true
        }
        ClientEvent::Leave => {
            for session_id in state.registry.disconnect(&conn.id) {
                state.registry.broadcast(
                    session_id,
                    &ServerEvent::connection(ConnectionStatus::Disconnected),
                );
            }
            true
        }
        ClientEvent::Typing { sender } => {
            // Typing goes to the other members only.
            for session_id in state.registry.sessions_of(&conn.id) {
                state
                    .registry
                    .broadcast_except(session_id, &conn.id, &ServerEvent::typing(sender.clone()));
            }
            true
        }
        ClientEvent::Send { message, user_id } => {
            let sessions = state.registry.sessions_of(&conn.id);
            let Some(session_id) = sessions.first().copied() else {
                debug!(conn_id = %conn.id, "Send before join ignored");
                return true;
            };

            let sid = session_id.to_string();
            // No registry state is held across this await; if the peer
            // disconnects mid-call the reply still persists and the
            // broadcast below degrades to a counted drop.
            match state
                .relay
                .handle_inbound(Some(&sid), user_id.as_deref(), &message, None)
                .await
            {
                Ok(reply) => {
                    state.registry.broadcast(
                        session_id,
                        &ServerEvent::message_now(session_id, Sender::User, &message),
                    );
                    state.registry.broadcast(
                        session_id,
                        &ServerEvent::message_now(session_id, Sender::Bot, &reply.response),
                    );
                }
                Err(e) => {
                    warn!(conn_id = %conn.id, session_id = %session_id, error = %e, "Send failed");
                }
            }
            true
        }
    }
}
