//! Realtime event vocabulary.
//!
//! Server-to-client events are broadcast through the connection registry;
//! client-to-server events arrive over the WebSocket and are dispatched by
//! the socket handler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use parley_core::types::Sender;

/// Connection lifecycle states reported to session watchers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Events the server pushes to session watchers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A watcher joined or left the session.
    Connection {
        status: ConnectionStatus,
        timestamp: DateTime<Utc>,
    },
    /// Someone in the session is typing. Never echoed to the originator.
    Typing {
        sender: String,
        timestamp: DateTime<Utc>,
    },
    /// A message was appended to the session.
    NewMessage {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        sender: Sender,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ServerEvent {
    pub fn connection(status: ConnectionStatus) -> Self {
        ServerEvent::Connection {
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn typing(sender: impl Into<String>) -> Self {
        ServerEvent::Typing {
            sender: sender.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn message_now(session_id: Uuid, sender: Sender, message: impl Into<String>) -> Self {
        ServerEvent::NewMessage {
            session_id,
            sender,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Events a WebSocket client may send.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Subscribe this connection to a session.
    Join {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// Unsubscribe from the current session.
    Leave,
    /// Typing indicator, fanned out to the other session members.
    Typing { sender: String },
    /// A chat message routed through the full relay flow.
    Send {
        message: String,
        #[serde(rename = "userId")]
        user_id: Option<String>,
    },
}
