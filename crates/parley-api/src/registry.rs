//! Connection registry: session-keyed WebSocket fan-out.
//!
//! Maps a session id to the set of live connections watching it. Membership
//! is ephemeral and never persisted; a process restart loses all
//! subscriptions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::events::ServerEvent;

/// A connected WebSocket client.
///
/// Outbound delivery goes through a bounded channel drained by the
/// connection's write task. Sends never block: a full or closed channel
/// drops the message and counts it.
pub struct ClientConnection {
    /// Unique connection id.
    pub id: String,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// Count of messages dropped due to a full or closed channel.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    pub fn new(id: String, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Send a serialized message to the client.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped message counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }
}

/// Session-keyed registry of live connections.
///
/// One registry-wide lock guards the map; expected session cardinality is
/// low and no I/O happens while it is held. Empty member sets are pruned on
/// leave so memory stays bounded by active sessions.
pub struct ConnectionRegistry {
    sessions: Mutex<HashMap<Uuid, Vec<Arc<ClientConnection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Add a connection to a session's member set, creating the set if
    /// absent. Joining a session the connection is already in is a no-op.
    pub fn join(&self, session_id: Uuid, conn: Arc<ClientConnection>) {
        let mut sessions = match self.sessions.lock() {
            Ok(s) => s,
            Err(e) => {
                warn!("Registry lock poisoned on join: {}", e);
                return;
            }
        };
        let members = sessions.entry(session_id).or_default();
        if !members.iter().any(|c| c.id == conn.id) {
            members.push(conn);
        }
    }

    /// Remove a connection from a session's member set. The session entry
    /// is dropped entirely when its set becomes empty.
    pub fn leave(&self, session_id: Uuid, connection_id: &str) {
        let mut sessions = match self.sessions.lock() {
            Ok(s) => s,
            Err(e) => {
                warn!("Registry lock poisoned on leave: {}", e);
                return;
            }
        };
        if let Some(members) = sessions.get_mut(&session_id) {
            members.retain(|c| c.id != connection_id);
            if members.is_empty() {
                sessions.remove(&session_id);
            }
        }
    }

    /// Remove a connection from every session it belongs to.
    ///
    /// Returns the ids of the sessions it was a member of, so the caller
    /// can notify the remaining watchers.
    pub fn disconnect(&self, connection_id: &str) -> Vec<Uuid> {
        let mut sessions = match self.sessions.lock() {
            Ok(s) => s,
            Err(e) => {
                warn!("Registry lock poisoned on disconnect: {}", e);
                return Vec::new();
            }
        };

        let mut former = Vec::new();
        sessions.retain(|session_id, members| {
            let before = members.len();
            members.retain(|c| c.id != connection_id);
            if members.len() != before {
                former.push(*session_id);
            }
            !members.is_empty()
        });
        former
    }

    /// Deliver an event to every member of a session, best effort.
    ///
    /// The event is serialized once. A failed send to one connection never
    /// aborts delivery to the others.
    pub fn broadcast(&self, session_id: Uuid, event: &ServerEvent) {
        self.broadcast_filtered(session_id, event, |_| true);
    }

    /// Deliver an event to every member except the originating connection.
    pub fn broadcast_except(&self, session_id: Uuid, except_id: &str, event: &ServerEvent) {
        self.broadcast_filtered(session_id, event, |c| c.id != except_id);
    }

    fn broadcast_filtered(
        &self,
        session_id: Uuid,
        event: &ServerEvent,
        filter: impl Fn(&ClientConnection) -> bool,
    ) {
        let json = match serde_json::to_string(event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to serialize event");
                return;
            }
        };

        // Clone the member list so the lock is not held while sending.
        let members: Vec<Arc<ClientConnection>> = {
            let sessions = match self.sessions.lock() {
                Ok(s) => s,
                Err(e) => {
                    warn!("Registry lock poisoned on broadcast: {}", e);
                    return;
                }
            };
            sessions.get(&session_id).cloned().unwrap_or_default()
        };

        let mut recipients = 0u32;
        for conn in &members {
            if !filter(conn) {
                continue;
            }
            if conn.send(Arc::clone(&json)) {
                recipients += 1;
            } else {
                warn!(
                    conn_id = %conn.id,
                    session_id = %session_id,
                    total_drops = conn.drop_count(),
                    "Failed to send event to client"
                );
            }
        }
        debug!(session_id = %session_id, recipients, "Broadcast event");
    }

    /// Sessions a connection currently belongs to.
    pub fn sessions_of(&self, connection_id: &str) -> Vec<Uuid> {
        self.sessions
            .lock()
            .map(|sessions| {
                sessions
                    .iter()
                    .filter(|(_, members)| members.iter().any(|c| c.id == connection_id))
                    .map(|(session_id, _)| *session_id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of connections watching a session.
    pub fn member_count(&self, session_id: Uuid) -> usize {
        self.sessions
            .lock()
            .map(|s| s.get(&session_id).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Number of sessions with at least one watcher.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ConnectionStatus;

    fn make_connection(id: &str) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        (Arc::new(ClientConnection::new(id.into(), tx)), rx)
    }

    #[test]
    fn test_join_then_leave_prunes_session() {
        let registry = ConnectionRegistry::new();
        let sid = Uuid::new_v4();
        let (conn, _rx) = make_connection("c1");

        registry.join(sid, conn);
        assert_eq!(registry.member_count(sid), 1);
        assert_eq!(registry.session_count(), 1);

        registry.leave(sid, "c1");
        assert_eq!(registry.member_count(sid), 0);
        // No dangling empty set.
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn test_join_is_idempotent_per_connection() {
        let registry = ConnectionRegistry::new();
        let sid = Uuid::new_v4();
        let (conn, _rx) = make_connection("c1");

        registry.join(sid, Arc::clone(&conn));
        registry.join(sid, conn);
        assert_eq!(registry.member_count(sid), 1);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_members() {
        let registry = ConnectionRegistry::new();
        let sid = Uuid::new_v4();
        let (c1, mut rx1) = make_connection("c1");
        let (c2, mut rx2) = make_connection("c2");

        registry.join(sid, c1);
        registry.join(sid, c2);
        registry.broadcast(sid, &ServerEvent::connection(ConnectionStatus::Connected));

        for rx in [&mut rx1, &mut rx2] {
            let msg = rx.recv().await.unwrap();
            let value: serde_json::Value = serde_json::from_str(&msg).unwrap();
            assert_eq!(value["type"], "connection");
            assert_eq!(value["status"], "connected");
        }
    }

    #[tokio::test]
    async fn test_broadcast_after_leave_reaches_nobody() {
        let registry = ConnectionRegistry::new();
        let sid = Uuid::new_v4();
        let (c1, mut rx1) = make_connection("c1");
        let (c2, mut rx2) = make_connection("c2");

        registry.join(sid, c1);
        registry.join(sid, c2);
        registry.leave(sid, "c1");
        registry.leave(sid, "c2");

        registry.broadcast(sid, &ServerEvent::typing("user"));
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_except_skips_originator() {
        let registry = ConnectionRegistry::new();
        let sid = Uuid::new_v4();
        let (c1, mut rx1) = make_connection("c1");
        let (c2, mut rx2) = make_connection("c2");

        registry.join(sid, c1);
        registry.join(sid, c2);
        registry.broadcast_except(sid, "c1", &ServerEvent::typing("user"));

        assert!(rx1.try_recv().is_err());
        assert!(rx2.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_broadcast_isolates_dead_connections() {
        let registry = ConnectionRegistry::new();
        let sid = Uuid::new_v4();
        let (dead, dead_rx) = make_connection("dead");
        let (live, mut live_rx) = make_connection("live");
        drop(dead_rx);

        registry.join(sid, Arc::clone(&dead));
        registry.join(sid, live);
        registry.broadcast(sid, &ServerEvent::typing("user"));

        // The dead channel counted a drop; the live one still got the event.
        assert_eq!(dead.drop_count(), 1);
        assert!(live_rx.recv().await.is_some());
    }

    #[test]
    fn test_disconnect_removes_from_all_sessions() {
        let registry = ConnectionRegistry::new();
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        let (conn, _rx) = make_connection("c1");
        let (other, _rx2) = make_connection("c2");

        registry.join(s1, Arc::clone(&conn));
        registry.join(s2, Arc::clone(&conn));
        registry.join(s2, other);

        let mut former = registry.disconnect("c1");
        former.sort();
        let mut expected = vec![s1, s2];
        expected.sort();
        assert_eq!(former, expected);

        // s1 is pruned entirely; s2 keeps its other member.
        assert_eq!(registry.session_count(), 1);
        assert_eq!(registry.member_count(s2), 1);
    }

    #[test]
    fn test_disconnect_unknown_connection_is_noop() {
        let registry = ConnectionRegistry::new();
        let sid = Uuid::new_v4();
        let (conn, _rx) = make_connection("c1");
        registry.join(sid, conn);

        assert!(registry.disconnect("ghost").is_empty());
        assert_eq!(registry.member_count(sid), 1);
    }

    #[test]
    fn test_sessions_of_tracks_membership() {
        let registry = ConnectionRegistry::new();
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        let (conn, _rx) = make_connection("c1");

        assert!(registry.sessions_of("c1").is_empty());

        registry.join(s1, Arc::clone(&conn));
        registry.join(s2, conn);
        let mut sessions = registry.sessions_of("c1");
        sessions.sort();
        let mut expected = vec![s1, s2];
        expected.sort();
        assert_eq!(sessions, expected);

        registry.leave(s1, "c1");
        assert_eq!(registry.sessions_of("c1"), vec![s2]);
    }

    #[test]
    fn test_leave_unknown_session_is_noop() {
        let registry = ConnectionRegistry::new();
        registry.leave(Uuid::new_v4(), "c1");
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn test_concurrent_join_leave_broadcast() {
        use std::thread;

        let registry = Arc::new(ConnectionRegistry::new());
        let sid = Uuid::new_v4();
        let mut handles = Vec::new();

        for i in 0..16 {
            let registry = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                let (tx, _rx) = mpsc::channel(8);
                let conn = Arc::new(ClientConnection::new(format!("c{}", i), tx));
                registry.join(sid, conn);
                registry.broadcast(sid, &ServerEvent::typing("user"));
                registry.leave(sid, &format!("c{}", i));
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        // Everyone left; the registry is empty again.
        assert_eq!(registry.session_count(), 0);
    }
}
