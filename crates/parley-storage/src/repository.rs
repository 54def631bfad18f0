//! Repository implementations for SQLite-backed persistence.
//!
//! Provides SessionRepository, IdentityRepository, and MessageRepository
//! that operate on the Database struct using raw SQL.
//!
//! Fetch-or-create operations are race-tolerant: `INSERT OR IGNORE` against
//! the unique key, then re-fetch. Two callers racing to create the same
//! session or the same email end up with exactly one durable row.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{OptionalExtension, Row};
use uuid::Uuid;

use parley_core::error::ParleyError;
use parley_core::types::{Identity, Message, Sender, Session};

use crate::db::Database;

/// Repository for conversation sessions.
pub struct SessionRepository {
    db: Arc<Database>,
}

impl SessionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Fetch the session, creating it if absent.
    ///
    /// A concurrent create for the same id is not an error; the existing
    /// row wins and is returned.
    pub fn get_or_create(&self, session_id: Uuid, user_id: &str) -> Result<Session, ParleyError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO chat_sessions (session_id, user_id, started_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    session_id.to_string(),
                    user_id,
                    Utc::now().timestamp_millis(),
                ],
            )
            .map_err(|e| ParleyError::Storage(format!("Failed to create session: {}", e)))?;

            let session = conn
                .query_row(
                    "SELECT session_id, user_id, identity_id, started_at, ended_at
                     FROM chat_sessions WHERE session_id = ?1",
                    rusqlite::params![session_id.to_string()],
                    |row| Ok(row_to_session(row)),
                )
                .map_err(|e| ParleyError::Storage(e.to_string()))?;
            session
        })
    }

    /// Find a session by id.
    pub fn find(&self, session_id: Uuid) -> Result<Option<Session>, ParleyError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    "SELECT session_id, user_id, identity_id, started_at, ended_at
                     FROM chat_sessions WHERE session_id = ?1",
                    rusqlite::params![session_id.to_string()],
                    |row| Ok(row_to_session(row)),
                )
                .optional()
                .map_err(|e| ParleyError::Storage(e.to_string()))?;

            match result {
                Some(session) => Ok(Some(session?)),
                None => Ok(None),
            }
        })
    }

    /// All sessions belonging to a user, most recently started first.
    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<Session>, ParleyError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT session_id, user_id, identity_id, started_at, ended_at
                     FROM chat_sessions
                     WHERE user_id = ?1
                     ORDER BY started_at DESC",
                )
                .map_err(|e| ParleyError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![user_id], |row| Ok(row_to_session(row)))
                .map_err(|e| ParleyError::Storage(e.to_string()))?;

            let mut sessions = Vec::new();
            for row in rows {
                let session = row.map_err(|e| ParleyError::Storage(e.to_string()))??;
                sessions.push(session);
            }
            Ok(sessions)
        })
    }

    /// Link an identity to a session.
    ///
    /// The transition is one-way and idempotent: linking an already-linked
    /// session is a no-op.
    pub fn link_identity(
        &self,
        session_id: Uuid,
        identity_id: Uuid,
    ) -> Result<(), ParleyError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE chat_sessions SET identity_id = ?1
                 WHERE session_id = ?2 AND identity_id IS NULL",
                rusqlite::params![identity_id.to_string(), session_id.to_string()],
            )
            .map_err(|e| ParleyError::Storage(format!("Failed to link identity: {}", e)))?;
            Ok(())
        })
    }

    /// Set the session's end timestamp.
    ///
    /// Returns false if the session does not exist. Re-ending an already
    /// ended session refreshes the timestamp; ended_at is never cleared.
    pub fn end(&self, session_id: Uuid) -> Result<bool, ParleyError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE chat_sessions SET ended_at = ?1 WHERE session_id = ?2",
                    rusqlite::params![Utc::now().timestamp_millis(), session_id.to_string()],
                )
                .map_err(|e| ParleyError::Storage(format!("Failed to end session: {}", e)))?;
            Ok(changed > 0)
        })
    }
}

/// Repository for captured end-user identities.
pub struct IdentityRepository {
    db: Arc<Database>,
}

impl IdentityRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Fetch the identity for this email, creating it if absent.
    ///
    /// The email column is UNIQUE; a losing racer re-fetches the winner's
    /// row, so at most one identity ever exists per email. When the row
    /// already exists, its original name and country are kept.
    pub fn get_or_create(
        &self,
        name: &str,
        email: &str,
        country: &str,
    ) -> Result<Identity, ParleyError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO user_identities (id, name, email, country, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    name,
                    email,
                    country,
                    Utc::now().timestamp_millis(),
                ],
            )
            .map_err(|e| ParleyError::Storage(format!("Failed to create identity: {}", e)))?;

            let identity = conn
                .query_row(
                    "SELECT id, name, email, country, created_at
                     FROM user_identities WHERE email = ?1",
                    rusqlite::params![email],
                    |row| Ok(row_to_identity(row)),
                )
                .map_err(|e| ParleyError::Storage(e.to_string()))?;
            identity
        })
    }

    /// Find an identity by email.
    pub fn find_by_email(&self, email: &str) -> Result<Option<Identity>, ParleyError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    "SELECT id, name, email, country, created_at
                     FROM user_identities WHERE email = ?1",
                    rusqlite::params![email],
                    |row| Ok(row_to_identity(row)),
                )
                .optional()
                .map_err(|e| ParleyError::Storage(e.to_string()))?;

            match result {
                Some(identity) => Ok(Some(identity?)),
                None => Ok(None),
            }
        })
    }
}

/// Repository for the append-only message log.
pub struct MessageRepository {
    db: Arc<Database>,
}

impl MessageRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append a message to a session's log.
    pub fn append(
        &self,
        session_id: Uuid,
        sender: Sender,
        message: &str,
        additional_data: Option<&serde_json::Value>,
    ) -> Result<Message, ParleyError> {
        let record = Message {
            message_id: Uuid::new_v4(),
            session_id,
            sender,
            message: message.to_string(),
            timestamp: Utc::now(),
            additional_data: additional_data.cloned(),
        };

        let extra_json = match &record.additional_data {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chat_messages
                 (message_id, session_id, sender, message, timestamp, additional_data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    record.message_id.to_string(),
                    record.session_id.to_string(),
                    record.sender.as_str(),
                    record.message,
                    record.timestamp.timestamp_millis(),
                    extra_json,
                ],
            )
            .map_err(|e| ParleyError::Storage(format!("Failed to append message: {}", e)))?;
            Ok(())
        })?;

        Ok(record)
    }

    /// All messages in a session, oldest first.
    ///
    /// rowid breaks ties for messages persisted in the same millisecond,
    /// preserving insertion order.
    pub fn list_for_session(&self, session_id: Uuid) -> Result<Vec<Message>, ParleyError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT message_id, session_id, sender, message, timestamp, additional_data
                     FROM chat_messages
                     WHERE session_id = ?1
                     ORDER BY timestamp ASC, rowid ASC",
                )
                .map_err(|e| ParleyError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![session_id.to_string()], |row| {
                    Ok(row_to_message(row))
                })
                .map_err(|e| ParleyError::Storage(e.to_string()))?;

            let mut messages = Vec::new();
            for row in rows {
                let message = row.map_err(|e| ParleyError::Storage(e.to_string()))??;
                messages.push(message);
            }
            Ok(messages)
        })
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn parse_uuid(value: String) -> Result<Uuid, ParleyError> {
    Uuid::parse_str(&value)
        .map_err(|e| ParleyError::Storage(format!("Invalid UUID in database: {}", e)))
}

fn parse_timestamp(millis: i64) -> Result<DateTime<Utc>, ParleyError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| ParleyError::Storage(format!("Invalid timestamp in database: {}", millis)))
}

fn row_to_session(row: &Row<'_>) -> Result<Session, ParleyError> {
    let session_id: String = row
        .get(0)
        .map_err(|e| ParleyError::Storage(e.to_string()))?;
    let user_id: String = row
        .get(1)
        .map_err(|e| ParleyError::Storage(e.to_string()))?;
    let identity_id: Option<String> = row
        .get(2)
        .map_err(|e| ParleyError::Storage(e.to_string()))?;
    let started_at: i64 = row
        .get(3)
        .map_err(|e| ParleyError::Storage(e.to_string()))?;
    let ended_at: Option<i64> = row
        .get(4)
        .map_err(|e| ParleyError::Storage(e.to_string()))?;

    Ok(Session {
        session_id: parse_uuid(session_id)?,
        user_id,
        identity_id: identity_id.map(parse_uuid).transpose()?,
        started_at: parse_timestamp(started_at)?,
        ended_at: ended_at.map(parse_timestamp).transpose()?,
    })
}

fn row_to_identity(row: &Row<'_>) -> Result<Identity, ParleyError> {
    let id: String = row
        .get(0)
        .map_err(|e| ParleyError::Storage(e.to_string()))?;
    let name: String = row
        .get(1)
        .map_err(|e| ParleyError::Storage(e.to_string()))?;
    let email: String = row
        .get(2)
        .map_err(|e| ParleyError::Storage(e.to_string()))?;
    let country: String = row
        .get(3)
        .map_err(|e| ParleyError::Storage(e.to_string()))?;
    let created_at: i64 = row
        .get(4)
        .map_err(|e| ParleyError::Storage(e.to_string()))?;

    Ok(Identity {
        id: parse_uuid(id)?,
        name,
        email,
        country,
        created_at: parse_timestamp(created_at)?,
    })
}

fn row_to_message(row: &Row<'_>) -> Result<Message, ParleyError> {
    let message_id: String = row
        .get(0)
        .map_err(|e| ParleyError::Storage(e.to_string()))?;
    let session_id: String = row
        .get(1)
        .map_err(|e| ParleyError::Storage(e.to_string()))?;
    let sender: String = row
        .get(2)
        .map_err(|e| ParleyError::Storage(e.to_string()))?;
    let message: String = row
        .get(3)
        .map_err(|e| ParleyError::Storage(e.to_string()))?;
    let timestamp: i64 = row
        .get(4)
        .map_err(|e| ParleyError::Storage(e.to_string()))?;
    let additional_data: Option<String> = row
        .get(5)
        .map_err(|e| ParleyError::Storage(e.to_string()))?;

    let sender = Sender::parse(&sender)
        .ok_or_else(|| ParleyError::Storage(format!("Unknown sender in database: {}", sender)))?;

    let additional_data = match additional_data {
        Some(json) => Some(serde_json::from_str(&json)?),
        None => None,
    };

    Ok(Message {
        message_id: parse_uuid(message_id)?,
        session_id: parse_uuid(session_id)?,
        sender,
        message,
        timestamp: parse_timestamp(timestamp)?,
        additional_data,
    })
}

// =============================================================================
// Tests
// =============================================================================
