//! Database schema migrations.
//!
//! Applies the initial schema: chat_sessions, user_identities, chat_messages,
//! and the schema_migrations tracking table.

use rusqlite::Connection;
use tracing::info;

use parley_core::error::ParleyError;

/// Run all pending database migrations.
///
/// Currently implements the initial schema (version 1). Future migrations
/// can be added by checking the current version and applying incremental changes.
pub fn run_migrations(conn: &Connection) -> Result<(), ParleyError> {
    // Create the migrations tracking table first.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| ParleyError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| ParleyError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), ParleyError> {
    conn.execute_batch(
        "
        -- Captured end-user profiles. One row per distinct email, ever.
        CREATE TABLE IF NOT EXISTS user_identities (
            id          TEXT PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            email       TEXT NOT NULL UNIQUE,
            country     TEXT NOT NULL,
            created_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_identities_email
            ON user_identities (email);

        -- Conversation threads. identity_id stays NULL until the
        -- identification flow completes.
        CREATE TABLE IF NOT EXISTS chat_sessions (
            session_id  TEXT PRIMARY KEY NOT NULL,
            user_id     TEXT NOT NULL,
            identity_id TEXT,
            started_at  INTEGER NOT NULL,
            ended_at    INTEGER,
            FOREIGN KEY (identity_id) REFERENCES user_identities(id)
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_user
            ON chat_sessions (user_id, started_at DESC);

        -- Append-only message log.
        CREATE TABLE IF NOT EXISTS chat_messages (
            message_id      TEXT PRIMARY KEY NOT NULL,
            session_id      TEXT NOT NULL,
            sender          TEXT NOT NULL
                            CHECK (sender IN ('user', 'bot', 'system')),
            message         TEXT NOT NULL,
            timestamp       INTEGER NOT NULL,
            additional_data TEXT,
            FOREIGN KEY (session_id) REFERENCES chat_sessions(session_id)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_session
            ON chat_messages (session_id, timestamp ASC);

        -- Record migration.
        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| ParleyError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}
