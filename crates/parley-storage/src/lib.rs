//! Parley storage crate - SQLite persistence for sessions, identities, messages.
//!
//! Provides a WAL-mode SQLite database with migrations and repository
//! implementations for the chat relay's three durable entities. Messages are
//! append-only; sessions and identities are created with race-tolerant
//! insert-or-ignore semantics.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{IdentityRepository, MessageRepository, SessionRepository};
