//! Error types for the chat relay.

use parley_core::error::ParleyError;
use uuid::Uuid;

/// Errors from the relay engine.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),
    #[error("session not found: {0}")]
    SessionNotFound(Uuid),
    #[error("session has ended: {0}")]
    SessionEnded(Uuid),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<ParleyError> for RelayError {
    fn from(err: ParleyError) -> Self {
        RelayError::Storage(err.to_string())
    }
}
