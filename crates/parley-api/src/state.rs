//! Application state shared across all route handlers.
//!
//! AppState holds references to all services and shared resources.
//! It is passed to handlers via axum's State extractor and to the
//! WebSocket tasks; nothing here is a process-wide singleton.

use std::sync::Arc;

use parley_chat::{ChatRelay, WebhookClient};
use parley_core::config::ParleyConfig;
use parley_core::error::ParleyError;
use parley_storage::Database;

use crate::registry::ConnectionRegistry;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Session lifecycle manager.
    pub relay: Arc<ChatRelay>,
    /// Realtime fan-out registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Application configuration.
    pub config: Arc<ParleyConfig>,
}

impl AppState {
    /// Wire up the full service graph over the given database.
    pub fn new(db: Arc<Database>, config: ParleyConfig) -> Result<Self, ParleyError> {
        let webhook = WebhookClient::new(&config.webhook)
            .map_err(|e| ParleyError::Webhook(e.to_string()))?;
        let relay = ChatRelay::new(db, webhook, config.chat.clone());

        Ok(Self {
            relay: Arc::new(relay),
            registry: Arc::new(ConnectionRegistry::new()),
            config: Arc::new(config),
        })
    }
}
