//! Parley core crate - shared error type, configuration, and domain types.
//!
//! Everything here is consumed by the storage, chat, API, and app crates.
//! No business logic lives in this crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ChatConfig, GeneralConfig, ParleyConfig, WebhookConfig, WebhookMode};
pub use error::{ParleyError, Result};
pub use types::{Identity, Message, Sender, Session};
