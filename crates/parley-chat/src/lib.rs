//! Conversational relay core for Parley.
//!
//! Owns the session lifecycle (guest to identified), the first-contact
//! identity capture flow, and the webhook forwarding to the external
//! workflow engine.

pub mod error;
pub mod identity;
pub mod relay;
pub mod webhook;

pub use error::RelayError;
pub use identity::IdentitySubmission;
pub use relay::{
    ChatRelay, InboundReply, IDENTITY_CONFIRMATION, IDENTITY_PROMPT, NEXT_ENDPOINT,
    UPSTREAM_APOLOGY,
};
pub use webhook::{WebhookClient, NO_REPLY_FALLBACK};
