//! Chat relay: central coordinator for the session lifecycle.
//!
//! Owns the transition of a session from unidentified guest to identified
//! user, persists every message before branching, and forwards identified
//! traffic to the workflow engine.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use parley_core::config::ChatConfig;
use parley_core::types::{Message, Sender, Session};
use parley_storage::{Database, IdentityRepository, MessageRepository, SessionRepository};

use crate::error::RelayError;
use crate::identity::IdentitySubmission;
use crate::webhook::WebhookClient;

/// Prompt persisted and returned while a session is unidentified and the
/// inbound text did not parse as an identity triple.
pub const IDENTITY_PROMPT: &str = "\u{1f44b} Before we continue, please share your **name, email, and country**.\nFormat it like this: `John Smith, john@example.com, Canada`";

/// Confirmation persisted and returned when the identification flow completes.
pub const IDENTITY_CONFIRMATION: &str =
    "\u{2705} Thanks! We've saved your information. How can I assist you today?";

/// Shown instead of a bot reply when the webhook call fails. The inbound
/// message is already durable by the time this is used.
pub const UPSTREAM_APOLOGY: &str =
    "An error occurred while contacting the agent. Please try again later.";

/// Continuation marker handed back to identified callers.
pub const NEXT_ENDPOINT: &str = "/api/session";

/// Outcome of handling one inbound message.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundReply {
    /// The bot reply (from the engine, or one of the fixed local strings).
    pub response: String,
    /// The session the exchange belongs to (possibly freshly generated).
    pub session_id: Uuid,
    /// The caller's user id (possibly a freshly synthesized guest id).
    pub user_id: String,
    /// Which endpoint the caller should use for its next message, once the
    /// session is past the identification flow.
    pub next_endpoint: Option<&'static str>,
}

/// Central relay coordinating storage, identity capture, and the webhook.
pub struct ChatRelay {
    sessions: SessionRepository,
    identities: IdentityRepository,
    messages: MessageRepository,
    webhook: WebhookClient,
    config: ChatConfig,
}

impl ChatRelay {
    /// Create a relay over the given database and webhook client.
    pub fn new(db: Arc<Database>, webhook: WebhookClient, config: ChatConfig) -> Self {
        Self {
            sessions: SessionRepository::new(Arc::clone(&db)),
            identities: IdentityRepository::new(Arc::clone(&db)),
            messages: MessageRepository::new(db),
            webhook,
            config,
        }
    }

    /// Handle an inbound user message.
    ///
    /// The inbound message is persisted before any branching, so an
    /// identification or webhook failure never loses what the user said.
    /// Webhook failures degrade to [`UPSTREAM_APOLOGY`]; they do not
    /// propagate once the inbound message is durable.
    pub async fn handle_inbound(
        &self,
        raw_session_id: Option<&str>,
        raw_user_id: Option<&str>,
        text: &str,
        additional_data: Option<&serde_json::Value>,
    ) -> Result<InboundReply, RelayError> {
        // Validate message
        if text.is_empty() {
            return Err(RelayError::EmptyMessage);
        }
        if text.chars().count() > self.config.max_message_length {
            return Err(RelayError::MessageTooLong(self.config.max_message_length));
        }

        let session_id = resolve_session_id(raw_session_id)?;
        let user_id = match raw_user_id {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => guest_user_id(),
        };

        // Fetch-or-create is race-tolerant; a concurrent create wins quietly.
        let session = self.sessions.get_or_create(session_id, &user_id)?;

        if self.config.reject_after_end && session.is_ended() {
            return Err(RelayError::SessionEnded(session_id));
        }

        // Persist the inbound message unconditionally, before any branch
        // that can fail.
        self.messages
            .append(session_id, Sender::User, text, additional_data)?;

        if session.is_identified() {
            return self.forward_identified(session_id, &user_id, text).await;
        }

        // Unidentified: try the text as an identity triple.
        if let Some(submission) = IdentitySubmission::parse(text) {
            let identity = self.identities.get_or_create(
                &submission.name,
                &submission.email,
                &submission.country,
            )?;
            self.sessions.link_identity(session_id, identity.id)?;
            self.messages
                .append(session_id, Sender::Bot, IDENTITY_CONFIRMATION, None)?;

            return Ok(InboundReply {
                response: IDENTITY_CONFIRMATION.to_string(),
                session_id,
                user_id,
                next_endpoint: Some(NEXT_ENDPOINT),
            });
        }

        // Not a triple: prompt for the expected format and hand back the
        // (possibly fresh) identifiers so the caller can resubmit.
        self.messages
            .append(session_id, Sender::Bot, IDENTITY_PROMPT, None)?;

        Ok(InboundReply {
            response: IDENTITY_PROMPT.to_string(),
            session_id,
            user_id,
            next_endpoint: None,
        })
    }

    /// Forward to the workflow engine and persist whatever comes back.
    async fn forward_identified(
        &self,
        session_id: Uuid,
        user_id: &str,
        text: &str,
    ) -> Result<InboundReply, RelayError> {
        // No storage lock is held across this await.
        let response = match self.webhook.forward(session_id, user_id, text).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Error contacting agent");
                UPSTREAM_APOLOGY.to_string()
            }
        };

        self.messages
            .append(session_id, Sender::Bot, &response, None)?;

        Ok(InboundReply {
            response,
            session_id,
            user_id: user_id.to_string(),
            next_endpoint: Some(NEXT_ENDPOINT),
        })
    }

    /// Mark a session as ended.
    ///
    /// Ending an already-ended session succeeds and refreshes the
    /// timestamp; the end timestamp is never cleared.
    pub fn end_session(&self, session_id: Uuid) -> Result<(), RelayError> {
        if self.sessions.end(session_id)? {
            Ok(())
        } else {
            Err(RelayError::SessionNotFound(session_id))
        }
    }

    /// All sessions belonging to a user.
    pub fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>, RelayError> {
        Ok(self.sessions.list_for_user(user_id)?)
    }

    /// Message history for a session, oldest first.
    pub fn session_messages(&self, session_id: Uuid) -> Result<Vec<Message>, RelayError> {
        Ok(self.messages.list_for_session(session_id)?)
    }

    /// Look up a session by id.
    pub fn find_session(&self, session_id: Uuid) -> Result<Option<Session>, RelayError> {
        Ok(self.sessions.find(session_id)?)
    }
}

/// Parse the caller-supplied session id, or mint a fresh one.
fn resolve_session_id(raw: Option<&str>) -> Result<Uuid, RelayError> {
    match raw {
        None => Ok(Uuid::new_v4()),
        Some(raw) if raw.trim().is_empty() => Ok(Uuid::new_v4()),
        Some(raw) => {
            Uuid::parse_str(raw.trim()).map_err(|_| RelayError::InvalidSessionId(raw.to_string()))
        }
    }
}

/// Synthesize a stable guest id for callers with no user id.
fn guest_user_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("guest_{}", &suffix[..8])
}

// =============================================================================
// Tests
// =============================================================================
