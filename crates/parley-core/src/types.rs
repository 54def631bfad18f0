use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Who produced a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// The end user.
    User,
    /// The workflow engine's reply (or a locally generated bot message).
    Bot,
    /// Service-generated notices.
    System,
}

impl Sender {
    /// The string stored in the database `sender` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Bot => "bot",
            Sender::System => "system",
        }
    }

    /// Parse a database `sender` value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Sender::User),
            "bot" => Some(Sender::Bot),
            "system" => Some(Sender::System),
            _ => None,
        }
    }
}

// =============================================================================
// Entities
// =============================================================================

/// A single conversation thread.
///
/// A session with no linked identity is "unidentified"; linking an identity
/// is a one-way transition. `ended_at`, once set, is never cleared.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    /// A stable user id, or a generated `guest_` id for first contact.
    pub user_id: String,
    /// Link to the captured identity, set after the identification flow.
    pub identity_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Whether the identification flow has completed for this session.
    pub fn is_identified(&self) -> bool {
        self.identity_id.is_some()
    }

    /// Whether the session has been explicitly ended.
    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// Captured end-user profile, created once per distinct email.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub country: String,
    pub created_at: DateTime<Utc>,
}

/// An append-only chat message belonging to one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: Uuid,
    pub session_id: Uuid,
    pub sender: Sender,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Free-form extra payload carried with the inbound request, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_round_trip() {
        for sender in [Sender::User, Sender::Bot, Sender::System] {
            assert_eq!(Sender::parse(sender.as_str()), Some(sender));
        }
    }

    #[test]
    fn test_sender_parse_rejects_unknown() {
        assert_eq!(Sender::parse("agent"), None);
        assert_eq!(Sender::parse(""), None);
        assert_eq!(Sender::parse("User"), None);
    }

    #[test]
    fn test_sender_serde_snake_case() {
        let json = serde_json::to_string(&Sender::Bot).unwrap();
        assert_eq!(json, "\"bot\"");
        let parsed: Sender = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(parsed, Sender::System);
    }

    #[test]
    fn test_session_state_predicates() {
        let mut session = Session {
            session_id: Uuid::new_v4(),
            user_id: "guest_ab12cd34".to_string(),
            identity_id: None,
            started_at: Utc::now(),
            ended_at: None,
        };
        assert!(!session.is_identified());
        assert!(!session.is_ended());

        session.identity_id = Some(Uuid::new_v4());
        session.ended_at = Some(Utc::now());
        assert!(session.is_identified());
        assert!(session.is_ended());
    }

    #[test]
    fn test_message_serde_omits_empty_additional_data() {
        let msg = Message {
            message_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            sender: Sender::User,
            message: "hello".to_string(),
            timestamp: Utc::now(),
            additional_data: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("additional_data"));

        let with_extra = Message {
            additional_data: Some(serde_json::json!({"channel": "web"})),
            ..msg
        };
        let json = serde_json::to_string(&with_extra).unwrap();
        assert!(json.contains("additional_data"));
    }
}
