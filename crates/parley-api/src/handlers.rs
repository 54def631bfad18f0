//! Route handler functions for all API endpoints.
//!
//! Each handler extracts query/path/body parameters via axum extractors,
//! drives the chat relay, and returns JSON responses. Message-producing
//! handlers also fan new_message events out to the session's watchers.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use parley_core::types::Sender;

use crate::error::ApiError;
use crate::events::ServerEvent;
use crate::state::AppState;

// =============================================================================
// Request types
// =============================================================================

/// Inbound chat message. Accepts both the `chatInput` and the legacy
/// `message` field spelling; `chatInput` wins when both are present.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessageRequest {
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "chatInput", skip_serializing_if = "Option::is_none")]
    pub chat_input: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionsParams {
    pub user_id: Option<String>,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatReplyResponse {
    pub response: String,
    #[serde(rename = "sessionId")]
    pub session_id: Uuid,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "nextEndpoint", skip_serializing_if = "Option::is_none")]
    pub next_endpoint: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageView {
    pub message_id: Uuid,
    pub sender: Sender,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EndSessionResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Handler functions
// =============================================================================

/// POST /api/session and /chat/message - run one message through the relay.
pub async fn chat_message(
    State(state): State<AppState>,
    Json(request): Json<ChatMessageRequest>,
) -> Result<Json<ChatReplyResponse>, ApiError> {
    let text = request
        .chat_input
        .as_deref()
        .or(request.message.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing required fields".to_string()))?
        .to_string();

    // The raw request rides along as the message's additional payload.
    let additional_data = serde_json::to_value(&request)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let reply = state
        .relay
        .handle_inbound(
            request.session_id.as_deref(),
            request.user_id.as_deref(),
            &text,
            Some(&additional_data),
        )
        .await?;

    // Fan out to any live watchers of this session.
    state.registry.broadcast(
        reply.session_id,
        &ServerEvent::message_now(reply.session_id, Sender::User, &text),
    );
    state.registry.broadcast(
        reply.session_id,
        &ServerEvent::message_now(reply.session_id, Sender::Bot, &reply.response),
    );

    Ok(Json(ChatReplyResponse {
        response: reply.response,
        session_id: reply.session_id,
        user_id: reply.user_id,
        next_endpoint: reply.next_endpoint.map(str::to_string),
    }))
}

/// GET /chat/sessions?user_id=... - list a user's sessions.
pub async fn get_chat_sessions(
    State(state): State<AppState>,
    Query(params): Query<SessionsParams>,
) -> Result<Json<SessionsResponse>, ApiError> {
    let user_id = params
        .user_id
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing user_id parameter".to_string()))?;

    let sessions = state
        .relay
        .list_sessions(&user_id)?
        .into_iter()
        .map(|s| SessionSummary {
            session_id: s.session_id,
            started_at: s.started_at,
            ended_at: s.ended_at,
        })
        .collect();

    Ok(Json(SessionsResponse { sessions }))
}

/// GET /chat/messages/{session_id} - full message history, oldest first.
pub async fn get_chat_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let session_id = parse_session_id(&session_id)?;

    let messages = state
        .relay
        .session_messages(session_id)?
        .into_iter()
        .map(|m| MessageView {
            message_id: m.message_id,
            sender: m.sender,
            message: m.message,
            timestamp: m.timestamp,
        })
        .collect();

    Ok(Json(MessagesResponse { messages }))
}

/// POST /chat/session/{session_id}/end - mark a session ended.
pub async fn end_chat_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<EndSessionResponse>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    state.relay.end_session(session_id)?;

    Ok(Json(EndSessionResponse {
        message: "Session ended successfully".to_string(),
    }))
}

/// GET /health - liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
    })
}

/// Session ids are validated uniformly on every path that accepts one.
fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::BadRequest(format!("Invalid session id: {}", raw)))
}
