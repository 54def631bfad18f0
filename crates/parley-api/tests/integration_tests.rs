//! Integration tests for the Parley API.
//!
//! Covers the chat endpoints over the full relay stack: happy paths,
//! validation errors, and the identification flow. Each test is independent
//! with its own in-memory database; the webhook points at a closed port so
//! identified-path forwards degrade to the apology string.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use parley_api::create_router;
use parley_api::handlers::{
    ChatReplyResponse, EndSessionResponse, HealthResponse, MessagesResponse, SessionsResponse,
};
use parley_api::state::AppState;
use parley_chat::{IDENTITY_CONFIRMATION, IDENTITY_PROMPT, UPSTREAM_APOLOGY};
use parley_core::config::ParleyConfig;
use parley_storage::Database;

// =============================================================================
// Helpers
// =============================================================================

/// Create a fresh AppState with an in-memory DB and an unreachable webhook.
fn make_state() -> AppState {
    let db = Arc::new(Database::in_memory().unwrap());
    let mut config = ParleyConfig::default();
    config.webhook.url_production = "http://127.0.0.1:9/".to_string();
    config.webhook.timeout_secs = 2;
    AppState::new(db, config).unwrap()
}

/// Create a fresh router from a new state.
fn make_app() -> axum::Router {
    create_router(make_state())
}

/// Build a POST request with a JSON body.
fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

/// Read full response body bytes.
async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

/// Send one message through /api/session and parse the reply.
async fn send_message(app: &axum::Router, body: &str) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(post_json("/api/session", body))
        .await
        .unwrap();
    let status = resp.status();
    let bytes = body_bytes(resp).await;
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

const JANE: &str = "Jane Doe, jane@example.com, Canada";

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_happy_path() {
    let app = make_app();
    let resp = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body_bytes(resp).await;
    let health: HealthResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health.status, "healthy");
}

// =============================================================================
// POST /api/session
// =============================================================================

#[tokio::test]
async fn test_message_missing_input_is_400() {
    let app = make_app();
    let (status, body) = send_message(&app, r#"{}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_message_blank_input_is_400() {
    let app = make_app();
    let (status, _) = send_message(&app, r#"{"chatInput": "   "}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_message_invalid_session_id_is_400() {
    let app = make_app();
    let (status, body) =
        send_message(&app, r#"{"sessionId": "not-a-uuid", "chatInput": "hello"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("invalid session id"));
}

#[tokio::test]
async fn test_first_contact_gets_prompt_and_ids() {
    let app = make_app();
    let (status, body) = send_message(&app, r#"{"chatInput": "hello"}"#).await;

    assert_eq!(status, StatusCode::OK);
    let reply: ChatReplyResponse = serde_json::from_value(body).unwrap();
    assert_eq!(reply.response, IDENTITY_PROMPT);
    assert!(reply.user_id.starts_with("guest_"));
    assert!(reply.next_endpoint.is_none());
}

#[tokio::test]
async fn test_identity_triple_confirms_and_continues() {
    let app = make_app();
    let (_, body) = send_message(&app, &format!(r#"{{"chatInput": "{}"}}"#, JANE)).await;

    let reply: ChatReplyResponse = serde_json::from_value(body).unwrap();
    assert_eq!(reply.response, IDENTITY_CONFIRMATION);
    assert_eq!(reply.next_endpoint.as_deref(), Some("/api/session"));
}

#[tokio::test]
async fn test_identified_message_degrades_when_engine_down() {
    let app = make_app();
    let (_, first) = send_message(&app, &format!(r#"{{"chatInput": "{}"}}"#, JANE)).await;
    let reply: ChatReplyResponse = serde_json::from_value(first).unwrap();

    let (status, body) = send_message(
        &app,
        &format!(
            r#"{{"sessionId": "{}", "userId": "{}", "chatInput": "how are you?"}}"#,
            reply.session_id, reply.user_id
        ),
    )
    .await;

    // The webhook is unreachable; the caller still gets a 200 with the
    // apology, and the inbound message is durable.
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], UPSTREAM_APOLOGY);
}

#[tokio::test]
async fn test_legacy_chat_message_path() {
    let app = make_app();
    let resp = app
        .oneshot(post_json("/chat/message", r#"{"message": "hello"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body_bytes(resp).await;
    let reply: ChatReplyResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(reply.response, IDENTITY_PROMPT);
}

// =============================================================================
// GET /chat/sessions
// =============================================================================

#[tokio::test]
async fn test_sessions_requires_user_id() {
    let app = make_app();
    let resp = app.oneshot(get("/chat/sessions")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sessions_lists_only_that_user() {
    let app = make_app();
    send_message(&app, r#"{"userId": "alice", "chatInput": "one"}"#).await;
    send_message(&app, r#"{"userId": "alice", "chatInput": "two"}"#).await;
    send_message(&app, r#"{"userId": "bob", "chatInput": "three"}"#).await;

    let resp = app
        .oneshot(get("/chat/sessions?user_id=alice"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body_bytes(resp).await;
    let sessions: SessionsResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(sessions.sessions.len(), 2);
    assert!(sessions.sessions.iter().all(|s| s.ended_at.is_none()));
}

// =============================================================================
// GET /chat/messages/{session_id}
// =============================================================================

#[tokio::test]
async fn test_messages_round_trip_in_order() {
    let app = make_app();
    let (_, body) = send_message(&app, r#"{"chatInput": "hello"}"#).await;
    let reply: ChatReplyResponse = serde_json::from_value(body).unwrap();
    send_message(
        &app,
        &format!(
            r#"{{"sessionId": "{}", "chatInput": "second"}}"#,
            reply.session_id
        ),
    )
    .await;

    let resp = app
        .oneshot(get(&format!("/chat/messages/{}", reply.session_id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body_bytes(resp).await;
    let messages: MessagesResponse = serde_json::from_slice(&bytes).unwrap();

    // user, prompt, user, prompt - ascending by timestamp.
    assert_eq!(messages.messages.len(), 4);
    assert_eq!(messages.messages[0].message, "hello");
    assert_eq!(messages.messages[2].message, "second");
    for pair in messages.messages.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
}

#[tokio::test]
async fn test_messages_invalid_session_id_is_400() {
    let app = make_app();
    let resp = app.oneshot(get("/chat/messages/not-a-uuid")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_messages_unknown_session_is_empty() {
    let app = make_app();
    let resp = app
        .oneshot(get(&format!("/chat/messages/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body_bytes(resp).await;
    let messages: MessagesResponse = serde_json::from_slice(&bytes).unwrap();
    assert!(messages.messages.is_empty());
}

// =============================================================================
// POST /chat/session/{session_id}/end
// =============================================================================

#[tokio::test]
async fn test_end_session_happy_path() {
    let app = make_app();
    let (_, body) = send_message(&app, r#"{"userId": "alice", "chatInput": "hello"}"#).await;
    let reply: ChatReplyResponse = serde_json::from_value(body).unwrap();

    let resp = app
        .clone()
        .oneshot(post_json(
            &format!("/chat/session/{}/end", reply.session_id),
            "",
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body_bytes(resp).await;
    let end: EndSessionResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(end.message, "Session ended successfully");

    // The listing now shows the end timestamp.
    let resp = app
        .oneshot(get("/chat/sessions?user_id=alice"))
        .await
        .unwrap();
    let bytes = body_bytes(resp).await;
    let sessions: SessionsResponse = serde_json::from_slice(&bytes).unwrap();
    assert!(sessions.sessions[0].ended_at.is_some());
}

#[tokio::test]
async fn test_end_unknown_session_is_404() {
    let app = make_app();
    let resp = app
        .oneshot(post_json(
            &format!("/chat/session/{}/end", Uuid::new_v4()),
            "",
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_end_session_twice_succeeds() {
    let app = make_app();
    let (_, body) = send_message(&app, r#"{"chatInput": "hello"}"#).await;
    let reply: ChatReplyResponse = serde_json::from_value(body).unwrap();
    let uri = format!("/chat/session/{}/end", reply.session_id);

    for _ in 0..2 {
        let resp = app.clone().oneshot(post_json(&uri, "")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
