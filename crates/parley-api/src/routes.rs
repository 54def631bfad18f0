//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, and all endpoint
//! handlers, including the WebSocket upgrade route.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use parley_core::error::ParleyError;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // Browser clients are served from arbitrary dev origins; the relay
    // carries no credentials, so a permissive CORS policy is fine.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/session", post(handlers::chat_message))
        .route("/chat/message", post(handlers::chat_message))
        .route("/chat/sessions", get(handlers::get_chat_sessions))
        .route("/chat/messages/{session_id}", get(handlers::get_chat_messages))
        .route(
            "/chat/session/{session_id}/end",
            post(handlers::end_chat_session),
        )
        .route("/ws/chat", get(ws::ws_chat))
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured address.
pub async fn start_server(state: AppState, port: u16) -> Result<(), ParleyError> {
    let addr = format!("0.0.0.0:{}", port);

    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ParleyError::Api(format!("Failed to bind: {}", e)))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| ParleyError::Api(format!("Server error: {}", e)))?;

    Ok(())
}
