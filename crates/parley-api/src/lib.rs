//! Parley API crate - axum HTTP + WebSocket surface.
//!
//! Exposes the chat relay over REST endpoints and a WebSocket channel with
//! per-session broadcast fan-out. All dependencies are injected through
//! [`state::AppState`] at router construction; there are no process-wide
//! singletons.

pub mod error;
pub mod events;
pub mod handlers;
pub mod registry;
pub mod routes;
pub mod state;
pub mod ws;

pub use error::ApiError;
pub use events::{ClientEvent, ConnectionStatus, ServerEvent};
pub use registry::{ClientConnection, ConnectionRegistry};
pub use routes::{create_router, start_server};
pub use state::AppState;
