//! HTTP server for the chat daemon.
//!
//! The server:
//! - Listens on a TCP socket
//! - Authenticates WebSocket upgrade requests and hands connections to the hub
//! - Reports liveness on `/healthz`
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │  (axum Router)  │
//! └───────┬─────────┘
//!         │ GET /v1/chat/ws
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │   ws_upgrade    │────▶│    HubHandle    │
//! │ origin, token,  │     │   (Register)    │
//! │ membership      │     └─────────────────┘
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Request failures become `ApiError` responses

mod error;
mod upgrade;

pub use error::{ApiError, ServerError};
pub use upgrade::TokenQuery;

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use chat_core::ChatStore;

use crate::config::Config;
use crate::hub::HubHandle;

/// WebSocket endpoint path
pub const WS_PATH: &str = "/v1/chat/ws";

/// Health endpoint path
pub const HEALTH_PATH: &str = "/healthz";

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub store: Arc<dyn ChatStore>,
    pub jwt_secret: Arc<[u8]>,
    pub allowed_origins: Arc<[String]>,
    pub mailbox_capacity: usize,
    pub max_frame_bytes: usize,
}

/// HTTP/WebSocket server for the chat hub.
pub struct ChatServer {
    /// Address from configuration, used by `run`
    bind: String,

    state: AppState,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,
}

impl ChatServer {
    pub fn new(
        config: &Config,
        hub: HubHandle,
        store: Arc<dyn ChatStore>,
        cancel_token: CancellationToken,
    ) -> Self {
        let state = AppState {
            hub,
            store,
            jwt_secret: Arc::from(config.auth.jwt_secret.as_bytes()),
            allowed_origins: Arc::from(config.server.allowed_origins.clone()),
            mailbox_capacity: config.hub.mailbox_capacity,
            max_frame_bytes: config.hub.max_frame_bytes,
        };

        Self {
            bind: config.server.bind.clone(),
            state,
            cancel_token,
        }
    }

    /// Builds the axum router.
    pub fn router(&self) -> Router {
        Router::new()
            .route(WS_PATH, get(upgrade::ws_upgrade))
            .route(HEALTH_PATH, get(health))
            .with_state(self.state.clone())
    }

    /// Binds the configured address and serves until cancelled.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.bind)
            .await
            .map_err(|e| ServerError::Bind {
                addr: self.bind.clone(),
                error: e.to_string(),
            })?;

        self.serve(listener).await
    }

    /// Serves on an already-bound listener until the cancellation token fires.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener.local_addr().map_err(|e| ServerError::Bind {
            addr: self.bind.clone(),
            error: e.to_string(),
        })?;

        info!(addr = %addr, "Chat server listening");

        let token = self.cancel_token.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                token.cancelled().await;
                info!("Server shutdown requested");
            })
            .await
            .map_err(|e| ServerError::Serve {
                addr,
                error: e.to_string(),
            })?;

        info!("Chat server stopped");
        Ok(())
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = if state.hub.is_connected() { "ok" } else { "degraded" };
    let connections = state.hub.connection_count().await;
    Json(serde_json::json!({
        "status": status,
        "connections": connections,
    }))
}
