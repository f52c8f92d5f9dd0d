//! `GET /v1/chat/ws` - authenticate, resolve membership, upgrade, register.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{header::ORIGIN, HeaderMap};
use axum::response::Response;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::auth::{bearer_token, validate_token, AuthError};
use crate::connection::Connection;
use crate::transport::websocket;

use super::{ApiError, AppState};

/// Query-string fallback for clients that cannot set headers (browsers).
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

pub async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    check_origin(&state.allowed_origins, &headers)?;

    let token = bearer_token(&headers)
        .or(query.token.as_deref())
        .ok_or(AuthError::Missing)?;

    let claims = validate_token(&state.jwt_secret, token).map_err(|e| {
        warn!(error = %e, "WebSocket auth failed");
        ApiError::from(e)
    })?;
    let user_id = claims.user_id();

    let chats = state
        .store
        .chat_ids_for_user(user_id)
        .await
        .map_err(|e| {
            error!(user_id = %user_id, error = %e, "Membership lookup failed");
            ApiError::Internal
        })?;

    info!(
        user_id = %user_id,
        chats = chats.len(),
        "WebSocket connection authenticated"
    );

    let hub = state.hub.clone();
    let mailbox_capacity = state.mailbox_capacity;

    Ok(ws
        .max_message_size(state.max_frame_bytes)
        .on_upgrade(move |socket| async move {
            let (sink, stream) = websocket::split(socket);
            let connection = Connection::new(user_id, chats, sink, stream, mailbox_capacity);
            if let Err(e) = hub.register(connection).await {
                // Dropping the connection closes the socket
                error!(user_id = %user_id, error = %e, "Failed to register connection");
            }
        }))
}

/// Rejects requests whose `Origin` is not in a non-empty allow-list.
fn check_origin(allowed: &[String], headers: &HeaderMap) -> Result<(), ApiError> {
    if allowed.is_empty() {
        return Ok(());
    }

    let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());
    match origin {
        Some(origin) if allowed.iter().any(|a| a == origin) => Ok(()),
        other => {
            warn!(origin = ?other, "Rejected WebSocket origin");
            Err(ApiError::ForbiddenOrigin)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_empty_allow_list_accepts_anything() {
        assert!(check_origin(&[], &HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_origin_must_match_allow_list() {
        let allowed = vec!["https://chat.example.com".to_string()];

        let mut headers = HeaderMap::new();
        assert!(matches!(
            check_origin(&allowed, &headers),
            Err(ApiError::ForbiddenOrigin)
        ));

        headers.insert(ORIGIN, HeaderValue::from_static("https://evil.example.com"));
        assert!(check_origin(&allowed, &headers).is_err());

        headers.insert(ORIGIN, HeaderValue::from_static("https://chat.example.com"));
        assert!(check_origin(&allowed, &headers).is_ok());
    }
}
