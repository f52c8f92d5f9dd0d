//! HTTP-facing errors of the upgrade gateway.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::auth::AuthError;

/// Rejections returned before a WebSocket upgrade.
///
/// Rendered as `{"message": "..."}` with the matching status code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(#[from] AuthError),

    #[error("origin not allowed")]
    ForbiddenOrigin,

    /// Internal details are logged where the error is created, never sent.
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::ForbiddenOrigin => StatusCode::FORBIDDEN,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "message": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}

/// Errors that stop the server itself.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },

    #[error("Server error on {addr}: {error}")]
    Serve { addr: SocketAddr, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::Unauthorized(AuthError::Missing).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::ForbiddenOrigin.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::Internal.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_response_body_hides_internal_details() {
        assert_eq!(ApiError::Internal.to_string(), "internal server error");
        assert_eq!(
            ApiError::Unauthorized(AuthError::Missing).to_string(),
            "missing access token"
        );
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:80".to_string(),
            error: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("0.0.0.0:80"));
        assert!(err.to_string().contains("permission denied"));
    }
}
