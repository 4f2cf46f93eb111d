// Authentication and authorization error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::token::Role;

/// Authentication and authorization errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Missing authentication token")]
    MissingToken,

    /// Caller is authenticated but lacks the required role
    #[error("Not authorized: required role '{required}', but session has role '{actual}'")]
    NotAuthorized { required: Role, actual: Role },

    #[error("Token generation error: {0}")]
    TokenGeneration(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::InvalidToken => {
                warn!("Invalid token attempt");
                (StatusCode::UNAUTHORIZED, "Invalid token".to_string())
            }
            AuthError::ExpiredToken => {
                warn!("Expired token attempt");
                (StatusCode::UNAUTHORIZED, "Token has expired".to_string())
            }
            AuthError::MissingToken => {
                warn!("Missing token in request");
                (StatusCode::UNAUTHORIZED, "Missing authentication token".to_string())
            }
            AuthError::NotAuthorized { required, .. } => (
                StatusCode::FORBIDDEN,
                format!("Not authorized: required role '{}'", required),
            ),
            AuthError::TokenGeneration(msg) => {
                error!("Token generation error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AuthError::Config(msg) => {
                error!("Auth configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(AuthError::InvalidToken.to_string(), "Invalid token");
        assert_eq!(
            AuthError::NotAuthorized {
                required: Role::Admin,
                actual: Role::Customer,
            }
            .to_string(),
            "Not authorized: required role 'admin', but session has role 'customer'"
        );
    }
}
