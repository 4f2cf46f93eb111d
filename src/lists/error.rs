// Error types for stored product lists

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for list storage and evaluation
#[derive(Debug, Error)]
pub enum ListError {
    /// The definition exceeds the predicate bound and is rejected upfront,
    /// never partially evaluated
    #[error("Query too complex: {0}")]
    QueryTooComplex(String),

    /// The stored definition failed validation
    #[error("Invalid list definition: {0}")]
    InvalidDefinition(String),

    /// Referenced list does not exist
    #[error("List not found: {0}")]
    ListNotFound(uuid::Uuid),

    /// Database operation errors, converted from sqlx::Error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON errors when parsing stored definitions
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for list operations
pub type ListResult<T> = Result<T, ListError>;

impl IntoResponse for ListError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ListError::QueryTooComplex(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "Query too complex")
            }
            ListError::InvalidDefinition(_) => (StatusCode::BAD_REQUEST, "Invalid list definition"),
            ListError::ListNotFound(_) => (StatusCode::NOT_FOUND, "List not found"),
            ListError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
            }
            ListError::Json(ref e) => {
                // Stored definitions are server-side data; a parse failure is
                // never the client's fault
                tracing::error!("Stored list definition unreadable: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Stored definition error")
            }
        };

        let body = Json(json!({
            "error": error_message,
            "details": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ListError::QueryTooComplex("17 predicates exceeds the limit of 16".to_string());
        assert_eq!(
            error.to_string(),
            "Query too complex: 17 predicates exceeds the limit of 16"
        );

        let id = uuid::Uuid::new_v4();
        let error = ListError::ListNotFound(id);
        assert_eq!(error.to_string(), format!("List not found: {}", id));
    }

    #[test]
    fn test_error_from_sqlx() {
        let error: ListError = sqlx::Error::RowNotFound.into();
        assert!(matches!(error, ListError::Database(_)));
    }

    #[test]
    fn test_stored_definition_parse_failure_is_a_server_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let response = ListError::Json(json_error).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
