// Error handling module for the storefront pricing API
// Provides the top-level error type and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, warn};

/// Main error type for the catalog API surface
///
/// The discount and list modules carry their own error enums; this type
/// covers the product catalog handlers and anything that has no better home.
#[derive(Debug)]
pub enum ApiError {
    /// Request validation failures, HTTP 400
    ValidationError(validator::ValidationErrors),

    /// Resource lookup by id failed, HTTP 404
    NotFound { resource: String, id: String },

    /// Duplicate resource, HTTP 409
    Conflict { message: String },

    /// Database operation errors, HTTP 500
    /// Details are logged but never sent to clients
    DatabaseError(sqlx::Error),

    /// Anything else that is our fault, HTTP 500
    InternalError(String),
}

/// Consistent error response structure
///
/// Machine-readable `error_code`, human-readable `message`, optional
/// field-level `details`, and an ISO 8601 timestamp.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub timestamp: String,
}

impl ErrorResponse {
    fn new(error_code: &str, message: String, details: Option<serde_json::Value>) -> Self {
        Self {
            error_code: error_code.to_string(),
            message,
            details,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = self.to_error_response();
        (status, Json(error_response)).into_response()
    }
}

impl ApiError {
    fn to_error_response(&self) -> (StatusCode, ErrorResponse) {
        match self {
            ApiError::ValidationError(errors) => {
                debug!("Validation error: {:?}", errors);
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::new(
                        "VALIDATION_ERROR",
                        "Request validation failed".to_string(),
                        Some(serde_json::to_value(errors).unwrap_or(serde_json::json!({}))),
                    ),
                )
            }
            ApiError::NotFound { resource, id } => {
                debug!("Resource not found: {} with id {}", resource, id);
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::new(
                        "NOT_FOUND",
                        format!("{} with id {} not found", resource, id),
                        None,
                    ),
                )
            }
            ApiError::Conflict { message } => {
                warn!("Conflict error: {}", message);
                (
                    StatusCode::CONFLICT,
                    ErrorResponse::new("CONFLICT", message.clone(), None),
                )
            }
            ApiError::DatabaseError(db_error) => {
                error!("Database error: {:?}", db_error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new(
                        "DATABASE_ERROR",
                        "A database error occurred".to_string(),
                        None,
                    ),
                )
            }
            ApiError::InternalError(internal_msg) => {
                error!("Internal error: {}", internal_msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new(
                        "INTERNAL_ERROR",
                        "An internal server error occurred".to_string(),
                        None,
                    ),
                )
            }
        }
    }

    /// HTTP status code for this error without building the full response
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(error: sqlx::Error) -> Self {
        ApiError::DatabaseError(error)
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(errors)
    }
}
