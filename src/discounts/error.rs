// Error types for the discount engine
// Covers rule evaluation, rule storage, and usage tracking failures

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for the discount engine
///
/// Evaluation errors (`InvalidContext`, `RuleConflict`) are recoverable: the
/// cart aggregator degrades the affected line or fee to its base price and
/// records a diagnostic. Usage persistence errors are not recoverable locally
/// and must propagate to checkout completion.
#[derive(Debug, Error)]
pub enum DiscountError {
    /// Price context failed its input constraints (negative price, zero quantity)
    #[error("Invalid price context: {0}")]
    InvalidContext(String),

    /// Two non-stackable rules matched with equal priority and no winner
    #[error("Rule conflict between {first} and {second}: equal priority, both non-stackable")]
    RuleConflict {
        first: uuid::Uuid,
        second: uuid::Uuid,
    },

    /// A usage-capped rule has no remaining uses
    #[error("Usage limit exceeded for rule {0}")]
    UsageLimitExceeded(uuid::Uuid),

    /// Recording consumed discounts at checkout failed
    ///
    /// Checkout must not complete with an unrecorded usage-capped discount.
    #[error("Failed to persist discount usage: {0}")]
    UsagePersistence(String),

    /// A stored rule failed validation on load or save
    #[error("Invalid discount rule: {0}")]
    InvalidRule(String),

    /// Referenced rule does not exist
    #[error("Discount rule not found: {0}")]
    RuleNotFound(uuid::Uuid),

    /// Database operation errors, converted from sqlx::Error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON errors when parsing stored rule payloads
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for discount engine operations
pub type DiscountResult<T> = Result<T, DiscountError>;

impl From<validator::ValidationErrors> for DiscountError {
    fn from(err: validator::ValidationErrors) -> Self {
        DiscountError::InvalidRule(err.to_string())
    }
}

impl IntoResponse for DiscountError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            DiscountError::InvalidContext(_) => (StatusCode::BAD_REQUEST, "Invalid price context"),
            DiscountError::RuleConflict { .. } => {
                tracing::warn!("Unresolvable rule conflict: {}", self);
                (StatusCode::CONFLICT, "Rule conflict")
            }
            DiscountError::UsageLimitExceeded(_) => {
                (StatusCode::CONFLICT, "Discount usage limit exceeded")
            }
            DiscountError::UsagePersistence(ref msg) => {
                tracing::error!("Usage persistence failure: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to record discount usage")
            }
            DiscountError::InvalidRule(_) => (StatusCode::BAD_REQUEST, "Invalid discount rule"),
            DiscountError::RuleNotFound(_) => (StatusCode::NOT_FOUND, "Discount rule not found"),
            DiscountError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
            }
            DiscountError::Json(ref e) => {
                // Stored payloads are server-side data; a parse failure is
                // never the client's fault
                tracing::error!("Stored rule payload unreadable: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Stored rule payload error")
            }
        };

        let body = Json(json!({
            "error": error_message,
            "details": self.to_string(),
        }));

        (status, body).into_response()
    }
}
