// Audit trail for the discount engine
//
// Pricing failures are silent for the shopper (the price reverts to base),
// so the diagnostics land here for the admin instead. Audit writes gracefully
// degrade: a failed insert is logged and never blocks the primary operation.

use crate::discounts::cart::CartDiagnostic;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

/// Audit Logger
pub struct AuditLogger {
    pool: PgPool,
}

impl AuditLogger {
    /// Create a new AuditLogger
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record the diagnostics of a cart recompute pass
    pub async fn log_cart_diagnostics(&self, order_id: Option<Uuid>, diagnostics: &[CartDiagnostic]) {
        for diagnostic in diagnostics {
            self.log(
                order_id,
                None,
                "pricing",
                serde_json::json!({ "message": diagnostic.message }),
                "Reverted to base price",
            )
            .await;
        }
    }

    /// Record a rule conflict that suppressed a discount
    pub async fn log_rule_conflict(&self, first: Uuid, second: Uuid) {
        self.log(
            None,
            Some(first),
            "conflict",
            serde_json::json!({ "first": first, "second": second }),
            "No discount applied",
        )
        .await;
    }

    /// Record the discounts consumed at checkout
    pub async fn log_checkout(&self, order_id: Uuid, rule_ids: &[Uuid]) {
        self.log(
            Some(order_id),
            None,
            "checkout",
            serde_json::json!({ "rules": rule_ids }),
            "Usage recorded",
        )
        .await;
    }

    async fn log(
        &self,
        order_id: Option<Uuid>,
        rule_id: Option<Uuid>,
        category: &str,
        detail: JsonValue,
        effect: &str,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO discount_audit (order_id, rule_id, category, detail, effect, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(order_id)
        .bind(rule_id)
        .bind(category)
        .bind(detail)
        .bind(effect)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            // Audit failures must not block pricing or checkout
            tracing::error!("Failed to write {} audit record: {}", category, e);
        }
    }
}
