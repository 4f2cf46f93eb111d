// HTTP handlers for discount rule management and storefront pricing

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AdminSession;
use crate::discounts::{
    AppliedDiscount, CartTotals, DiscountError, DiscountKind, DiscountRule, PriceContext,
    PriceResult, PricingTableRow, RuleScope,
};

/// Request DTO for creating a discount rule
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRuleRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub scope: RuleScope,
    pub kind: DiscountKind,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub stackable: bool,
    /// Kind-specific payload (percentage, fixed, tiered, or cart config)
    #[schema(value_type = Object)]
    pub rule_config: serde_json::Value,
    pub target_products: Option<Vec<i32>>,
    #[validate(range(min = 0))]
    pub usage_limit: Option<i32>,
    #[validate(range(min = 0))]
    pub per_customer_limit: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

/// Request DTO for updating a discount rule
///
/// Omitted fields keep their current values.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateRuleRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub priority: Option<i32>,
    pub stackable: Option<bool>,
    #[schema(value_type = Option<Object>)]
    pub rule_config: Option<serde_json::Value>,
    pub target_products: Option<Vec<i32>>,
    #[validate(range(min = 0))]
    pub usage_limit: Option<i32>,
    #[validate(range(min = 0))]
    pub per_customer_limit: Option<i32>,
    pub is_active: Option<bool>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

/// Response DTO for a discount rule
#[derive(Debug, Serialize, ToSchema)]
pub struct RuleResponse {
    pub rule_id: Uuid,
    pub name: String,
    pub scope: RuleScope,
    pub kind: DiscountKind,
    pub priority: i32,
    pub stackable: bool,
    #[schema(value_type = Object)]
    pub rule_config: serde_json::Value,
    pub target_products: Option<Vec<i32>>,
    pub usage_limit: Option<i32>,
    pub per_customer_limit: Option<i32>,
    pub is_active: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl From<DiscountRule> for RuleResponse {
    fn from(rule: DiscountRule) -> Self {
        Self {
            rule_id: rule.rule_id,
            name: rule.name,
            scope: rule.scope,
            kind: rule.kind,
            priority: rule.priority,
            stackable: rule.stackable,
            rule_config: rule.rule_config,
            target_products: rule.target_products,
            usage_limit: rule.usage_limit,
            per_customer_limit: rule.per_customer_limit,
            is_active: rule.is_active,
            valid_from: rule.valid_from,
            valid_until: rule.valid_until,
        }
    }
}

/// Summary row for the admin rule listing
#[derive(Debug, Serialize, ToSchema)]
pub struct RuleSummary {
    pub rule_id: Uuid,
    pub name: String,
    pub scope: RuleScope,
    pub kind: DiscountKind,
    pub priority: i32,
    pub stackable: bool,
    pub usage_limit: Option<i32>,
    pub times_used: i64,
    pub is_active: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
}

/// One line of a pricing request
#[derive(Debug, Deserialize, Validate)]
pub struct PriceLineRequest {
    pub product_id: i32,
    pub regular_price: Decimal,
    pub native_sale_price: Option<Decimal>,
    #[validate(range(min = 1))]
    pub quantity: u32,
    pub variation_id: Option<i32>,
}

impl PriceLineRequest {
    fn into_context(self) -> PriceContext {
        PriceContext {
            product_id: self.product_id,
            regular_price: self.regular_price,
            native_sale_price: self.native_sale_price,
            quantity: self.quantity,
            variation_id: self.variation_id,
        }
    }
}

/// Request DTO for a single-product price preview
#[derive(Debug, Deserialize, Validate)]
pub struct PreviewRequest {
    #[validate]
    pub line: PriceLineRequest,
    pub customer_id: Option<i32>,
}

/// Request DTO for a cart quote
#[derive(Debug, Deserialize, Validate)]
pub struct QuoteRequest {
    #[validate]
    pub lines: Vec<PriceLineRequest>,
    pub customer_id: Option<i32>,
}

/// Request DTO for checkout completion
#[derive(Debug, Deserialize)]
pub struct CompleteCheckoutRequest {
    pub order_id: Uuid,
    pub applied: Vec<AppliedDiscount>,
}

/// Response DTO for checkout completion
#[derive(Debug, Serialize)]
pub struct CompleteCheckoutResponse {
    pub order_id: Uuid,
    /// Rules whose usage was recorded by this call; rules already recorded
    /// for the order (a retried request) are absent
    pub recorded: Vec<Uuid>,
}

/// Handler for POST /api/discounts/rules
/// Creates a new discount rule (Admin only)
#[utoipa::path(
    post,
    path = "/api/discounts/rules",
    request_body = CreateRuleRequest,
    responses(
        (status = 201, description = "Rule created", body = RuleResponse),
        (status = 400, description = "Invalid rule definition"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Admin role required"),
        (status = 500, description = "Internal server error")
    ),
    tag = "discounts"
)]
pub async fn create_rule_handler(
    State(state): State<crate::AppState>,
    _admin: AdminSession,
    Json(request): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<RuleResponse>), DiscountError> {
    request.validate()?;

    let rule = DiscountRule {
        rule_id: Uuid::new_v4(),
        name: request.name,
        scope: request.scope,
        kind: request.kind,
        priority: request.priority,
        stackable: request.stackable,
        rule_config: request.rule_config,
        target_products: request.target_products,
        usage_limit: request.usage_limit,
        per_customer_limit: request.per_customer_limit,
        is_active: true,
        valid_from: request.valid_from.unwrap_or_else(Utc::now),
        valid_until: request.valid_until,
    };

    state.discount_engine.rule_store().create_rule(&rule).await?;
    state.events.rules_changed(rule.rule_id);

    Ok((StatusCode::CREATED, Json(rule.into())))
}

/// Handler for GET /api/discounts/rules
/// Lists all rules, active and inactive, with their usage counts (Admin only)
#[utoipa::path(
    get,
    path = "/api/discounts/rules",
    responses(
        (status = 200, description = "Rule summaries", body = Vec<RuleSummary>),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Admin role required"),
        (status = 500, description = "Internal server error")
    ),
    tag = "discounts"
)]
pub async fn list_rules_handler(
    State(state): State<crate::AppState>,
    _admin: AdminSession,
) -> Result<Json<Vec<RuleSummary>>, DiscountError> {
    let rules = state.discount_engine.rule_store().list_rules().await?;

    let counters: HashMap<Uuid, i64> =
        sqlx::query_as::<_, (Uuid, i64)>("SELECT rule_id, used FROM discount_usage_counters")
            .fetch_all(&state.db)
            .await?
            .into_iter()
            .collect();

    let summaries = rules
        .into_iter()
        .map(|rule| RuleSummary {
            times_used: counters.get(&rule.rule_id).copied().unwrap_or(0),
            rule_id: rule.rule_id,
            name: rule.name,
            scope: rule.scope,
            kind: rule.kind,
            priority: rule.priority,
            stackable: rule.stackable,
            usage_limit: rule.usage_limit,
            is_active: rule.is_active,
            valid_from: rule.valid_from,
            valid_until: rule.valid_until,
        })
        .collect();

    Ok(Json(summaries))
}

/// Handler for GET /api/discounts/rules/{rule_id}
#[utoipa::path(
    get,
    path = "/api/discounts/rules/{rule_id}",
    params(
        ("rule_id" = Uuid, Path, description = "Rule ID")
    ),
    responses(
        (status = 200, description = "Rule found", body = RuleResponse),
        (status = 404, description = "Rule not found"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Admin role required"),
        (status = 500, description = "Internal server error")
    ),
    tag = "discounts"
)]
pub async fn get_rule_handler(
    State(state): State<crate::AppState>,
    _admin: AdminSession,
    Path(rule_id): Path<Uuid>,
) -> Result<Json<RuleResponse>, DiscountError> {
    let rule = state.discount_engine.rule_store().get_rule(rule_id).await?;
    Ok(Json(rule.into()))
}

/// Handler for PUT /api/discounts/rules/{rule_id}
/// Updates a rule, keeping current values for omitted fields (Admin only)
#[utoipa::path(
    put,
    path = "/api/discounts/rules/{rule_id}",
    params(
        ("rule_id" = Uuid, Path, description = "Rule ID")
    ),
    request_body = UpdateRuleRequest,
    responses(
        (status = 200, description = "Rule updated", body = RuleResponse),
        (status = 400, description = "Invalid rule definition"),
        (status = 404, description = "Rule not found"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Admin role required"),
        (status = 500, description = "Internal server error")
    ),
    tag = "discounts"
)]
pub async fn update_rule_handler(
    State(state): State<crate::AppState>,
    _admin: AdminSession,
    Path(rule_id): Path<Uuid>,
    Json(request): Json<UpdateRuleRequest>,
) -> Result<Json<RuleResponse>, DiscountError> {
    request.validate()?;

    let existing = state.discount_engine.rule_store().get_rule(rule_id).await?;

    let updated = DiscountRule {
        rule_id,
        name: request.name.unwrap_or(existing.name),
        scope: existing.scope,
        kind: existing.kind,
        priority: request.priority.unwrap_or(existing.priority),
        stackable: request.stackable.unwrap_or(existing.stackable),
        rule_config: request.rule_config.unwrap_or(existing.rule_config),
        target_products: request.target_products.or(existing.target_products),
        usage_limit: request.usage_limit.or(existing.usage_limit),
        per_customer_limit: request.per_customer_limit.or(existing.per_customer_limit),
        is_active: request.is_active.unwrap_or(existing.is_active),
        valid_from: request.valid_from.unwrap_or(existing.valid_from),
        valid_until: request.valid_until.or(existing.valid_until),
    };

    state.discount_engine.rule_store().update_rule(&updated).await?;
    state.events.rules_changed(rule_id);

    Ok(Json(updated.into()))
}

/// Handler for DELETE /api/discounts/rules/{rule_id}
/// Deactivates a rule; applied-discount history keeps referencing it
#[utoipa::path(
    delete,
    path = "/api/discounts/rules/{rule_id}",
    params(
        ("rule_id" = Uuid, Path, description = "Rule ID")
    ),
    responses(
        (status = 204, description = "Rule deactivated"),
        (status = 404, description = "Rule not found"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Admin role required"),
        (status = 500, description = "Internal server error")
    ),
    tag = "discounts"
)]
pub async fn deactivate_rule_handler(
    State(state): State<crate::AppState>,
    _admin: AdminSession,
    Path(rule_id): Path<Uuid>,
) -> Result<StatusCode, DiscountError> {
    state
        .discount_engine
        .rule_store()
        .deactivate_rule(rule_id)
        .await?;
    state.events.rules_changed(rule_id);

    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /api/discounts/preview
/// Prices one product line against the active rule set
pub async fn preview_price_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<PreviewRequest>,
) -> Result<Json<PriceResult>, DiscountError> {
    request.validate().map_err(|e| DiscountError::InvalidContext(e.to_string()))?;

    let customer_id = request.customer_id;
    let ctx = request.line.into_context();
    let result = state.discount_engine.price_product(&ctx, customer_id).await?;

    Ok(Json(result))
}

/// Handler for GET /api/products/{id}/pricing-table
/// The quantity-pricing table shown on a product page
pub async fn pricing_table_handler(
    State(state): State<crate::AppState>,
    Path(product_id): Path<i32>,
) -> Result<Json<Vec<PricingTableRow>>, DiscountError> {
    let regular_price: Decimal =
        sqlx::query_scalar("SELECT regular_price FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| {
                DiscountError::InvalidContext(format!("Unknown product {}", product_id))
            })?;

    let table = state
        .discount_engine
        .pricing_table(product_id, regular_price)
        .await?;

    Ok(Json(table))
}

/// Handler for POST /api/discounts/quote
/// Recomputes a full cart: line prices, cart fees, and totals
pub async fn quote_cart_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<CartTotals>, DiscountError> {
    request.validate().map_err(|e| DiscountError::InvalidContext(e.to_string()))?;

    let contexts: Vec<PriceContext> = request
        .lines
        .into_iter()
        .map(PriceLineRequest::into_context)
        .collect();

    let totals = state
        .discount_engine
        .quote_cart(&contexts, request.customer_id)
        .await?;

    state.events.cart_recomputed(&totals);

    Ok(Json(totals))
}

/// Handler for POST /api/checkout/complete
/// Records the discounts an order consumed, enforcing usage caps
pub async fn complete_checkout_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<CompleteCheckoutRequest>,
) -> Result<Json<CompleteCheckoutResponse>, DiscountError> {
    let recorded = state
        .discount_engine
        .complete_checkout(request.order_id, &request.applied)
        .await?;

    state.events.checkout_completed(request.order_id, &recorded);

    Ok(Json(CompleteCheckoutResponse {
        order_id: request.order_id,
        recorded,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_create_rule_request_deserializes_with_defaults() {
        let request: CreateRuleRequest = serde_json::from_value(json!({
            "name": "Summer sale",
            "scope": "global",
            "kind": "percentage",
            "rule_config": {"value": "10", "label": "Summer"}
        }))
        .unwrap();

        assert_eq!(request.priority, 0);
        assert!(!request.stackable);
        assert!(request.valid_from.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_create_rule_request_rejects_negative_cap() {
        let request: CreateRuleRequest = serde_json::from_value(json!({
            "name": "Capped",
            "scope": "global",
            "kind": "percentage",
            "rule_config": {"value": "10"},
            "usage_limit": -1
        }))
        .unwrap();

        assert!(request.validate().is_err());
    }

    #[test]
    fn test_quote_request_rejects_zero_quantity() {
        let request: QuoteRequest = serde_json::from_value(json!({
            "lines": [{"product_id": 1, "regular_price": "10", "quantity": 0}]
        }))
        .unwrap();

        assert!(request.validate().is_err());
    }

    #[test]
    fn test_price_line_converts_to_context() {
        let line = PriceLineRequest {
            product_id: 7,
            regular_price: dec!(19.99),
            native_sale_price: None,
            quantity: 3,
            variation_id: Some(70),
        };

        let ctx = line.into_context();
        assert_eq!(ctx.product_id, 7);
        assert_eq!(ctx.quantity, 3);
        assert_eq!(ctx.variation_id, Some(70));
    }
}
