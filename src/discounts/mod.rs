// Discount Engine
//
// Data-driven discount engine for the storefront backend. It manages four
// core capabilities:
// - Rule storage: persisted discount definitions with cached snapshots
// - Pricing: per-product sale prices, including quantity-tiered schedules
// - Cart aggregation: line pricing plus cart-level fees and surcharges
// - Usage tracking: strict caps on how often a discount can be consumed
//
// Rules are configured through the database and the admin API without code
// deployments.

pub mod audit;
pub mod cart;
pub mod error;
pub mod handlers;
pub mod pricing;
pub mod rule_store;
pub mod types;
pub mod usage;

// Re-export commonly used types for convenience
pub use cart::{CartAggregator, CartDiagnostic, CartTotals, Fee, PricedLine};
pub use error::{DiscountError, DiscountResult};
pub use pricing::{PriceContext, PriceResult, PricingEvaluator, PricingTableRow};
pub use rule_store::{
    CartRuleConfig, DiscountRule, FixedRuleConfig, PercentageRuleConfig, RuleStore,
    TieredRuleConfig,
};
pub use types::{DiscountKind, PriceTier, RuleScope, TierValue};
pub use usage::{AppliedDiscount, AppliedDiscountRecord, UsageSnapshot, UsageTracker};

use crate::discounts::audit::AuditLogger;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Discount Engine
///
/// Coordinates the rule store, pricing evaluator, cart aggregator, and usage
/// tracker behind one interface. All evaluation happens against an
/// immutable-for-the-request snapshot of the rule set.
pub struct DiscountEngine {
    rule_store: Arc<RuleStore>,
    usage_tracker: UsageTracker,
    audit_logger: AuditLogger,
}

impl DiscountEngine {
    /// Create a new DiscountEngine sharing one connection pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            rule_store: Arc::new(RuleStore::new(pool.clone())),
            usage_tracker: UsageTracker::new(pool.clone()),
            audit_logger: AuditLogger::new(pool),
        }
    }

    /// Access the rule store (rule CRUD lives there)
    pub fn rule_store(&self) -> &RuleStore {
        &self.rule_store
    }

    /// Access the usage tracker
    pub fn usage_tracker(&self) -> &UsageTracker {
        &self.usage_tracker
    }

    /// Pre-load the rule cache on startup to avoid cold-start latency
    pub async fn warm_cache(&self) -> DiscountResult<()> {
        tracing::info!("Warming discount rule cache...");
        let rules = self.rule_store.snapshot().await?;
        tracing::info!("Discount rule cache warmed with {} rules", rules.len());
        Ok(())
    }

    /// Price a single product
    ///
    /// Invalid contexts propagate (the caller sent bad input). A rule
    /// conflict degrades to the product's native prices and is audited,
    /// because storefront pricing must never fail on a configuration
    /// problem the shopper cannot fix.
    pub async fn price_product(
        &self,
        ctx: &PriceContext,
        customer_id: Option<i32>,
    ) -> DiscountResult<PriceResult> {
        let rules = self.rule_store.snapshot().await?;
        let usage = self.usage_tracker.snapshot_for(&rules, customer_id).await?;

        match PricingEvaluator::evaluate(&rules, &usage, ctx, Utc::now()) {
            Ok(result) => Ok(result),
            Err(DiscountError::RuleConflict { first, second }) => {
                self.audit_logger.log_rule_conflict(first, second).await;
                PricingEvaluator::evaluate(&[], &usage, ctx, Utc::now())
            }
            Err(e) => Err(e),
        }
    }

    /// The quantity-pricing table shown on a product page
    pub async fn pricing_table(
        &self,
        product_id: i32,
        regular_price: Decimal,
    ) -> DiscountResult<Vec<PricingTableRow>> {
        let rules = self.rule_store.snapshot().await?;
        Ok(PricingEvaluator::pricing_table(
            &rules,
            product_id,
            regular_price,
            Utc::now(),
        ))
    }

    /// Recompute a cart and audit any diagnostics it produced
    pub async fn quote_cart(
        &self,
        contexts: &[PriceContext],
        customer_id: Option<i32>,
    ) -> DiscountResult<CartTotals> {
        let rules = self.rule_store.snapshot().await?;
        let usage = self.usage_tracker.snapshot_for(&rules, customer_id).await?;

        let totals = CartAggregator::recompute(contexts, &rules, &usage, customer_id, Utc::now());

        if !totals.diagnostics.is_empty() {
            self.audit_logger
                .log_cart_diagnostics(None, &totals.diagnostics)
                .await;
        }

        Ok(totals)
    }

    /// Persist the discounts an order consumed
    ///
    /// Usage failures propagate: an order must not complete with an
    /// unrecorded usage-capped discount.
    pub async fn complete_checkout(
        &self,
        order_id: Uuid,
        applied: &[AppliedDiscount],
    ) -> DiscountResult<Vec<Uuid>> {
        let rules = self.rule_store.snapshot().await?;

        let limits: HashMap<Uuid, i32> = rules
            .iter()
            .filter_map(|r| r.usage_limit.map(|limit| (r.rule_id, limit)))
            .collect();

        let recorded = self
            .usage_tracker
            .record_usage(order_id, applied, &limits)
            .await?;

        self.audit_logger.log_checkout(order_id, &recorded).await;

        Ok(recorded)
    }
}
