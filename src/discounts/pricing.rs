// Pricing Evaluator
//
// Computes the sale price for a single product given a snapshot of the active
// rule set. Pure: no I/O and no clock reads, the caller supplies `now` and
// the usage counts, so the same inputs always produce the same result.

use crate::discounts::{
    error::{DiscountError, DiscountResult},
    rule_store::{DiscountRule, FixedRuleConfig, PercentageRuleConfig, TieredRuleConfig},
    types::{DiscountKind, PriceTier, RuleScope, TierValue},
    usage::UsageSnapshot,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Everything the evaluator needs to price one product
///
/// Ephemeral: constructed per evaluation call and discarded.
#[derive(Debug, Clone)]
pub struct PriceContext {
    pub product_id: i32,
    pub regular_price: Decimal,
    pub native_sale_price: Option<Decimal>,
    pub quantity: u32,
    pub variation_id: Option<i32>,
}

/// Result of pricing one product
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PriceResult {
    /// Discounted unit price; absent when neither a rule nor a native sale
    /// price applies
    pub sale_price: Option<Decimal>,
    pub regular_price: Decimal,
    /// Label of the winning rule, for storefront display
    pub display_label: Option<String>,
    /// Rule that produced the sale price, if any
    pub applied_rule: Option<Uuid>,
}

/// One row of a product's quantity-pricing table
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PricingTableRow {
    pub min_quantity: u32,
    pub unit_price: Decimal,
}

/// Price a candidate rule produced, before tie-breaking
#[derive(Debug, Clone)]
struct CandidatePrice {
    rule_id: Uuid,
    price: Decimal,
    label: Option<String>,
    stackable: bool,
    priority: i32,
}

/// Pricing Evaluator
///
/// Stateless; all inputs arrive as arguments.
pub struct PricingEvaluator;

impl PricingEvaluator {
    /// Evaluate the unit price for a product
    ///
    /// Selection: rules whose validity window contains `now`, whose target set
    /// includes the product (or its variation), and whose usage cap is not
    /// exhausted. Stackable matches compete and the lowest resulting price
    /// wins; a non-stackable match suppresses all others and the
    /// highest-priority non-stackable rule applies. Two non-stackable matches
    /// with equal priority are an unresolvable conflict.
    ///
    /// Guarantee: the returned sale price never exceeds the regular price.
    pub fn evaluate(
        rules: &[DiscountRule],
        usage: &UsageSnapshot,
        ctx: &PriceContext,
        now: DateTime<Utc>,
    ) -> DiscountResult<PriceResult> {
        Self::check_context(ctx)?;

        let mut candidates: Vec<CandidatePrice> = Vec::new();
        for rule in rules {
            if rule.scope == RuleScope::Cart {
                continue;
            }
            if !rule.is_valid_at(now) {
                continue;
            }
            if !rule.targets(ctx.product_id, ctx.variation_id) {
                continue;
            }
            if usage.is_exhausted(rule) {
                continue;
            }

            match Self::rule_price(rule, ctx) {
                Ok(Some(price)) => candidates.push(CandidatePrice {
                    rule_id: rule.rule_id,
                    price,
                    label: Self::rule_label(rule),
                    stackable: rule.stackable,
                    priority: rule.priority,
                }),
                Ok(None) => {}
                Err(e) => {
                    // A malformed stored payload must not take down pricing;
                    // skip the rule and leave a trace for the admin.
                    tracing::warn!("Skipping unreadable rule {}: {}", rule.rule_id, e);
                }
            }
        }

        let native = Self::native_result(ctx);

        if candidates.is_empty() {
            return Ok(native);
        }

        let non_stackable: Vec<&CandidatePrice> =
            candidates.iter().filter(|c| !c.stackable).collect();

        let winner = if non_stackable.is_empty() {
            // Customer-favorable: lowest resulting price wins; the product's
            // own sale price competes as a floor candidate
            let best = candidates
                .iter()
                .min_by(|a, b| a.price.cmp(&b.price))
                .cloned();
            match (best, ctx.native_sale_price) {
                (Some(c), Some(native_sale)) if native_sale < c.price => return Ok(native),
                (best, _) => best,
            }
        } else {
            let mut sorted = non_stackable;
            sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
            if sorted.len() > 1 && sorted[0].priority == sorted[1].priority {
                return Err(DiscountError::RuleConflict {
                    first: sorted[0].rule_id,
                    second: sorted[1].rule_id,
                });
            }
            Some(sorted[0].clone())
        };

        match winner {
            Some(c) => {
                let sale = c.price.max(Decimal::ZERO).min(ctx.regular_price);
                Ok(PriceResult {
                    sale_price: Some(sale),
                    regular_price: ctx.regular_price,
                    display_label: c.label,
                    applied_rule: Some(c.rule_id),
                })
            }
            None => Ok(native),
        }
    }

    /// Build the quantity-pricing table for a product
    ///
    /// Uses the highest-priority valid tiered rule targeting the product.
    /// Empty when no tiered rule applies.
    pub fn pricing_table(
        rules: &[DiscountRule],
        product_id: i32,
        regular_price: Decimal,
        now: DateTime<Utc>,
    ) -> Vec<PricingTableRow> {
        let rule = rules
            .iter()
            .filter(|r| r.kind == DiscountKind::Tiered && r.scope != RuleScope::Cart)
            .filter(|r| r.is_valid_at(now) && r.targets(product_id, None))
            .max_by_key(|r| r.priority);

        let Some(rule) = rule else {
            return Vec::new();
        };

        let config: TieredRuleConfig = match serde_json::from_value(rule.rule_config.clone()) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Unreadable tier schedule on rule {}: {}", rule.rule_id, e);
                return Vec::new();
            }
        };

        config
            .tiers
            .iter()
            .map(|tier| PricingTableRow {
                min_quantity: tier.min_quantity,
                unit_price: tier_unit_price(tier, regular_price)
                    .max(Decimal::ZERO)
                    .min(regular_price),
            })
            .collect()
    }

    fn check_context(ctx: &PriceContext) -> DiscountResult<()> {
        if ctx.quantity < 1 {
            return Err(DiscountError::InvalidContext(
                "quantity must be at least 1".to_string(),
            ));
        }
        if ctx.regular_price < Decimal::ZERO {
            return Err(DiscountError::InvalidContext(
                "regular price must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    /// The result when no rule applies: the product's own sale price, clamped
    fn native_result(ctx: &PriceContext) -> PriceResult {
        PriceResult {
            sale_price: ctx.native_sale_price.map(|p| p.min(ctx.regular_price)),
            regular_price: ctx.regular_price,
            display_label: None,
            applied_rule: None,
        }
    }

    /// Unit price a rule yields for the context, None when it yields nothing
    fn rule_price(rule: &DiscountRule, ctx: &PriceContext) -> DiscountResult<Option<Decimal>> {
        let price = match rule.kind {
            DiscountKind::Percentage => {
                let config: PercentageRuleConfig =
                    serde_json::from_value(rule.rule_config.clone())?;
                Some(apply_percentage(ctx.regular_price, config.value))
            }
            DiscountKind::Fixed => {
                let config: FixedRuleConfig = serde_json::from_value(rule.rule_config.clone())?;
                Some(ctx.regular_price - config.value)
            }
            DiscountKind::Tiered => {
                let config: TieredRuleConfig = serde_json::from_value(rule.rule_config.clone())?;
                match select_tier(&config.tiers, ctx.quantity) {
                    Some(tier) => Some(tier_unit_price(&tier, ctx.regular_price)),
                    None => config
                        .fallback_percentage
                        .map(|pct| apply_percentage(ctx.regular_price, pct)),
                }
            }
        };

        Ok(price)
    }

    fn rule_label(rule: &DiscountRule) -> Option<String> {
        let label = rule
            .rule_config
            .get("label")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        label.or_else(|| Some(rule.name.clone()))
    }
}

/// Pick the tier for a quantity: greatest threshold not exceeding it
///
/// The schedule is validated strictly increasing, so scanning keeps the
/// highest qualifying threshold, which is also the tie-break the storefront
/// expects.
pub fn select_tier(tiers: &[PriceTier], quantity: u32) -> Option<PriceTier> {
    tiers
        .iter()
        .filter(|t| t.min_quantity <= quantity)
        .max_by_key(|t| t.min_quantity)
        .copied()
}

fn tier_unit_price(tier: &PriceTier, regular_price: Decimal) -> Decimal {
    match tier.value {
        TierValue::UnitPrice(price) => price,
        TierValue::Percentage(pct) => apply_percentage(regular_price, pct),
    }
}

fn apply_percentage(price: Decimal, percentage: Decimal) -> Decimal {
    (price - price * percentage / Decimal::from(100)).round_dp(2)
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::discounts::rule_store::DiscountRule;
    use proptest::prelude::*;
    use serde_json::json;

    fn stackable_rule(kind: DiscountKind, config: serde_json::Value) -> DiscountRule {
        DiscountRule {
            rule_id: Uuid::new_v4(),
            name: "prop".to_string(),
            scope: RuleScope::Global,
            kind,
            priority: 0,
            stackable: true,
            rule_config: config,
            target_products: None,
            usage_limit: None,
            per_customer_limit: None,
            is_active: true,
            valid_from: Utc::now() - chrono::Duration::hours(1),
            valid_until: None,
        }
    }

    /// Sale price never exceeds regular price, for any mix of rule values
    #[test]
    fn prop_sale_never_exceeds_regular() {
        proptest!(|(
            regular_cents in 0u32..=100_000u32,
            quantity in 1u32..=50,
            pct in 0u32..=100u32,
            fixed_cents in 0u32..=200_000u32,
        )| {
            let regular = Decimal::from(regular_cents) / Decimal::from(100);
            let fixed = Decimal::from(fixed_cents) / Decimal::from(100);

            let rules = vec![
                stackable_rule(
                    DiscountKind::Percentage,
                    json!({"value": pct.to_string(), "label": null}),
                ),
                stackable_rule(
                    DiscountKind::Fixed,
                    json!({"value": fixed.to_string(), "label": null}),
                ),
            ];

            let context = PriceContext {
                product_id: 1,
                regular_price: regular,
                native_sale_price: None,
                quantity,
                variation_id: None,
            };

            let result = PricingEvaluator::evaluate(
                &rules,
                &UsageSnapshot::default(),
                &context,
                Utc::now(),
            ).unwrap();

            if let Some(sale) = result.sale_price {
                prop_assert!(sale <= result.regular_price,
                    "sale {} exceeds regular {}", sale, result.regular_price);
                prop_assert!(sale >= Decimal::ZERO, "sale {} is negative", sale);
            }
        });
    }

    /// Tier selection is monotone: a larger quantity never picks a lower tier
    #[test]
    fn prop_tier_selection_monotone() {
        proptest!(|(q1 in 1u32..=30, q2 in 1u32..=30)| {
            let tiers = vec![
                PriceTier { min_quantity: 1, value: TierValue::UnitPrice(Decimal::from(10)) },
                PriceTier { min_quantity: 5, value: TierValue::UnitPrice(Decimal::from(8)) },
                PriceTier { min_quantity: 10, value: TierValue::UnitPrice(Decimal::from(6)) },
            ];

            let (lo, hi) = if q1 <= q2 { (q1, q2) } else { (q2, q1) };
            let t_lo = select_tier(&tiers, lo).unwrap().min_quantity;
            let t_hi = select_tier(&tiers, hi).unwrap().min_quantity;
            prop_assert!(t_lo <= t_hi);
        });
    }
}
