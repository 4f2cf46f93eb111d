// Cart Aggregator
//
// Applies discount rules across the lines of a cart and computes cart-level
// fees and surcharges. Pricing failures degrade the affected line or fee to
// its base state and are reported as diagnostics; a cart recompute itself
// never fails, because pricing must never break checkout.

use crate::discounts::{
    error::DiscountError,
    pricing::{PriceContext, PriceResult, PricingEvaluator},
    rule_store::{CartRuleConfig, DiscountRule},
    types::{DiscountKind, RuleScope},
    usage::{AppliedDiscount, UsageSnapshot},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// A cart line priced by the aggregator
#[derive(Debug, Clone, serde::Serialize)]
pub struct PricedLine {
    pub product_id: i32,
    pub quantity: u32,
    pub regular_price: Decimal,
    /// Discounted unit price, equal to the regular price when nothing applied
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub display_label: Option<String>,
}

/// A cart-level fee; negative amounts are discounts, positive are surcharges
#[derive(Debug, Clone, serde::Serialize)]
pub struct Fee {
    pub rule_id: Uuid,
    pub label: String,
    pub amount: Decimal,
}

/// Non-fatal problem encountered during a recompute, kept for the audit trail
#[derive(Debug, Clone, serde::Serialize)]
pub struct CartDiagnostic {
    pub message: String,
}

/// Result of one cart recompute pass
#[derive(Debug, Clone, serde::Serialize)]
pub struct CartTotals {
    pub lines: Vec<PricedLine>,
    pub fees: Vec<Fee>,
    pub subtotal: Decimal,
    pub total: Decimal,
    /// Discounts consumed by this pass, one entry per rule, for the usage
    /// tracker at checkout
    pub applied: Vec<AppliedDiscount>,
    pub diagnostics: Vec<CartDiagnostic>,
}

/// Cart Aggregator
pub struct CartAggregator;

impl CartAggregator {
    /// Recompute a cart against a rule snapshot
    ///
    /// The applied-rule tracking set is initialized exactly once per pass,
    /// before the first line evaluation, so a usage-limited rule is counted
    /// once per cart no matter how many lines it touches.
    pub fn recompute(
        contexts: &[PriceContext],
        rules: &[DiscountRule],
        usage: &UsageSnapshot,
        customer_id: Option<i32>,
        now: DateTime<Utc>,
    ) -> CartTotals {
        // Tracking state for the whole pass; must exist before any line is
        // priced
        let mut applied_rules: HashSet<Uuid> = HashSet::new();
        let mut applied_amounts: HashMap<Uuid, Decimal> = HashMap::new();
        let mut diagnostics: Vec<CartDiagnostic> = Vec::new();

        let mut lines = Vec::with_capacity(contexts.len());
        for ctx in contexts {
            let result = PricingEvaluator::evaluate(rules, usage, ctx, now);
            let line = match result {
                Ok(price) => Self::priced_line(ctx, &price, &mut applied_rules, &mut applied_amounts),
                Err(e @ (DiscountError::InvalidContext(_) | DiscountError::RuleConflict { .. })) => {
                    diagnostics.push(CartDiagnostic {
                        message: format!("Line for product {} reverted to base price: {}", ctx.product_id, e),
                    });
                    Self::base_line(ctx)
                }
                Err(e) => {
                    diagnostics.push(CartDiagnostic {
                        message: format!("Line for product {} failed evaluation: {}", ctx.product_id, e),
                    });
                    Self::base_line(ctx)
                }
            };
            lines.push(line);
        }

        let subtotal: Decimal = lines.iter().map(|l| l.line_total).sum();
        let item_count: u32 = lines.iter().map(|l| l.quantity).sum();

        let fees = Self::cart_fees(rules, usage, subtotal, item_count, now, &mut diagnostics);

        for fee in &fees {
            if fee.amount < Decimal::ZERO {
                applied_rules.insert(fee.rule_id);
                *applied_amounts.entry(fee.rule_id).or_insert(Decimal::ZERO) += -fee.amount;
            }
        }

        let total = (subtotal + fees.iter().map(|f| f.amount).sum::<Decimal>())
            .max(Decimal::ZERO);

        let applied = applied_rules
            .into_iter()
            .map(|rule_id| AppliedDiscount {
                rule_id,
                amount: applied_amounts.get(&rule_id).copied().unwrap_or(Decimal::ZERO),
                customer_id,
            })
            .collect();

        CartTotals { lines, fees, subtotal, total, applied, diagnostics }
    }

    fn priced_line(
        ctx: &PriceContext,
        price: &PriceResult,
        applied_rules: &mut HashSet<Uuid>,
        applied_amounts: &mut HashMap<Uuid, Decimal>,
    ) -> PricedLine {
        let unit_price = price.sale_price.unwrap_or(price.regular_price);
        let quantity = Decimal::from(ctx.quantity);

        if let Some(rule_id) = price.applied_rule {
            applied_rules.insert(rule_id);
            let saved = (price.regular_price - unit_price) * quantity;
            *applied_amounts.entry(rule_id).or_insert(Decimal::ZERO) += saved;
        }

        PricedLine {
            product_id: ctx.product_id,
            quantity: ctx.quantity,
            regular_price: price.regular_price,
            unit_price,
            line_total: unit_price * quantity,
            display_label: price.display_label.clone(),
        }
    }

    fn base_line(ctx: &PriceContext) -> PricedLine {
        let quantity = Decimal::from(ctx.quantity);
        PricedLine {
            product_id: ctx.product_id,
            quantity: ctx.quantity,
            regular_price: ctx.regular_price,
            unit_price: ctx.regular_price,
            line_total: ctx.regular_price * quantity,
            display_label: None,
        }
    }

    /// Evaluate cart-scoped rules against the priced subtotal and item count
    ///
    /// Stackable cart rules all apply. Among non-stackable matches only the
    /// highest-priority one applies; two equal-priority non-stackable matches
    /// are rejected together and surfaced as a diagnostic rather than
    /// guessed at.
    fn cart_fees(
        rules: &[DiscountRule],
        usage: &UsageSnapshot,
        subtotal: Decimal,
        item_count: u32,
        now: DateTime<Utc>,
        diagnostics: &mut Vec<CartDiagnostic>,
    ) -> Vec<Fee> {
        let mut matches: Vec<(&DiscountRule, CartRuleConfig)> = Vec::new();

        for rule in rules {
            if rule.scope != RuleScope::Cart || !rule.is_valid_at(now) {
                continue;
            }
            // An exhausted cart rule must not be shown as a fee the checkout
            // would then reject
            if usage.is_exhausted(rule) {
                continue;
            }
            let config: CartRuleConfig = match serde_json::from_value(rule.rule_config.clone()) {
                Ok(c) => c,
                Err(e) => {
                    diagnostics.push(CartDiagnostic {
                        message: format!("Skipping unreadable cart rule {}: {}", rule.rule_id, e),
                    });
                    continue;
                }
            };

            let subtotal_ok = config.min_subtotal.map(|min| subtotal >= min).unwrap_or(true);
            let items_ok = config.min_items.map(|min| item_count >= min).unwrap_or(true);
            if subtotal_ok && items_ok {
                matches.push((rule, config));
            }
        }

        let non_stackable: Vec<&(&DiscountRule, CartRuleConfig)> =
            matches.iter().filter(|(r, _)| !r.stackable).collect();

        if non_stackable.len() > 1 {
            let mut sorted = non_stackable;
            sorted.sort_by(|a, b| b.0.priority.cmp(&a.0.priority));
            if sorted[0].0.priority == sorted[1].0.priority {
                let conflict = DiscountError::RuleConflict {
                    first: sorted[0].0.rule_id,
                    second: sorted[1].0.rule_id,
                };
                diagnostics.push(CartDiagnostic {
                    message: format!("No cart fees applied: {}", conflict),
                });
                return Vec::new();
            }
            let winner_id = sorted[0].0.rule_id;
            return matches
                .iter()
                .filter(|(r, _)| r.rule_id == winner_id)
                .map(|(r, c)| Self::fee(r, c, subtotal))
                .collect();
        }

        if let Some((winner, config)) = matches.iter().find(|(r, _)| !r.stackable) {
            return vec![Self::fee(winner, config, subtotal)];
        }

        matches
            .iter()
            .map(|(r, c)| Self::fee(r, c, subtotal))
            .collect()
    }

    fn fee(rule: &DiscountRule, config: &CartRuleConfig, subtotal: Decimal) -> Fee {
        let amount = match config.fee_kind {
            DiscountKind::Percentage => {
                (subtotal * config.fee_value / Decimal::from(100)).round_dp(2)
            }
            // Tiered is rejected at save time; treat defensively as fixed
            DiscountKind::Fixed | DiscountKind::Tiered => config.fee_value,
        };

        Fee {
            rule_id: rule.rule_id,
            label: config.label.clone().unwrap_or_else(|| rule.name.clone()),
            amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn line(product_id: i32, price: Decimal, quantity: u32) -> PriceContext {
        PriceContext {
            product_id,
            regular_price: price,
            native_sale_price: None,
            quantity,
            variation_id: None,
        }
    }

    fn product_rule(value: &str) -> DiscountRule {
        DiscountRule {
            rule_id: Uuid::new_v4(),
            name: "pct".to_string(),
            scope: RuleScope::Global,
            kind: DiscountKind::Percentage,
            priority: 0,
            stackable: true,
            rule_config: json!({"value": value, "label": null}),
            target_products: None,
            usage_limit: None,
            per_customer_limit: None,
            is_active: true,
            valid_from: Utc::now() - chrono::Duration::hours(1),
            valid_until: None,
        }
    }

    fn cart_rule(
        min_subtotal: Option<&str>,
        min_items: Option<u32>,
        fee_value: &str,
        stackable: bool,
        priority: i32,
    ) -> DiscountRule {
        DiscountRule {
            rule_id: Uuid::new_v4(),
            name: "cart".to_string(),
            scope: RuleScope::Cart,
            kind: DiscountKind::Fixed,
            priority,
            stackable,
            rule_config: json!({
                "min_subtotal": min_subtotal,
                "min_items": min_items,
                "fee_kind": "fixed",
                "fee_value": fee_value,
                "label": "threshold fee"
            }),
            target_products: None,
            usage_limit: None,
            per_customer_limit: None,
            is_active: true,
            valid_from: Utc::now() - chrono::Duration::hours(1),
            valid_until: None,
        }
    }

    #[test]
    fn test_empty_cart() {
        let totals =
            CartAggregator::recompute(&[], &[], &UsageSnapshot::default(), None, Utc::now());
        assert!(totals.lines.is_empty());
        assert!(totals.fees.is_empty());
        assert_eq!(totals.subtotal, Decimal::ZERO);
        assert_eq!(totals.total, Decimal::ZERO);
    }

    #[test]
    fn test_lines_priced_with_quantity_breaks() {
        let rule = DiscountRule {
            kind: DiscountKind::Tiered,
            rule_config: json!({
                "tiers": [
                    {"min_quantity": 1, "value": {"unit_price": "10.00"}},
                    {"min_quantity": 5, "value": {"unit_price": "8.00"}}
                ],
                "fallback_percentage": null,
                "label": null
            }),
            ..product_rule("0")
        };

        let contexts = vec![line(1, dec!(10.00), 2), line(2, dec!(10.00), 6)];
        let totals = CartAggregator::recompute(
            &contexts,
            &[rule],
            &UsageSnapshot::default(),
            None,
            Utc::now(),
        );

        assert_eq!(totals.lines[0].unit_price, dec!(10.00));
        assert_eq!(totals.lines[1].unit_price, dec!(8.00));
        assert_eq!(totals.subtotal, dec!(68.00));
    }

    #[test]
    fn test_invalid_line_degrades_to_base_price() {
        let rules = vec![product_rule("10")];
        let contexts = vec![line(1, dec!(10.00), 0), line(2, dec!(10.00), 1)];

        let totals = CartAggregator::recompute(
            &contexts,
            &rules,
            &UsageSnapshot::default(),
            None,
            Utc::now(),
        );

        // Bad line keeps its base price, good line gets the discount
        assert_eq!(totals.lines[0].unit_price, dec!(10.00));
        assert_eq!(totals.lines[1].unit_price, dec!(9.00));
        assert_eq!(totals.diagnostics.len(), 1);
    }

    #[test]
    fn test_cart_fee_thresholds() {
        let rules = vec![cart_rule(Some("50"), None, "-5.00", true, 0)];

        let below = vec![line(1, dec!(10.00), 2)];
        let totals = CartAggregator::recompute(
            &below,
            &rules,
            &UsageSnapshot::default(),
            None,
            Utc::now(),
        );
        assert!(totals.fees.is_empty());

        let above = vec![line(1, dec!(10.00), 6)];
        let totals = CartAggregator::recompute(
            &above,
            &rules,
            &UsageSnapshot::default(),
            None,
            Utc::now(),
        );
        assert_eq!(totals.fees.len(), 1);
        assert_eq!(totals.fees[0].amount, dec!(-5.00));
        assert_eq!(totals.total, dec!(55.00));
    }

    #[test]
    fn test_surcharge_increases_total() {
        let rules = vec![cart_rule(None, Some(1), "2.50", true, 0)];
        let contexts = vec![line(1, dec!(10.00), 1)];

        let totals = CartAggregator::recompute(
            &contexts,
            &rules,
            &UsageSnapshot::default(),
            None,
            Utc::now(),
        );
        assert_eq!(totals.total, dec!(12.50));
        // Surcharges are not consumed discounts
        assert!(totals.applied.is_empty());
    }

    #[test]
    fn test_conflicting_cart_rules_apply_neither() {
        let rules = vec![
            cart_rule(Some("10"), None, "-5.00", false, 3),
            cart_rule(Some("10"), None, "-8.00", false, 3),
        ];
        let contexts = vec![line(1, dec!(10.00), 2)];

        let totals = CartAggregator::recompute(
            &contexts,
            &rules,
            &UsageSnapshot::default(),
            None,
            Utc::now(),
        );

        assert!(totals.fees.is_empty());
        assert_eq!(totals.total, dec!(20.00));
        assert!(totals.diagnostics.iter().any(|d| d.message.contains("Rule conflict")));
    }

    #[test]
    fn test_non_stackable_cart_rule_priority_resolves() {
        let rules = vec![
            cart_rule(Some("10"), None, "-5.00", false, 5),
            cart_rule(Some("10"), None, "-8.00", false, 3),
        ];
        let contexts = vec![line(1, dec!(10.00), 2)];

        let totals = CartAggregator::recompute(
            &contexts,
            &rules,
            &UsageSnapshot::default(),
            None,
            Utc::now(),
        );

        assert_eq!(totals.fees.len(), 1);
        assert_eq!(totals.fees[0].amount, dec!(-5.00));
    }

    #[test]
    fn test_applied_discounts_deduplicated_per_rule() {
        let rule = product_rule("10");
        let rule_id = rule.rule_id;
        // Same rule applies to two lines: one applied entry, summed amount
        let contexts = vec![line(1, dec!(10.00), 1), line(2, dec!(20.00), 1)];

        let totals = CartAggregator::recompute(
            &contexts,
            &[rule],
            &UsageSnapshot::default(),
            Some(7),
            Utc::now(),
        );

        assert_eq!(totals.applied.len(), 1);
        assert_eq!(totals.applied[0].rule_id, rule_id);
        assert_eq!(totals.applied[0].amount, dec!(3.00));
        assert_eq!(totals.applied[0].customer_id, Some(7));
    }

    #[test]
    fn test_negative_fee_recorded_as_applied_discount() {
        let rule = cart_rule(Some("10"), None, "-5.00", true, 0);
        let rule_id = rule.rule_id;
        let contexts = vec![line(1, dec!(10.00), 2)];

        let totals = CartAggregator::recompute(
            &contexts,
            &[rule],
            &UsageSnapshot::default(),
            None,
            Utc::now(),
        );

        assert_eq!(totals.applied.len(), 1);
        assert_eq!(totals.applied[0].rule_id, rule_id);
        assert_eq!(totals.applied[0].amount, dec!(5.00));
    }

    #[test]
    fn test_exhausted_cart_rule_emits_no_fee() {
        let rule = DiscountRule {
            usage_limit: Some(1),
            ..cart_rule(Some("10"), None, "-5.00", true, 0)
        };
        let rule_id = rule.rule_id;
        let contexts = vec![line(1, dec!(10.00), 2)];

        let mut usage = UsageSnapshot::default();
        usage.set_count(rule_id, 1);

        let totals = CartAggregator::recompute(&contexts, &[rule], &usage, None, Utc::now());

        assert!(totals.fees.is_empty());
        assert_eq!(totals.total, dec!(20.00));
        assert!(totals.applied.is_empty());
    }

    #[test]
    fn test_total_never_negative() {
        let rules = vec![cart_rule(None, Some(1), "-100.00", true, 0)];
        let contexts = vec![line(1, dec!(10.00), 1)];

        let totals = CartAggregator::recompute(
            &contexts,
            &rules,
            &UsageSnapshot::default(),
            None,
            Utc::now(),
        );
        assert_eq!(totals.total, Decimal::ZERO);
    }
}
