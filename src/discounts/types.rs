// Domain type definitions for the discount engine
// Provides shared types used by the rule store, evaluator, and aggregator

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Scope a discount rule applies at
///
/// Product-scoped rules adjust individual unit prices, global rules apply to
/// every product, and cart rules emit order-level fees or surcharges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    /// Applies to the products in the rule's target set
    Product,

    /// Applies to every product in the catalog
    Global,

    /// Applies to the cart as a whole (fee or surcharge)
    Cart,
}

impl fmt::Display for RuleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleScope::Product => write!(f, "product"),
            RuleScope::Global => write!(f, "global"),
            RuleScope::Cart => write!(f, "cart"),
        }
    }
}

impl std::str::FromStr for RuleScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product" => Ok(RuleScope::Product),
            "global" => Ok(RuleScope::Global),
            "cart" => Ok(RuleScope::Cart),
            _ => Err(format!("Invalid rule scope: {}", s)),
        }
    }
}

/// Kind of discount a rule applies
///
/// Determines how the rule's value (or tier schedule) is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    /// Discount is a percentage of the regular price (e.g., 10 = 10% off)
    Percentage,

    /// Discount is a fixed amount subtracted from the regular price
    Fixed,

    /// Unit price depends on the requested quantity via a tier schedule
    Tiered,
}

impl fmt::Display for DiscountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountKind::Percentage => write!(f, "percentage"),
            DiscountKind::Fixed => write!(f, "fixed"),
            DiscountKind::Tiered => write!(f, "tiered"),
        }
    }
}

/// Price adjustment a tier applies once its quantity threshold is reached
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierValue {
    /// The unit price becomes this absolute amount
    UnitPrice(Decimal),

    /// The unit price is the regular price minus this percentage
    Percentage(Decimal),
}

/// One entry of a quantity-tier schedule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTier {
    /// Minimum quantity for this tier to apply
    pub min_quantity: u32,

    /// Adjustment applied at and above the threshold
    pub value: TierValue,
}

/// Validate a tier schedule
///
/// Entries must be non-empty, strictly increasing in `min_quantity`, start at
/// a threshold of at least 1, and carry non-negative values (percentages
/// bounded at 100).
pub fn validate_tier_schedule(tiers: &[PriceTier]) -> Result<(), String> {
    if tiers.is_empty() {
        return Err("Tier schedule must contain at least one tier".to_string());
    }

    let mut previous: Option<u32> = None;
    for tier in tiers {
        if tier.min_quantity == 0 {
            return Err("Tier min_quantity must be at least 1".to_string());
        }
        if let Some(prev) = previous {
            if tier.min_quantity <= prev {
                return Err(format!(
                    "Tier thresholds must be strictly increasing: {} follows {}",
                    tier.min_quantity, prev
                ));
            }
        }
        match tier.value {
            TierValue::UnitPrice(price) => {
                if price < Decimal::ZERO {
                    return Err("Tier unit price must be non-negative".to_string());
                }
            }
            TierValue::Percentage(pct) => {
                if pct < Decimal::ZERO || pct > Decimal::from(100) {
                    return Err("Tier percentage must be between 0 and 100".to_string());
                }
            }
        }
        previous = Some(tier.min_quantity);
    }

    Ok(())
}
