// Rule Store
//
// Manages loading, caching, and validation of discount rule definitions from
// the database. Rules are read-only at evaluation time: evaluators work on a
// snapshot cloned out of a time-based cache with a short TTL.

use crate::discounts::{
    error::{DiscountError, DiscountResult},
    types::{validate_tier_schedule, DiscountKind, PriceTier, RuleScope},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Time-to-live for the cached rule snapshot
const CACHE_TTL: Duration = Duration::from_secs(30);

/// Discount rule definition as stored in the database
///
/// `rule_config` carries the kind-specific payload (see the config structs
/// below). `target_products` of `None` means the rule targets all products.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DiscountRule {
    pub rule_id: Uuid,
    pub name: String,
    pub scope: RuleScope,
    pub kind: DiscountKind,
    pub priority: i32,
    pub stackable: bool,
    pub rule_config: serde_json::Value,
    pub target_products: Option<Vec<i32>>,
    pub usage_limit: Option<i32>,
    pub per_customer_limit: Option<i32>,
    pub is_active: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl DiscountRule {
    /// Whether the rule's validity window contains `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if now < self.valid_from {
            return false;
        }
        if let Some(until) = self.valid_until {
            if now > until {
                return false;
            }
        }
        true
    }

    /// Whether the rule targets the given product or variation
    ///
    /// Global and cart rules match everything; product rules match when the
    /// product id or the variation id appears in the target set.
    pub fn targets(&self, product_id: i32, variation_id: Option<i32>) -> bool {
        match self.scope {
            RuleScope::Global | RuleScope::Cart => true,
            RuleScope::Product => match &self.target_products {
                None => true,
                Some(ids) => {
                    ids.contains(&product_id)
                        || variation_id.map(|v| ids.contains(&v)).unwrap_or(false)
                }
            },
        }
    }
}

/// Percentage rule payload (kind = percentage)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PercentageRuleConfig {
    pub value: Decimal,
    pub label: Option<String>,
}

/// Fixed-amount rule payload (kind = fixed)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedRuleConfig {
    pub value: Decimal,
    pub label: Option<String>,
}

/// Tiered rule payload (kind = tiered)
///
/// `fallback_percentage` applies when the requested quantity qualifies for no
/// tier; absent, the product's own sale price is the fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TieredRuleConfig {
    pub tiers: Vec<PriceTier>,
    pub fallback_percentage: Option<Decimal>,
    pub label: Option<String>,
}

/// Cart rule payload (scope = cart)
///
/// Thresholds are conjunctive when both are present. A negative fee value is
/// a discount, a positive one a surcharge. Percentage fees apply to the cart
/// subtotal after line pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartRuleConfig {
    pub min_subtotal: Option<Decimal>,
    pub min_items: Option<u32>,
    pub fee_kind: DiscountKind,
    pub fee_value: Decimal,
    pub label: Option<String>,
}

/// In-memory cache of the active rule set
#[derive(Debug, Clone)]
struct RuleCache {
    rules: Vec<DiscountRule>,
    last_updated: Option<Instant>,
}

impl RuleCache {
    fn new() -> Self {
        Self { rules: Vec::new(), last_updated: None }
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        match self.last_updated {
            Some(at) => at.elapsed() > ttl,
            None => true,
        }
    }
}

/// Rule Store
///
/// Loads active discount rules from PostgreSQL and hands out snapshots via a
/// TTL cache with a read-lock fast path and double-checked refresh.
pub struct RuleStore {
    pool: PgPool,
    cache: Arc<RwLock<RuleCache>>,
    cache_ttl: Duration,
}

impl RuleStore {
    /// Create a new RuleStore
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: Arc::new(RwLock::new(RuleCache::new())),
            cache_ttl: CACHE_TTL,
        }
    }

    /// Get a reference to the database pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get the active rule set, refreshing the cache if stale
    pub async fn snapshot(&self) -> DiscountResult<Vec<DiscountRule>> {
        // Fast path under the read lock
        {
            let cache = self.cache.read().await;
            if !cache.is_stale(self.cache_ttl) {
                return Ok(cache.rules.clone());
            }
        }

        let mut cache = self.cache.write().await;

        // Another task may have refreshed while we waited for the write lock
        if !cache.is_stale(self.cache_ttl) {
            return Ok(cache.rules.clone());
        }

        let rules = self.load_rules().await?;
        cache.rules = rules.clone();
        cache.last_updated = Some(Instant::now());

        Ok(rules)
    }

    /// Force the next snapshot to reload from the database
    pub async fn invalidate_cache(&self) {
        let mut cache = self.cache.write().await;
        cache.last_updated = None;
    }

    /// Load active rules from the database, validating each payload
    pub async fn load_rules(&self) -> DiscountResult<Vec<DiscountRule>> {
        let rules = sqlx::query_as::<_, DiscountRule>(
            r#"
            SELECT rule_id, name, scope, kind, priority, stackable, rule_config,
                   target_products, usage_limit, per_customer_limit, is_active,
                   valid_from, valid_until
            FROM discount_rules
            WHERE is_active = true
            ORDER BY priority DESC, rule_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        for rule in &rules {
            validate_rule(rule)?;
        }

        tracing::debug!("Loaded {} active discount rules", rules.len());
        Ok(rules)
    }

    /// Fetch one rule by id, active or not
    pub async fn get_rule(&self, rule_id: Uuid) -> DiscountResult<DiscountRule> {
        sqlx::query_as::<_, DiscountRule>(
            r#"
            SELECT rule_id, name, scope, kind, priority, stackable, rule_config,
                   target_products, usage_limit, per_customer_limit, is_active,
                   valid_from, valid_until
            FROM discount_rules
            WHERE rule_id = $1
            "#,
        )
        .bind(rule_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DiscountError::RuleNotFound(rule_id))
    }

    /// Insert a new rule after validating its payload
    pub async fn create_rule(&self, rule: &DiscountRule) -> DiscountResult<()> {
        validate_rule(rule)?;

        sqlx::query(
            r#"
            INSERT INTO discount_rules
                (rule_id, name, scope, kind, priority, stackable, rule_config,
                 target_products, usage_limit, per_customer_limit, is_active,
                 valid_from, valid_until)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(rule.rule_id)
        .bind(&rule.name)
        .bind(rule.scope)
        .bind(rule.kind)
        .bind(rule.priority)
        .bind(rule.stackable)
        .bind(&rule.rule_config)
        .bind(&rule.target_products)
        .bind(rule.usage_limit)
        .bind(rule.per_customer_limit)
        .bind(rule.is_active)
        .bind(rule.valid_from)
        .bind(rule.valid_until)
        .execute(&self.pool)
        .await?;

        self.invalidate_cache().await;
        tracing::info!("Created discount rule {} ({})", rule.name, rule.rule_id);
        Ok(())
    }

    /// Replace an existing rule's definition
    pub async fn update_rule(&self, rule: &DiscountRule) -> DiscountResult<()> {
        validate_rule(rule)?;

        let result = sqlx::query(
            r#"
            UPDATE discount_rules
            SET name = $2, scope = $3, kind = $4, priority = $5, stackable = $6,
                rule_config = $7, target_products = $8, usage_limit = $9,
                per_customer_limit = $10, is_active = $11, valid_from = $12,
                valid_until = $13
            WHERE rule_id = $1
            "#,
        )
        .bind(rule.rule_id)
        .bind(&rule.name)
        .bind(rule.scope)
        .bind(rule.kind)
        .bind(rule.priority)
        .bind(rule.stackable)
        .bind(&rule.rule_config)
        .bind(&rule.target_products)
        .bind(rule.usage_limit)
        .bind(rule.per_customer_limit)
        .bind(rule.is_active)
        .bind(rule.valid_from)
        .bind(rule.valid_until)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DiscountError::RuleNotFound(rule.rule_id));
        }

        self.invalidate_cache().await;
        tracing::info!("Updated discount rule {}", rule.rule_id);
        Ok(())
    }

    /// Deactivate a rule
    ///
    /// Rules are never hard-deleted: applied-discount records reference them.
    pub async fn deactivate_rule(&self, rule_id: Uuid) -> DiscountResult<()> {
        let result = sqlx::query("UPDATE discount_rules SET is_active = false WHERE rule_id = $1")
            .bind(rule_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DiscountError::RuleNotFound(rule_id));
        }

        self.invalidate_cache().await;
        tracing::info!("Deactivated discount rule {}", rule_id);
        Ok(())
    }

    /// List all rules (active and inactive) for the admin surface
    pub async fn list_rules(&self) -> DiscountResult<Vec<DiscountRule>> {
        let rules = sqlx::query_as::<_, DiscountRule>(
            r#"
            SELECT rule_id, name, scope, kind, priority, stackable, rule_config,
                   target_products, usage_limit, per_customer_limit, is_active,
                   valid_from, valid_until
            FROM discount_rules
            ORDER BY priority DESC, rule_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rules)
    }
}

/// Validate a rule's payload against its declared kind and scope
pub fn validate_rule(rule: &DiscountRule) -> DiscountResult<()> {
    if let Some(limit) = rule.usage_limit {
        if limit < 0 {
            return Err(DiscountError::InvalidRule(
                "usage_limit must be non-negative".to_string(),
            ));
        }
    }
    if let Some(limit) = rule.per_customer_limit {
        if limit < 0 {
            return Err(DiscountError::InvalidRule(
                "per_customer_limit must be non-negative".to_string(),
            ));
        }
    }
    if let Some(until) = rule.valid_until {
        if until < rule.valid_from {
            return Err(DiscountError::InvalidRule(
                "valid_until precedes valid_from".to_string(),
            ));
        }
    }

    if rule.scope == RuleScope::Cart {
        let config: CartRuleConfig = serde_json::from_value(rule.rule_config.clone())
            .map_err(|e| DiscountError::InvalidRule(format!("Invalid cart rule config: {}", e)))?;
        if config.min_subtotal.is_none() && config.min_items.is_none() {
            return Err(DiscountError::InvalidRule(
                "Cart rule needs at least one of min_subtotal, min_items".to_string(),
            ));
        }
        if config.fee_kind == DiscountKind::Tiered {
            return Err(DiscountError::InvalidRule(
                "Cart fees cannot be tiered".to_string(),
            ));
        }
        if config.fee_kind == DiscountKind::Percentage
            && config.fee_value.abs() > Decimal::from(100)
        {
            return Err(DiscountError::InvalidRule(
                "Percentage fee cannot exceed 100%".to_string(),
            ));
        }
        return Ok(());
    }

    match rule.kind {
        DiscountKind::Percentage => {
            let config: PercentageRuleConfig = serde_json::from_value(rule.rule_config.clone())
                .map_err(|e| {
                    DiscountError::InvalidRule(format!("Invalid percentage rule config: {}", e))
                })?;
            validate_percentage(config.value)?;
        }
        DiscountKind::Fixed => {
            let config: FixedRuleConfig =
                serde_json::from_value(rule.rule_config.clone()).map_err(|e| {
                    DiscountError::InvalidRule(format!("Invalid fixed rule config: {}", e))
                })?;
            if config.value < Decimal::ZERO {
                return Err(DiscountError::InvalidRule(
                    "Fixed discount must be non-negative".to_string(),
                ));
            }
        }
        DiscountKind::Tiered => {
            let config: TieredRuleConfig =
                serde_json::from_value(rule.rule_config.clone()).map_err(|e| {
                    DiscountError::InvalidRule(format!("Invalid tiered rule config: {}", e))
                })?;
            validate_tier_schedule(&config.tiers).map_err(DiscountError::InvalidRule)?;
            if let Some(pct) = config.fallback_percentage {
                validate_percentage(pct)?;
            }
        }
    }

    Ok(())
}

fn validate_percentage(value: Decimal) -> DiscountResult<()> {
    if value < Decimal::ZERO {
        return Err(DiscountError::InvalidRule(
            "Percentage discount must be non-negative".to_string(),
        ));
    }
    if value > Decimal::from(100) {
        return Err(DiscountError::InvalidRule(
            "Percentage discount cannot exceed 100%".to_string(),
        ));
    }
    Ok(())
}
