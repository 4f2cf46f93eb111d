// Usage Tracker
//
// Records which discounts were consumed by an order and enforces usage caps.
// Recording is idempotent on (order_id, rule_id). The cap check is a single
// conditional UPDATE so two concurrent checkouts against a strict cap cannot
// both succeed.

use crate::discounts::{
    error::{DiscountError, DiscountResult},
    rule_store::DiscountRule,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

/// A discount consumed by an order, as reported by the cart aggregator
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AppliedDiscount {
    pub rule_id: Uuid,
    pub amount: Decimal,
    pub customer_id: Option<i32>,
}

/// Persisted applied-discount record
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct AppliedDiscountRecord {
    pub order_id: Uuid,
    pub rule_id: Uuid,
    pub amount: Decimal,
    pub customer_id: Option<i32>,
    pub applied_at: DateTime<Utc>,
}

/// Usage counts captured before an evaluation pass
///
/// The evaluator is pure, so counts are read once per request and passed in.
/// Customer counts are only populated when the request carries a customer id.
#[derive(Debug, Clone, Default)]
pub struct UsageSnapshot {
    global: HashMap<Uuid, i64>,
    per_customer: HashMap<Uuid, i64>,
}

impl UsageSnapshot {
    /// Whether a rule's usage cap leaves no room for another application
    pub fn is_exhausted(&self, rule: &DiscountRule) -> bool {
        if let Some(limit) = rule.usage_limit {
            let used = self.global.get(&rule.rule_id).copied().unwrap_or(0);
            if used >= i64::from(limit) {
                return true;
            }
        }
        if let Some(limit) = rule.per_customer_limit {
            let used = self.per_customer.get(&rule.rule_id).copied().unwrap_or(0);
            if used >= i64::from(limit) {
                return true;
            }
        }
        false
    }

    pub fn set_count(&mut self, rule_id: Uuid, count: i64) {
        self.global.insert(rule_id, count);
    }

    pub fn set_customer_count(&mut self, rule_id: Uuid, count: i64) {
        self.per_customer.insert(rule_id, count);
    }
}

/// Usage Tracker
pub struct UsageTracker {
    pool: PgPool,
}

impl UsageTracker {
    /// Create a new UsageTracker
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record the discounts consumed by an order
    ///
    /// Idempotent: an (order, rule) pair already on file is skipped without
    /// touching the usage counter, so re-delivery of the same checkout event
    /// is a no-op. For usage-capped rules the counter increment is guarded by
    /// the cap in the same statement; losing the race yields
    /// `UsageLimitExceeded` and rolls back the whole order's batch.
    ///
    /// Returns the rule ids newly recorded by this call.
    pub async fn record_usage(
        &self,
        order_id: Uuid,
        applied: &[AppliedDiscount],
        limits: &HashMap<Uuid, i32>,
    ) -> DiscountResult<Vec<Uuid>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DiscountError::UsagePersistence(e.to_string()))?;

        let mut recorded = Vec::new();

        for discount in applied {
            let inserted = sqlx::query(
                r#"
                INSERT INTO applied_discounts (order_id, rule_id, amount, customer_id, applied_at)
                VALUES ($1, $2, $3, $4, NOW())
                ON CONFLICT (order_id, rule_id) DO NOTHING
                "#,
            )
            .bind(order_id)
            .bind(discount.rule_id)
            .bind(discount.amount)
            .bind(discount.customer_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DiscountError::UsagePersistence(e.to_string()))?;

            // Already recorded for this order: idempotent no-op
            if inserted.rows_affected() == 0 {
                continue;
            }

            if let Some(&cap) = limits.get(&discount.rule_id) {
                // A zero cap can never be consumed; the conditional upsert
                // below would still insert the first counter row
                if cap <= 0 {
                    return Err(DiscountError::UsageLimitExceeded(discount.rule_id));
                }

                let incremented = sqlx::query(
                    r#"
                    INSERT INTO discount_usage_counters (rule_id, used)
                    VALUES ($1, 1)
                    ON CONFLICT (rule_id) DO UPDATE
                    SET used = discount_usage_counters.used + 1
                    WHERE discount_usage_counters.used < $2
                    "#,
                )
                .bind(discount.rule_id)
                .bind(cap)
                .execute(&mut *tx)
                .await
                .map_err(|e| DiscountError::UsagePersistence(e.to_string()))?;

                if incremented.rows_affected() == 0 {
                    // Cap already consumed; the transaction rolls back on drop
                    return Err(DiscountError::UsageLimitExceeded(discount.rule_id));
                }
            }

            recorded.push(discount.rule_id);
        }

        tx.commit()
            .await
            .map_err(|e| DiscountError::UsagePersistence(e.to_string()))?;

        if !recorded.is_empty() {
            tracing::info!(
                "Recorded {} discount usages for order {}",
                recorded.len(),
                order_id
            );
        }

        Ok(recorded)
    }

    /// Count recorded usages of a rule, optionally restricted to one customer
    pub async fn count_usages(
        &self,
        rule_id: Uuid,
        customer_id: Option<i32>,
    ) -> DiscountResult<i64> {
        let count: i64 = match customer_id {
            Some(customer) => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM applied_discounts WHERE rule_id = $1 AND customer_id = $2",
                )
                .bind(rule_id)
                .bind(customer)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM applied_discounts WHERE rule_id = $1")
                    .bind(rule_id)
                    .fetch_one(&self.pool)
                    .await?
            }
        };

        Ok(count)
    }

    /// Capture usage counts for every capped rule in the snapshot
    ///
    /// Counts are read once per request so an evaluation pass sees a stable
    /// view; the strict guarantee is enforced at record time, not here.
    pub async fn snapshot_for(
        &self,
        rules: &[DiscountRule],
        customer_id: Option<i32>,
    ) -> DiscountResult<UsageSnapshot> {
        let mut snapshot = UsageSnapshot::default();

        for rule in rules {
            if rule.usage_limit.is_some() {
                let count = self.count_usages(rule.rule_id, None).await?;
                snapshot.set_count(rule.rule_id, count);
            }
            if rule.per_customer_limit.is_some() {
                if let Some(customer) = customer_id {
                    let count = self.count_usages(rule.rule_id, Some(customer)).await?;
                    snapshot.set_customer_count(rule.rule_id, count);
                }
            }
        }

        Ok(snapshot)
    }

    /// List the applied-discount records for an order
    pub async fn order_records(&self, order_id: Uuid) -> DiscountResult<Vec<AppliedDiscountRecord>> {
        let records = sqlx::query_as::<_, AppliedDiscountRecord>(
            r#"
            SELECT order_id, rule_id, amount, customer_id, applied_at
            FROM applied_discounts
            WHERE order_id = $1
            ORDER BY applied_at
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
