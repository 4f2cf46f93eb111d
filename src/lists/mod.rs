// Stored product lists
//
// A list definition is a persisted, re-evaluable query describing a dynamic
// product subset: conjunctive predicates over category, price, and
// attributes, plus a sort order. Evaluation always recomputes against the
// live catalog; results are never cached across requests.

pub mod error;
pub mod handlers;
pub mod query;

pub use error::{ListError, ListResult};

use crate::lists::query::{ListQueryBuilder, SqlParam};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Maximum number of predicates a definition may carry
pub const MAX_PREDICATES: usize = 16;

/// Hard cap on the number of product ids an evaluation returns
pub const MAX_RESULTS: u32 = 500;

/// One filter of a list definition; all predicates are ANDed together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ListPredicate {
    /// Product category equals the given value
    Category { value: String },

    /// Regular price in [min, max); either bound may be absent
    PriceRange {
        min: Option<Decimal>,
        max: Option<Decimal>,
    },

    /// Attribute `key` equals `value`
    Attribute { key: String, value: String },
}

/// Result ordering of an evaluated list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListSort {
    /// Catalog insertion order (ascending id), the default
    #[default]
    Insertion,
    PriceAsc,
    PriceDesc,
    NameAsc,
    NameDesc,
}

impl ListSort {
    fn order_clause(self) -> &'static str {
        match self {
            ListSort::Insertion => "id ASC",
            ListSort::PriceAsc => "regular_price ASC, id ASC",
            ListSort::PriceDesc => "regular_price DESC, id ASC",
            ListSort::NameAsc => "name ASC, id ASC",
            ListSort::NameDesc => "name DESC, id ASC",
        }
    }
}

/// Stored list definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDefinition {
    pub list_id: Uuid,
    pub name: String,
    pub predicates: Vec<ListPredicate>,
    pub sort: ListSort,
    pub updated_at: DateTime<Utc>,
}

/// Validate a definition before save or evaluation
///
/// The predicate bound is checked here, upfront, so an oversized definition
/// is rejected before any SQL is issued.
pub fn validate_definition(
    predicates: &[ListPredicate],
) -> Result<(), ListError> {
    if predicates.len() > MAX_PREDICATES {
        return Err(ListError::QueryTooComplex(format!(
            "{} predicates exceeds the limit of {}",
            predicates.len(),
            MAX_PREDICATES
        )));
    }

    for predicate in predicates {
        match predicate {
            ListPredicate::Category { value } => {
                if value.trim().is_empty() {
                    return Err(ListError::InvalidDefinition(
                        "Category predicate needs a value".to_string(),
                    ));
                }
            }
            ListPredicate::PriceRange { min, max } => {
                if min.is_none() && max.is_none() {
                    return Err(ListError::InvalidDefinition(
                        "Price range predicate needs at least one bound".to_string(),
                    ));
                }
                if let (Some(min), Some(max)) = (min, max) {
                    if min >= max {
                        return Err(ListError::InvalidDefinition(
                            "Price range minimum must be below the maximum".to_string(),
                        ));
                    }
                }
            }
            ListPredicate::Attribute { key, value } => {
                if !crate::validation::is_valid_attribute_key(key) {
                    return Err(ListError::InvalidDefinition(format!(
                        "Invalid attribute key '{}'",
                        key
                    )));
                }
                if value.trim().is_empty() {
                    return Err(ListError::InvalidDefinition(
                        "Attribute predicate needs a value".to_string(),
                    ));
                }
            }
        }
    }

    Ok(())
}

/// List store and evaluator
pub struct ListStore {
    pool: PgPool,
}

impl ListStore {
    /// Create a new ListStore
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a definition, replacing any previous version
    pub async fn save(&self, definition: &ListDefinition) -> ListResult<()> {
        validate_definition(&definition.predicates)?;

        let predicates = serde_json::to_value(&definition.predicates)?;
        let sort = serde_json::to_value(definition.sort)?;

        sqlx::query(
            r#"
            INSERT INTO product_lists (list_id, name, predicates, sort, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (list_id) DO UPDATE
            SET name = EXCLUDED.name,
                predicates = EXCLUDED.predicates,
                sort = EXCLUDED.sort,
                updated_at = NOW()
            "#,
        )
        .bind(definition.list_id)
        .bind(&definition.name)
        .bind(predicates)
        .bind(sort)
        .execute(&self.pool)
        .await?;

        tracing::info!("Saved list definition {} ({})", definition.name, definition.list_id);
        Ok(())
    }

    /// Fetch a stored definition
    pub async fn get(&self, list_id: Uuid) -> ListResult<ListDefinition> {
        let row = sqlx::query_as::<_, ListRow>(
            "SELECT list_id, name, predicates, sort, updated_at FROM product_lists WHERE list_id = $1",
        )
        .bind(list_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ListError::ListNotFound(list_id))?;

        row.try_into()
    }

    /// List all stored definitions
    pub async fn list(&self) -> ListResult<Vec<ListDefinition>> {
        let rows = sqlx::query_as::<_, ListRow>(
            "SELECT list_id, name, predicates, sort, updated_at FROM product_lists ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Delete a stored definition
    pub async fn delete(&self, list_id: Uuid) -> ListResult<()> {
        let result = sqlx::query("DELETE FROM product_lists WHERE list_id = $1")
            .bind(list_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ListError::ListNotFound(list_id));
        }

        Ok(())
    }

    /// Evaluate a definition against the live catalog
    ///
    /// Recomputed on every call. The predicate bound is re-checked so a
    /// definition persisted under an older, looser limit still cannot run
    /// past it.
    pub async fn evaluate(&self, definition: &ListDefinition) -> ListResult<Vec<i32>> {
        validate_definition(&definition.predicates)?;

        let mut builder = ListQueryBuilder::new(MAX_RESULTS);
        for predicate in &definition.predicates {
            match predicate {
                ListPredicate::Category { value } => builder.add_category(value),
                ListPredicate::PriceRange { min, max } => builder.add_price_range(*min, *max),
                ListPredicate::Attribute { key, value } => builder.add_attribute(key, value),
            }
        }
        builder.set_order(definition.sort.order_clause());

        let (sql, params) = builder.build();
        tracing::debug!("Evaluating list {} with {} predicates", definition.list_id, definition.predicates.len());

        let mut query = sqlx::query_scalar::<_, i32>(&sql);
        for param in params {
            query = match param {
                SqlParam::Text(value) => query.bind(value),
                SqlParam::Number(value) => query.bind(value),
            };
        }

        let ids = query.fetch_all(&self.pool).await?;
        Ok(ids)
    }
}

/// Raw database row for a stored definition
#[derive(sqlx::FromRow)]
struct ListRow {
    list_id: Uuid,
    name: String,
    predicates: serde_json::Value,
    sort: serde_json::Value,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ListRow> for ListDefinition {
    type Error = ListError;

    fn try_from(row: ListRow) -> Result<Self, Self::Error> {
        Ok(ListDefinition {
            list_id: row.list_id,
            name: row.name,
            predicates: serde_json::from_value(row.predicates)?,
            sort: serde_json::from_value(row.sort)?,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn category(value: &str) -> ListPredicate {
        ListPredicate::Category { value: value.to_string() }
    }

    #[test]
    fn test_validate_accepts_reasonable_definition() {
        let predicates = vec![
            category("shoes"),
            ListPredicate::PriceRange { min: None, max: Some(dec!(50)) },
        ];
        assert!(validate_definition(&predicates).is_ok());
    }

    #[test]
    fn test_validate_rejects_over_bound() {
        let predicates: Vec<ListPredicate> =
            (0..MAX_PREDICATES + 1).map(|i| category(&format!("c{}", i))).collect();

        let result = validate_definition(&predicates);
        assert!(matches!(result, Err(ListError::QueryTooComplex(_))));
    }

    #[test]
    fn test_validate_rejects_empty_range() {
        let predicates = vec![ListPredicate::PriceRange { min: None, max: None }];
        assert!(matches!(
            validate_definition(&predicates),
            Err(ListError::InvalidDefinition(_))
        ));

        let predicates = vec![ListPredicate::PriceRange {
            min: Some(dec!(50)),
            max: Some(dec!(10)),
        }];
        assert!(matches!(
            validate_definition(&predicates),
            Err(ListError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_attribute_key() {
        let predicates = vec![ListPredicate::Attribute {
            key: "color; DROP TABLE products".to_string(),
            value: "red".to_string(),
        }];
        assert!(matches!(
            validate_definition(&predicates),
            Err(ListError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_predicate_serialization_round_trip() {
        let predicates = vec![
            category("shoes"),
            ListPredicate::PriceRange { min: Some(dec!(10)), max: Some(dec!(50)) },
            ListPredicate::Attribute { key: "color".to_string(), value: "red".to_string() },
        ];

        let json = serde_json::to_value(&predicates).unwrap();
        let back: Vec<ListPredicate> = serde_json::from_value(json).unwrap();
        assert_eq!(back, predicates);
    }

    #[test]
    fn test_sort_order_clauses() {
        assert_eq!(ListSort::Insertion.order_clause(), "id ASC");
        assert_eq!(ListSort::PriceAsc.order_clause(), "regular_price ASC, id ASC");
        assert_eq!(ListSort::NameDesc.order_clause(), "name DESC, id ASC");
        assert_eq!(ListSort::default(), ListSort::Insertion);
    }
}
