use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// A catalog product
///
/// `regular_price` is the list price; `sale_price` is the product's own
/// (native) sale price, which competes with rule-driven discounts at pricing
/// time. `attributes` is a flat JSON object of string values used by stored
/// list predicates.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Product {
    #[schema(example = 1)]
    pub id: i32,
    #[schema(example = "Trail Runner 2")]
    pub name: String,
    #[schema(example = "shoes")]
    pub category: String,
    #[schema(value_type = String, example = "89.99")]
    pub regular_price: Decimal,
    #[schema(value_type = Option<String>, example = "79.99")]
    pub sale_price: Option<Decimal>,
    #[schema(example = json!({"color": "red", "size": "42"}))]
    pub attributes: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating a product
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateProduct {
    #[validate(length(min = 1, max = 200))]
    #[schema(example = "Trail Runner 2")]
    pub name: String,
    #[validate(custom = "crate::validation::validate_category")]
    #[schema(example = "shoes")]
    pub category: String,
    #[validate(custom = "crate::validation::validate_non_negative_price")]
    #[schema(value_type = String, example = "89.99")]
    pub regular_price: Decimal,
    #[schema(value_type = Option<String>, example = "79.99")]
    pub sale_price: Option<Decimal>,
    /// Flat object of string attribute values; defaults to empty
    #[serde(default = "default_attributes")]
    #[schema(example = json!({"color": "red"}))]
    pub attributes: serde_json::Value,
}

/// Request body for updating a product; omitted fields are kept
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProduct {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub category: Option<String>,
    #[schema(value_type = Option<String>)]
    pub regular_price: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub sale_price: Option<Decimal>,
    pub attributes: Option<serde_json::Value>,
}

fn default_attributes() -> serde_json::Value {
    serde_json::json!({})
}

impl CreateProduct {
    /// Cross-field checks the derive cannot express
    pub fn check_prices(&self) -> Result<(), String> {
        if let Some(sale) = self.sale_price {
            if sale < Decimal::ZERO {
                return Err("sale_price must be non-negative".to_string());
            }
            if sale > self.regular_price {
                return Err("sale_price cannot exceed regular_price".to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_product_serialization() {
        let product = Product {
            id: 1,
            name: "Trail Runner 2".to_string(),
            category: "shoes".to_string(),
            regular_price: dec!(89.99),
            sale_price: Some(dec!(79.99)),
            attributes: serde_json::json!({"color": "red"}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_string(&product).expect("Failed to serialize Product");

        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"name\":\"Trail Runner 2\""));
        assert!(json.contains("\"category\":\"shoes\""));
        assert!(json.contains("\"regular_price\":\"89.99\""));
        assert!(json.contains("\"color\":\"red\""));
    }

    #[test]
    fn test_create_product_defaults_attributes() {
        let json = r#"{
            "name": "Basic Tee",
            "category": "apparel",
            "regular_price": "19.99"
        }"#;

        let create: CreateProduct =
            serde_json::from_str(json).expect("Failed to deserialize CreateProduct");

        assert_eq!(create.attributes, serde_json::json!({}));
        assert!(create.sale_price.is_none());
        assert!(create.validate().is_ok());
        assert!(create.check_prices().is_ok());
    }

    #[test]
    fn test_create_product_rejects_sale_above_regular() {
        let create = CreateProduct {
            name: "Basic Tee".to_string(),
            category: "apparel".to_string(),
            regular_price: dec!(19.99),
            sale_price: Some(dec!(25.00)),
            attributes: serde_json::json!({}),
        };

        assert!(create.check_prices().is_err());
    }

    #[test]
    fn test_update_product_partial_fields() {
        let json = r#"{
            "regular_price": "24.99"
        }"#;

        let update: UpdateProduct =
            serde_json::from_str(json).expect("Failed to deserialize UpdateProduct");

        assert_eq!(update.regular_price, Some(dec!(24.99)));
        assert_eq!(update.name, None);
        assert_eq!(update.category, None);
        assert!(update.attributes.is_none());
    }
}
