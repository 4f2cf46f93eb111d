// Validation utilities module
// Provides custom validation functions for domain-specific rules

use regex::Regex;
use rust_decimal::Decimal;
use std::sync::OnceLock;
use validator::ValidationError;

/// Validates that a price is non-negative (for required Decimal fields)
pub fn validate_non_negative_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price < Decimal::ZERO {
        Err(ValidationError::new("price_must_be_non_negative"))
    } else {
        Ok(())
    }
}

/// Validates that a category slug is non-empty after trimming
pub fn validate_category(category: &str) -> Result<(), ValidationError> {
    if category.trim().is_empty() {
        Err(ValidationError::new("category_must_not_be_empty"))
    } else {
        Ok(())
    }
}

/// Whether an attribute key is safe to use in a list predicate
/// Valid keys: lowercase alphanumeric plus `_` and `-`, 1 to 64 characters
pub fn is_valid_attribute_key(key: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9_-]{1,64}$").expect("attribute key pattern is valid")
    });
    pattern.is_match(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_non_negative_price() {
        assert!(validate_non_negative_price(&dec!(0)).is_ok());
        assert!(validate_non_negative_price(&dec!(9.99)).is_ok());
        assert!(validate_non_negative_price(&dec!(-0.01)).is_err());
    }

    #[test]
    fn test_category() {
        assert!(validate_category("shoes").is_ok());
        assert!(validate_category("  ").is_err());
        assert!(validate_category("").is_err());
    }

    #[test]
    fn test_attribute_key() {
        assert!(is_valid_attribute_key("color"));
        assert!(is_valid_attribute_key("shoe-size_eu"));
        assert!(!is_valid_attribute_key(""));
        assert!(!is_valid_attribute_key("Color"));
        assert!(!is_valid_attribute_key("key; DROP TABLE products"));
        assert!(!is_valid_attribute_key(&"k".repeat(65)));
    }
}
