// SQL builder for stored list queries
//
// Translates a validated list definition into one parameterized SELECT over
// the product catalog. All predicates are conjunctive; the result set is
// always capped.

use rust_decimal::Decimal;

/// A value bound to a query placeholder, typed so numeric comparisons stay
/// numeric
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Number(Decimal),
}

/// Builder for the list evaluation query
pub struct ListQueryBuilder {
    where_clauses: Vec<String>,
    params: Vec<SqlParam>,
    order_clause: String,
    limit: u32,
}

impl ListQueryBuilder {
    /// Create a builder with the default insertion ordering and result cap
    pub fn new(limit: u32) -> Self {
        Self {
            where_clauses: Vec::new(),
            params: Vec::new(),
            order_clause: "id ASC".to_string(),
            limit,
        }
    }

    /// Filter on exact category match
    pub fn add_category(&mut self, category: &str) {
        let index = self.next_index();
        self.where_clauses.push(format!("category = ${}", index));
        self.params.push(SqlParam::Text(category.to_string()));
    }

    /// Filter on an inclusive-min, exclusive-max price range
    ///
    /// Either bound may be absent.
    pub fn add_price_range(&mut self, min: Option<Decimal>, max: Option<Decimal>) {
        if let Some(min_price) = min {
            let index = self.next_index();
            self.where_clauses.push(format!("regular_price >= ${}", index));
            self.params.push(SqlParam::Number(min_price));
        }

        if let Some(max_price) = max {
            let index = self.next_index();
            self.where_clauses.push(format!("regular_price < ${}", index));
            self.params.push(SqlParam::Number(max_price));
        }
    }

    /// Filter on an attribute key having an exact value
    ///
    /// Attributes live in a JSONB column; both key and value are bound
    /// parameters, never interpolated.
    pub fn add_attribute(&mut self, key: &str, value: &str) {
        let key_index = self.next_index();
        self.params.push(SqlParam::Text(key.to_string()));
        let value_index = self.next_index();
        self.params.push(SqlParam::Text(value.to_string()));
        self.where_clauses
            .push(format!("attributes ->> ${} = ${}", key_index, value_index));
    }

    /// Override the ordering clause (column and direction are fixed strings
    /// chosen by the caller from a closed set, never user input)
    pub fn set_order(&mut self, order: &str) {
        self.order_clause = order.to_string();
    }

    /// Build the final query string and its bound parameters
    pub fn build(&self) -> (String, Vec<SqlParam>) {
        let mut query = String::from("SELECT id FROM products");

        if !self.where_clauses.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&self.where_clauses.join(" AND "));
        }

        query.push_str(" ORDER BY ");
        query.push_str(&self.order_clause);
        query.push_str(&format!(" LIMIT {}", self.limit));

        (query, self.params.clone())
    }

    fn next_index(&self) -> usize {
        self.params.len() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_no_predicates() {
        let builder = ListQueryBuilder::new(500);
        let (query, params) = builder.build();

        assert_eq!(query, "SELECT id FROM products ORDER BY id ASC LIMIT 500");
        assert!(params.is_empty());
    }

    #[test]
    fn test_category_and_price() {
        let mut builder = ListQueryBuilder::new(500);
        builder.add_category("shoes");
        builder.add_price_range(None, Some(dec!(50)));

        let (query, params) = builder.build();
        assert_eq!(
            query,
            "SELECT id FROM products WHERE category = $1 AND regular_price < $2 \
             ORDER BY id ASC LIMIT 500"
        );
        assert_eq!(
            params,
            vec![SqlParam::Text("shoes".to_string()), SqlParam::Number(dec!(50))]
        );
    }

    #[test]
    fn test_attribute_predicate() {
        let mut builder = ListQueryBuilder::new(100);
        builder.add_attribute("color", "red");

        let (query, params) = builder.build();
        assert_eq!(
            query,
            "SELECT id FROM products WHERE attributes ->> $1 = $2 ORDER BY id ASC LIMIT 100"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_order_override() {
        let mut builder = ListQueryBuilder::new(500);
        builder.add_price_range(Some(dec!(10)), None);
        builder.set_order("regular_price DESC");

        let (query, _) = builder.build();
        assert!(query.ends_with("ORDER BY regular_price DESC LIMIT 500"));
    }

    #[test]
    fn test_parameter_indices_stay_aligned() {
        let mut builder = ListQueryBuilder::new(500);
        builder.add_category("shoes");
        builder.add_attribute("color", "red");
        builder.add_price_range(Some(dec!(1)), Some(dec!(2)));

        let (query, params) = builder.build();
        assert!(query.contains("category = $1"));
        assert!(query.contains("attributes ->> $2 = $3"));
        assert!(query.contains("regular_price >= $4"));
        assert!(query.contains("regular_price < $5"));
        assert_eq!(params.len(), 5);
    }
}
