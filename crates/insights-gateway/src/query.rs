//! Backend-agnostic filters, ordering and limits.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;

/// A single column condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Column equals value.
    Eq(String, Value),
    /// Column is one of the values.
    In(String, Vec<Value>),
}

impl Condition {
    fn column(&self) -> &str {
        match self {
            Condition::Eq(column, _) | Condition::In(column, _) => column,
        }
    }

    /// PostgREST operator expression (`eq.x`, `in.(a,b)`, `is.null`).
    fn to_postgrest(&self) -> String {
        match self {
            Condition::Eq(_, Value::Null) => "is.null".to_string(),
            Condition::Eq(_, value) => format!("eq.{}", render(value)),
            Condition::In(_, values) => {
                let items: Vec<String> = values.iter().map(|v| quote_list_item(&render(v))).collect();
                format!("in.({})", items.join(","))
            }
        }
    }

    fn matches(&self, record: &Value) -> bool {
        let actual = record.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Condition::Eq(_, expected) => values_equal(actual, expected),
            Condition::In(_, candidates) => candidates.iter().any(|c| values_equal(actual, c)),
        }
    }
}

/// A conjunction of conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Add an equality condition.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(column.into(), value.into()));
        self
    }

    /// Add a membership condition.
    pub fn is_in<V: Into<Value>>(
        mut self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.conditions.push(Condition::In(
            column.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Whether `record` satisfies every condition.
    pub fn matches(&self, record: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }

    /// Query-string pairs in PostgREST syntax.
    pub fn to_params(&self) -> Vec<(String, String)> {
        self.conditions
            .iter()
            .map(|c| (c.column().to_string(), c.to_postgrest()))
            .collect()
    }
}

/// Sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// A read request: projection, filter, ordering and limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub select: Option<String>,
    pub filter: Filter,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl Query {
    /// Every column of every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Start from an existing filter.
    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Restrict the returned columns (PostgREST `select`).
    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.select = Some(columns.into());
        self
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter = self.filter.eq(column, value);
        self
    }

    pub fn is_in<V: Into<Value>>(
        mut self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filter = self.filter.is_in(column, values);
        self
    }

    pub fn order_asc(mut self, column: impl Into<String>) -> Self {
        self.order.push(Order {
            column: column.into(),
            ascending: true,
        });
        self
    }

    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order.push(Order {
            column: column.into(),
            ascending: false,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query-string pairs in PostgREST syntax.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![(
            "select".to_string(),
            self.select.clone().unwrap_or_else(|| "*".to_string()),
        )];
        params.extend(self.filter.to_params());
        if !self.order.is_empty() {
            let order: Vec<String> = self
                .order
                .iter()
                .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
                .collect();
            params.push(("order".to_string(), order.join(",")));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    /// Compare two records under this query's ordering.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for order in &self.order {
            let left = a.get(&order.column).unwrap_or(&Value::Null);
            let right = b.get(&order.column).unwrap_or(&Value::Null);
            let ord = compare_values(left, right);
            let ord = if order.ascending { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Text form of a scalar as it appears in a query string.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn quote_list_item(item: &str) -> String {
    if item.contains([',', '(', ')', '"', ' ']) {
        format!("\"{}\"", item.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        item.to_string()
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    actual == expected || (!actual.is_null() && render(actual) == render(expected))
}

/// Total order over JSON scalars; RFC 3339 strings compare as instants.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => {
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(dx), Ok(dy)) => dx.with_timezone(&Utc).cmp(&dy.with_timezone(&Utc)),
                _ => x.cmp(y),
            }
        }
        _ => render(a).cmp(&render(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_params_follow_postgrest_syntax() {
        let query = Query::all()
            .eq("published", true)
            .eq("featured", true)
            .order_desc("created_at")
            .limit(3);
        assert_eq!(
            query.to_params(),
            vec![
                ("select".to_string(), "*".to_string()),
                ("published".to_string(), "eq.true".to_string()),
                ("featured".to_string(), "eq.true".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn in_list_quotes_reserved_characters() {
        let filter = Filter::all().is_in("id", ["a", "b,c", "d e"]);
        assert_eq!(
            filter.to_params(),
            vec![("id".to_string(), "in.(a,\"b,c\",\"d e\")".to_string())]
        );
    }

    #[test]
    fn null_equality_uses_is() {
        let filter = Filter::all().eq("parent_id", Value::Null);
        assert_eq!(filter.to_params()[0].1, "is.null");
        assert!(filter.matches(&json!({"parent_id": null})));
        assert!(filter.matches(&json!({})));
        assert!(!filter.matches(&json!({"parent_id": "c1"})));
    }

    #[test]
    fn filter_matching() {
        let filter = Filter::all().eq("blog_id", "a1").is_in("user_id", ["u1", "u2"]);
        assert!(filter.matches(&json!({"blog_id": "a1", "user_id": "u2"})));
        assert!(!filter.matches(&json!({"blog_id": "a1", "user_id": "u3"})));
        assert!(!filter.matches(&json!({"blog_id": "a2", "user_id": "u1"})));
        assert!(Filter::all().matches(&json!({})));
    }

    #[test]
    fn timestamps_compare_as_instants() {
        let earlier = json!("2024-11-25T09:00:00.5Z");
        let later = json!("2024-11-25T09:00:01Z");
        assert_eq!(compare_values(&earlier, &later), Ordering::Less);
    }

    #[test]
    fn compare_descending_then_ascending() {
        let query = Query::all().order_desc("created_at").order_asc("title");
        let a = json!({"created_at": "2024-12-01T00:00:00Z", "title": "b"});
        let b = json!({"created_at": "2024-12-01T00:00:00Z", "title": "a"});
        let c = json!({"created_at": "2024-11-01T00:00:00Z", "title": "a"});
        assert_eq!(query.compare(&a, &b), Ordering::Greater);
        assert_eq!(query.compare(&a, &c), Ordering::Less);
    }
}
