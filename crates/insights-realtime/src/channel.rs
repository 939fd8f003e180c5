//! Channel specifications.

use serde_json::Value;

/// Restricts a channel to rows whose `column` equals `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    pub column: String,
    pub value: String,
}

impl RowFilter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Wire form (`blog_id=eq.<id>`).
    pub fn to_postgrest(&self) -> String {
        format!("{}=eq.{}", self.column, self.value)
    }

    /// Whether a row satisfies the filter.
    pub fn matches_row(&self, row: &Value) -> bool {
        match row.get(&self.column) {
            Some(Value::String(s)) => *s == self.value,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == self.value,
        }
    }
}

/// What a subscription listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    /// Caller-chosen key; one live registration per key.
    pub key: String,
    pub table: String,
    pub filter: Option<RowFilter>,
}

impl ChannelSpec {
    /// All changes to `table`.
    pub fn table(key: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            table: table.into(),
            filter: None,
        }
    }

    /// Changes to `table` rows belonging to one parent record.
    pub fn filtered(
        key: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            table: table.into(),
            filter: Some(RowFilter::eq(column, value)),
        }
    }

    /// Phoenix topic for this channel.
    pub fn topic(&self) -> String {
        format!("realtime:{}", self.key)
    }
}
