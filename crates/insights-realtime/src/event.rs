//! Change events delivered to subscribers.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

/// Kind of row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    /// Parse the wire name (`INSERT`, `UPDATE`, `DELETE`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// One insert/update/delete notification for a row.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub table: String,
    /// Previous row (updates and deletes; may hold only the primary key).
    pub old: Option<Value>,
    /// New row (inserts and updates).
    pub new: Option<Value>,
}

impl ChangeEvent {
    pub fn insert(table: impl Into<String>, new: Value) -> Self {
        Self {
            kind: ChangeKind::Insert,
            table: table.into(),
            old: None,
            new: Some(new),
        }
    }

    pub fn update(table: impl Into<String>, old: Option<Value>, new: Value) -> Self {
        Self {
            kind: ChangeKind::Update,
            table: table.into(),
            old,
            new: Some(new),
        }
    }

    pub fn delete(table: impl Into<String>, old: Value) -> Self {
        Self {
            kind: ChangeKind::Delete,
            table: table.into(),
            old: Some(old),
            new: None,
        }
    }

    /// Identifier of the affected row, from the new row or else the old one.
    pub fn record_id(&self) -> Option<&str> {
        self.new
            .as_ref()
            .and_then(|r| r.get("id"))
            .or_else(|| self.old.as_ref().and_then(|r| r.get("id")))
            .and_then(Value::as_str)
    }

    /// Decode the new row; `None` when absent or malformed.
    pub fn decode_new<T: DeserializeOwned>(&self) -> Option<T> {
        decode(self.new.as_ref(), &self.table)
    }

    /// Decode the old row; `None` when absent or malformed.
    pub fn decode_old<T: DeserializeOwned>(&self) -> Option<T> {
        decode(self.old.as_ref(), &self.table)
    }
}

fn decode<T: DeserializeOwned>(row: Option<&Value>, table: &str) -> Option<T> {
    let row = row?;
    match serde_json::from_value(row.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(table, error = %e, "Change event row did not decode");
            None
        }
    }
}
