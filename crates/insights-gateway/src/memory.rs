//! In-process gateway.
//!
//! Tables must be provisioned before use; touching an unprovisioned table or
//! calling an unregistered procedure fails with
//! [`GatewayError::NotProvisioned`], exactly like a partially provisioned
//! hosted schema. Unique column sets are enforced on insert and update and
//! violations surface as [`GatewayError::Conflict`].
//!
//! When a [`LocalChangeFeed`] is attached, every committed insert, update
//! and delete is published to it after the table lock is released.

mod procedures;

use crate::query::compare_values;
use crate::{Filter, Gateway, GatewayError, GatewayResult, Query, Record};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use insights_model::tables;
use insights_realtime::{ChangeEvent, LocalChangeFeed};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// A server-side procedure: receives the tables, the calling user (if
/// signed in) and the JSON arguments.
pub type Procedure =
    Arc<dyn Fn(&mut MemoryTables, Option<&str>, &Value) -> GatewayResult<Value> + Send + Sync>;

#[derive(Debug, Default, Clone)]
struct Table {
    rows: Vec<Record>,
    unique: Vec<Vec<String>>,
}

/// The rows of every provisioned table.
#[derive(Debug, Default, Clone)]
pub struct MemoryTables {
    tables: HashMap<String, Table>,
    pending: Vec<ChangeEvent>,
}

impl MemoryTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table (no-op when it exists).
    pub fn provision(&mut self, table: &str) {
        self.tables.entry(table.to_string()).or_default();
    }

    /// Require the column combination to be unique within the table.
    pub fn add_unique(&mut self, table: &str, columns: &[&str]) -> GatewayResult<()> {
        let t = self.table_mut(table)?;
        t.unique
            .push(columns.iter().map(|c| c.to_string()).collect());
        Ok(())
    }

    /// Remove a table and its rows.
    pub fn drop_table(&mut self, table: &str) {
        self.tables.remove(table);
    }

    pub fn is_provisioned(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Rows matching the query, ordered and limited.
    pub fn select(&self, table: &str, query: &Query) -> GatewayResult<Vec<Record>> {
        let t = self.table(table)?;
        let mut rows: Vec<Record> = t
            .rows
            .iter()
            .filter(|row| query.filter.matches(row))
            .cloned()
            .collect();
        rows.sort_by(|a, b| query.compare(a, b));
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(match projection(query.select.as_deref()) {
            Some(columns) => rows.into_iter().map(|row| project(row, &columns)).collect(),
            None => rows,
        })
    }

    /// Number of rows matching the filter.
    pub fn count(&self, table: &str, filter: &Filter) -> GatewayResult<usize> {
        Ok(self
            .table(table)?
            .rows
            .iter()
            .filter(|row| filter.matches(row))
            .count())
    }

    /// Insert one row, filling `id` and `created_at` when absent.
    pub fn insert(&mut self, table: &str, record: Record) -> GatewayResult<Record> {
        let Value::Object(mut row) = record else {
            return Err(GatewayError::Validation(format!(
                "{table}: record must be a JSON object"
            )));
        };
        if !row.contains_key("id") {
            row.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        if !row.contains_key("created_at") {
            row.insert("created_at".to_string(), Value::String(timestamp()));
        }
        let row = Value::Object(row);

        let t = self.table_mut(table)?;
        check_unique(table, t, &row, None)?;
        t.rows.push(row.clone());
        self.pending.push(ChangeEvent::insert(table, row.clone()));
        Ok(row)
    }

    /// Merge `patch` into every matching row.
    pub fn update(&mut self, table: &str, filter: &Filter, patch: Record) -> GatewayResult<Vec<Record>> {
        let Value::Object(patch) = patch else {
            return Err(GatewayError::Validation(format!(
                "{table}: patch must be a JSON object"
            )));
        };
        let t = self.table_mut(table)?;

        let mut updates = Vec::new();
        for (index, row) in t.rows.iter().enumerate() {
            if filter.matches(row) {
                let mut merged = row.clone();
                if let Value::Object(fields) = &mut merged {
                    for (key, value) in &patch {
                        fields.insert(key.clone(), value.clone());
                    }
                }
                check_unique(table, t, &merged, Some(index))?;
                updates.push((index, merged));
            }
        }

        let mut updated = Vec::with_capacity(updates.len());
        let mut events = Vec::with_capacity(updates.len());
        for (index, merged) in updates {
            let old = std::mem::replace(&mut t.rows[index], merged.clone());
            events.push(ChangeEvent::update(table, Some(old), merged.clone()));
            updated.push(merged);
        }
        self.pending.extend(events);
        Ok(updated)
    }

    /// Remove every matching row.
    pub fn delete(&mut self, table: &str, filter: &Filter) -> GatewayResult<Vec<Record>> {
        let t = self.table_mut(table)?;
        let (removed, kept): (Vec<Record>, Vec<Record>) =
            t.rows.drain(..).partition(|row| filter.matches(row));
        t.rows = kept;
        for row in &removed {
            self.pending.push(ChangeEvent::delete(table, row.clone()));
        }
        Ok(removed)
    }

    fn take_changes(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.pending)
    }

    fn table(&self, table: &str) -> GatewayResult<&Table> {
        self.tables.get(table).ok_or_else(|| not_provisioned(table))
    }

    fn table_mut(&mut self, table: &str) -> GatewayResult<&mut Table> {
        self.tables.get_mut(table).ok_or_else(|| not_provisioned(table))
    }
}

fn not_provisioned(table: &str) -> GatewayError {
    GatewayError::NotProvisioned(format!("relation \"{table}\" does not exist"))
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn check_unique(table: &str, t: &Table, row: &Value, skip: Option<usize>) -> GatewayResult<()> {
    let id_key = vec!["id".to_string()];
    for columns in std::iter::once(&id_key).chain(t.unique.iter()) {
        let values: Vec<&Value> = columns
            .iter()
            .map(|c| row.get(c).unwrap_or(&Value::Null))
            .collect();
        if values.iter().any(|v| v.is_null()) {
            continue;
        }
        let clash = t.rows.iter().enumerate().any(|(index, existing)| {
            Some(index) != skip
                && columns.iter().zip(&values).all(|(c, v)| {
                    compare_values(existing.get(c).unwrap_or(&Value::Null), v).is_eq()
                })
        });
        if clash {
            return Err(GatewayError::Conflict(format!(
                "duplicate key value violates unique constraint \"{table}_{}_key\"",
                columns.join("_")
            )));
        }
    }
    Ok(())
}

fn projection(select: Option<&str>) -> Option<Vec<String>> {
    let select = select?.trim();
    if select.is_empty() || select == "*" {
        return None;
    }
    Some(
        select
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty() && !c.contains('('))
            .map(str::to_string)
            .collect(),
    )
}

fn project(row: Record, columns: &[String]) -> Record {
    match row {
        Value::Object(fields) => {
            let kept: Map<String, Value> = fields
                .into_iter()
                .filter(|(key, _)| columns.iter().any(|c| c == key))
                .collect();
            Value::Object(kept)
        }
        other => other,
    }
}

/// Gateway over [`MemoryTables`], with call recording and failure injection
/// for tests.
pub struct MemoryGateway {
    tables: Mutex<MemoryTables>,
    procedures: RwLock<HashMap<String, Procedure>>,
    access_token: RwLock<Option<String>>,
    failures: RwLock<HashMap<String, u16>>,
    calls: Mutex<Vec<String>>,
    feed: Option<Arc<LocalChangeFeed>>,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    /// A gateway with nothing provisioned.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(MemoryTables::new()),
            procedures: RwLock::new(HashMap::new()),
            access_token: RwLock::new(None),
            failures: RwLock::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            feed: None,
        }
    }

    /// A gateway with the full insights schema: articles, comments, likes
    /// and user profiles, their unique constraints, and the standard
    /// procedures.
    pub fn provisioned() -> Self {
        let gateway = Self::new();
        {
            let mut t = gateway.tables.lock();
            for table in [
                tables::ARTICLES,
                tables::COMMENTS,
                tables::LIKES,
                tables::USER_PROFILES,
            ] {
                t.provision(table);
            }
            // Tables were provisioned just above.
            let _ = t.add_unique(tables::ARTICLES, &["slug"]);
            let _ = t.add_unique(tables::LIKES, &["blog_id", "user_id"]);
        }
        for (name, procedure) in procedures::standard() {
            gateway.register_procedure(name, procedure);
        }
        gateway
    }

    /// Publish committed changes to `feed`.
    pub fn with_change_feed(mut self, feed: Arc<LocalChangeFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn provision_table(&self, table: &str) {
        self.tables.lock().provision(table);
    }

    pub fn drop_table(&self, table: &str) {
        self.tables.lock().drop_table(table);
    }

    pub fn register_procedure(&self, name: &str, procedure: Procedure) {
        self.procedures.write().insert(name.to_string(), procedure);
    }

    pub fn remove_procedure(&self, name: &str) {
        self.procedures.write().remove(name);
    }

    /// Insert rows without publishing change events.
    pub fn seed(&self, table: &str, rows: Vec<Record>) -> GatewayResult<()> {
        let mut t = self.tables.lock();
        for row in rows {
            t.insert(table, row)?;
        }
        t.take_changes();
        Ok(())
    }

    /// Snapshot of a table's rows (empty when unprovisioned).
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .lock()
            .select(table, &Query::all())
            .unwrap_or_default()
    }

    /// Fail every operation on `target` (a collection name, or `rpc/<name>`)
    /// with the given HTTP status until cleared.
    pub fn inject_failure(&self, target: &str, status: u16) {
        self.failures.write().insert(target.to_string(), status);
    }

    pub fn clear_failure(&self, target: &str) {
        self.failures.write().remove(target);
    }

    /// Operations performed so far, as `"<op> <target>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Token requests currently run with.
    pub fn access_token(&self) -> Option<String> {
        self.access_token.read().clone()
    }

    /// The signed-in user, if any. The access token is the user id.
    fn caller(&self) -> Option<String> {
        self.access_token.read().clone()
    }

    fn begin(&self, op: &str, target: &str) -> GatewayResult<()> {
        self.calls.lock().push(format!("{op} {target}"));
        match self.failures.read().get(target) {
            Some(status) => Err(GatewayError::Api {
                status: *status,
                code: None,
                message: format!("injected failure on {target}"),
            }),
            None => Ok(()),
        }
    }

    /// Run `op` under the table lock, then publish what it committed.
    fn commit<T>(
        &self,
        op: impl FnOnce(&mut MemoryTables) -> GatewayResult<T>,
    ) -> GatewayResult<T> {
        let (result, changes) = {
            let mut t = self.tables.lock();
            let result = op(&mut t);
            let changes = t.take_changes();
            (result, changes)
        };
        // A failed operation may still have committed earlier steps.
        if let Some(feed) = &self.feed {
            for change in changes {
                feed.publish(change);
            }
        }
        result
    }
}

impl std::fmt::Debug for MemoryGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let procedures: Vec<String> = self.procedures.read().keys().cloned().collect();
        f.debug_struct("MemoryGateway")
            .field("procedures", &procedures)
            .field("publishes_changes", &self.feed.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn read(&self, collection: &str, query: &Query) -> GatewayResult<Vec<Record>> {
        self.begin("read", collection)?;
        self.tables.lock().select(collection, query)
    }

    async fn read_one(&self, collection: &str, filter: &Filter) -> GatewayResult<Record> {
        self.begin("read_one", collection)?;
        let rows = self
            .tables
            .lock()
            .select(collection, &Query::filtered(filter.clone()))?;
        match <[Record; 1]>::try_from(rows) {
            Ok([row]) => Ok(row),
            Err(_) => Err(GatewayError::NotFound {
                collection: collection.to_string(),
            }),
        }
    }

    async fn write(&self, collection: &str, record: Record) -> GatewayResult<Record> {
        self.begin("write", collection)?;
        self.commit(|t| t.insert(collection, record))
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Record,
    ) -> GatewayResult<Vec<Record>> {
        self.begin("update", collection)?;
        self.commit(|t| t.update(collection, filter, patch))
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> GatewayResult<Vec<Record>> {
        self.begin("delete", collection)?;
        self.commit(|t| t.delete(collection, filter))
    }

    async fn call(&self, procedure: &str, args: Value) -> GatewayResult<Value> {
        self.begin("call", &format!("rpc/{procedure}"))?;
        let Some(handler) = self.procedures.read().get(procedure).cloned() else {
            return Err(GatewayError::NotProvisioned(format!(
                "function public.{procedure} does not exist"
            )));
        };
        let caller = self.caller();
        debug!(procedure, signed_in = caller.is_some(), "Calling in-memory procedure");
        self.commit(|t| handler(t, caller.as_deref(), &args))
    }

    fn set_access_token(&self, access_token: Option<String>) {
        *self.access_token.write() = access_token;
    }
}
