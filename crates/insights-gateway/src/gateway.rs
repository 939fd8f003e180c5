//! The record-store gateway contract.

use crate::{Filter, GatewayError, GatewayResult, Query};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// An untyped backend row (a JSON object).
pub type Record = Value;

/// Uniform access to the logical record stores ("articles", "likes",
/// "comments", "user_profiles") and to remote procedures.
///
/// `read` returning an empty list is a legitimate result; a single-record
/// miss is reported by `read_one` as [`GatewayError::NotFound`].
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Read every record matching the query.
    async fn read(&self, collection: &str, query: &Query) -> GatewayResult<Vec<Record>>;

    /// Read exactly one record.
    async fn read_one(&self, collection: &str, filter: &Filter) -> GatewayResult<Record>;

    /// Insert a record and return it as stored (with generated fields).
    async fn write(&self, collection: &str, record: Record) -> GatewayResult<Record>;

    /// Patch every matching record; returns the updated rows.
    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Record,
    ) -> GatewayResult<Vec<Record>>;

    /// Delete every matching record; returns the removed rows.
    async fn delete(&self, collection: &str, filter: &Filter) -> GatewayResult<Vec<Record>>;

    /// Invoke a named remote procedure with JSON arguments.
    async fn call(&self, procedure: &str, args: Value) -> GatewayResult<Value>;

    /// Act as the given user (access token) or anonymously (`None`).
    fn set_access_token(&self, access_token: Option<String>);
}

/// Typed helpers over any [`Gateway`].
#[async_trait]
pub trait GatewayExt: Gateway {
    /// Read and decode every matching record.
    async fn read_as<T: DeserializeOwned + Send>(
        &self,
        collection: &str,
        query: &Query,
    ) -> GatewayResult<Vec<T>> {
        let rows = self.read(collection, query).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(GatewayError::from))
            .collect()
    }

    /// Read and decode exactly one record.
    async fn read_one_as<T: DeserializeOwned + Send>(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> GatewayResult<T> {
        let row = self.read_one(collection, filter).await?;
        Ok(serde_json::from_value(row)?)
    }

    /// Like `read_one_as`, mapping a miss to `None`.
    async fn find_one_as<T: DeserializeOwned + Send>(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> GatewayResult<Option<T>> {
        match self.read_one_as(collection, filter).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Encode, insert and decode the stored record.
    async fn write_as<T, R>(&self, collection: &str, record: &T) -> GatewayResult<R>
    where
        T: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        let stored = self.write(collection, serde_json::to_value(record)?).await?;
        Ok(serde_json::from_value(stored)?)
    }

    /// Call a procedure and decode its result.
    async fn call_as<R: DeserializeOwned + Send>(
        &self,
        procedure: &str,
        args: Value,
    ) -> GatewayResult<R> {
        let value = self.call(procedure, args).await?;
        Ok(serde_json::from_value(value)?)
    }
}

impl<G: Gateway + ?Sized> GatewayExt for G {}
