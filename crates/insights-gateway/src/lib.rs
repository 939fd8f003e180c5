//! # insights-gateway
//!
//! A uniform request/response wrapper around the hosted backend. Callers see
//! five record operations (`read`, `read_one`, `write`, `update`, `delete`)
//! plus remote procedure calls, and a typed error whose [`ErrorKind`]
//! separates transport failures, missing single records, absent backend
//! features, validation failures and uniqueness conflicts.
//!
//! ```text
//! accessors / stores → Gateway → SupabaseGateway → PostgREST (/rest/v1)
//!                              ↘ MemoryGateway   → in-process tables (+ LocalChangeFeed)
//! ```

mod error;
mod gateway;
mod memory;
mod postgrest;
mod query;
mod storage;

pub use error::{summarize_response_body, ErrorKind, GatewayError, GatewayResult};
pub use gateway::{Gateway, GatewayExt, Record};
pub use memory::{MemoryGateway, MemoryTables, Procedure};
pub use postgrest::SupabaseGateway;
pub use query::{Condition, Filter, Order, Query};
pub use storage::{MemoryStorage, ObjectStorage, StoredObject, SupabaseStorage};
