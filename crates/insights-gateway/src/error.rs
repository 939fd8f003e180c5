//! Gateway error types.
//!
//! Hosted-backend failures are classified into an [`ErrorKind`] in one place
//! ([`GatewayError::from_response`]) so every caller applies the same rules.

use serde::Deserialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Error codes meaning the table, column or procedure does not exist.
const NOT_PROVISIONED_CODES: &[&str] = &["PGRST202", "PGRST204", "PGRST205", "42P01", "42883"];
/// Single-row read matched no rows.
const NOT_FOUND_CODES: &[&str] = &["PGRST116"];
/// Unique violation.
const CONFLICT_CODES: &[&str] = &["23505"];
/// Invalid text representation, not-null violation, check violation.
const VALIDATION_CODES: &[&str] = &["22P02", "23502", "23514"];

/// Coarse classification of a gateway failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Network, auth or server failure. Retry is user-initiated.
    Transport,
    /// A requested single record does not exist.
    NotFound,
    /// The backend feature (table, procedure) is absent.
    NotProvisioned,
    /// Input was rejected before or by the backend.
    Validation,
    /// Uniqueness violation.
    Conflict,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NotProvisioned => "not_provisioned",
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
        };
        f.write_str(label)
    }
}

/// Error type for all gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network or transport-level HTTP error from reqwest.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with an unclassified failure.
    #[error("Backend error: {status} {code:?} - {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// A single-record read matched nothing.
    #[error("No {collection} record matches the filter")]
    NotFound { collection: String },

    /// The table or procedure is not provisioned on this backend.
    #[error("Not provisioned: {0}")]
    NotProvisioned(String),

    /// Input failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Uniqueness constraint violation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A remote procedure ran but reported failure in its payload.
    #[error("Procedure {procedure} failed: {message}")]
    Procedure { procedure: String, message: String },

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid endpoint URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct BackendErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl GatewayError {
    /// Classify a failed backend response.
    pub fn from_response(status: u16, body: &str, collection: &str) -> Self {
        let parsed = serde_json::from_str::<BackendErrorBody>(body).ok();
        let code = parsed.as_ref().and_then(|b| b.code.clone());
        let message = parsed
            .and_then(|b| b.message)
            .unwrap_or_else(|| summarize_response_body(body));

        let has_code = |codes: &[&str]| code.as_deref().is_some_and(|c| codes.contains(&c));

        if has_code(NOT_PROVISIONED_CODES) {
            GatewayError::NotProvisioned(format!("{collection}: {message}"))
        } else if has_code(NOT_FOUND_CODES) || status == 406 {
            GatewayError::NotFound {
                collection: collection.to_string(),
            }
        } else if has_code(CONFLICT_CODES) || status == 409 {
            GatewayError::Conflict(message)
        } else if has_code(VALIDATION_CODES) {
            GatewayError::Validation(message)
        } else if status == 404 {
            GatewayError::NotProvisioned(format!("{collection}: HTTP 404"))
        } else {
            GatewayError::Api {
                status,
                code,
                message,
            }
        }
    }

    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::NotFound { .. } => ErrorKind::NotFound,
            GatewayError::NotProvisioned(_) => ErrorKind::NotProvisioned,
            GatewayError::Validation(_) => ErrorKind::Validation,
            GatewayError::Conflict(_) => ErrorKind::Conflict,
            GatewayError::Http(_)
            | GatewayError::Api { .. }
            | GatewayError::Procedure { .. }
            | GatewayError::Json(_)
            | GatewayError::InvalidUrl(_) => ErrorKind::Transport,
        }
    }

    pub fn is_not_provisioned(&self) -> bool {
        self.kind() == ErrorKind::NotProvisioned
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// Returns true if the failure is transient and a retry may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                e.status().is_some_and(|s| s.is_server_error())
            }
            GatewayError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias using GatewayError.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Length and digest of a response body, safe to log.
pub fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}
