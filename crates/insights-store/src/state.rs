//! Load lifecycle and recorded failures shared by the stores.

use insights_gateway::{ErrorKind, GatewayError};
use serde::Serialize;

/// Fetch lifecycle of a store: `Idle -> Loading -> {Ready, Errored}`,
/// re-entering `Loading` on every refetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Ready,
    Errored,
}

/// A failure recorded in store state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreFailure {
    #[serde(serialize_with = "serialize_kind")]
    pub kind: ErrorKind,
    pub message: String,
}

impl StoreFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&GatewayError> for StoreFailure {
    fn from(error: &GatewayError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

impl std::fmt::Display for StoreFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

fn serialize_kind<S: serde::Serializer>(kind: &ErrorKind, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(kind)
}
