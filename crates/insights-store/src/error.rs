//! Application context errors.

use thiserror::Error;

/// Failures while assembling or tearing down an [`AppContext`](crate::AppContext).
#[derive(Error, Debug)]
pub enum ContextError {
    /// Configuration error
    #[error(transparent)]
    Core(#[from] insights_config::CoreError),

    /// Gateway error
    #[error(transparent)]
    Gateway(#[from] insights_gateway::GatewayError),

    /// Realtime error
    #[error(transparent)]
    Realtime(#[from] insights_realtime::RealtimeError),

    /// Authentication error
    #[error(transparent)]
    Auth(#[from] insights_auth::AuthError),
}

/// Result type alias using ContextError.
pub type ContextResult<T> = Result<T, ContextError>;
