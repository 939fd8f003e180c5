//! Authentication state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐  SessionRestored   ┌─────────────────┐
//! │   NotLoggedIn   │ ─────────────────► │    LoggedIn     │
//! └────────┬────────┘                    └──┬──────┬───────┘
//!          │ LoginAttempt                   │      │ TokenExpired
//!          ▼                                │      ▼
//! ┌─────────────────┐  LoginSuccess         │  ┌─────────────────┐
//! │   LoggingIn     │ ──────────────────────┘  │   Refreshing    │ ◄─┐ RefreshRetry
//! └─────────────────┘                          └───┬─────────┬───┘ ──┘
//!          LoginFailed ─► NotLoggedIn              │         │
//!                                     RefreshSuccess         RefreshFailed
//!                                      ─► LoggedIn           ─► NotLoggedIn
//!
//! LoggedIn ─ LogoutRequested ─► LoggingOut ─ LogoutComplete ─► NotLoggedIn
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_machine(NotLoggedIn)

    NotLoggedIn => {
        LoginAttempt => LoggingIn,
        SessionRestored => LoggedIn
    },
    LoggingIn => {
        LoginSuccess => LoggedIn,
        LoginFailed => NotLoggedIn
    },
    LoggedIn => {
        // Signing in as someone else replaces the session
        LoginAttempt => LoggingIn,
        SessionRestored => LoggedIn,
        TokenExpired => Refreshing,
        LogoutRequested => LoggingOut
    },
    Refreshing => {
        RefreshSuccess => LoggedIn,
        RefreshRetry => Refreshing,
        RefreshFailed => NotLoggedIn
    },
    LoggingOut => {
        LogoutComplete => NotLoggedIn
    }
}

pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

/// Simplified view of the machine state for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    NotLoggedIn,
    LoggingIn,
    LoggedIn,
    Refreshing,
    LoggingOut,
}

impl AuthState {
    /// A usable session is held.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::LoggedIn)
    }

    /// An auth request is in flight.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthState::LoggingIn | AuthState::Refreshing | AuthState::LoggingOut
        )
    }
}

impl From<&AuthMachineState> for AuthState {
    fn from(state: &AuthMachineState) -> Self {
        match state {
            AuthMachineState::NotLoggedIn => AuthState::NotLoggedIn,
            AuthMachineState::LoggingIn => AuthState::LoggingIn,
            AuthMachineState::LoggedIn => AuthState::LoggedIn,
            AuthMachineState::Refreshing => AuthState::Refreshing,
            AuthMachineState::LoggingOut => AuthState::LoggingOut,
        }
    }
}

/// Configuration for retry behavior during token refresh.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Maximum number of attempts.
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RefreshConfig {
    /// Backoff before retry `attempt` (0-indexed), capped at `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .initial_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_not_logged_in() {
        let machine = AuthMachine::new();
        assert_eq!(*machine.state(), AuthMachineState::NotLoggedIn);
    }

    #[test]
    fn test_login_flow() {
        let mut machine = AuthMachine::new();
        machine.consume(&AuthMachineInput::LoginAttempt).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::LoggingIn);
        machine.consume(&AuthMachineInput::LoginSuccess).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::LoggedIn);
    }

    #[test]
    fn test_login_failure_returns_to_not_logged_in() {
        let mut machine = AuthMachine::new();
        machine.consume(&AuthMachineInput::LoginAttempt).unwrap();
        machine.consume(&AuthMachineInput::LoginFailed).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::NotLoggedIn);
    }

    #[test]
    fn test_restored_session_is_logged_in() {
        let mut machine = AuthMachine::new();
        machine.consume(&AuthMachineInput::SessionRestored).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::LoggedIn);
    }

    #[test]
    fn test_refresh_retry_then_success() {
        let mut machine = AuthMachine::new();
        machine.consume(&AuthMachineInput::SessionRestored).unwrap();
        machine.consume(&AuthMachineInput::TokenExpired).unwrap();
        machine.consume(&AuthMachineInput::RefreshRetry).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::Refreshing);
        machine.consume(&AuthMachineInput::RefreshSuccess).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::LoggedIn);
    }

    #[test]
    fn test_refresh_failure_logs_out() {
        let mut machine = AuthMachine::new();
        machine.consume(&AuthMachineInput::SessionRestored).unwrap();
        machine.consume(&AuthMachineInput::TokenExpired).unwrap();
        machine.consume(&AuthMachineInput::RefreshFailed).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::NotLoggedIn);
    }

    #[test]
    fn test_logout_flow() {
        let mut machine = AuthMachine::new();
        machine.consume(&AuthMachineInput::LoginAttempt).unwrap();
        machine.consume(&AuthMachineInput::LoginSuccess).unwrap();
        machine.consume(&AuthMachineInput::LogoutRequested).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::LoggingOut);
        machine.consume(&AuthMachineInput::LogoutComplete).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::NotLoggedIn);
    }

    #[test]
    fn test_invalid_transition_returns_error() {
        let mut machine = AuthMachine::new();
        assert!(machine.consume(&AuthMachineInput::LogoutRequested).is_err());
        assert!(machine.consume(&AuthMachineInput::LoginSuccess).is_err());
        assert!(machine.consume(&AuthMachineInput::TokenExpired).is_err());
    }

    #[test]
    fn test_auth_state_flags() {
        assert!(AuthState::LoggedIn.is_authenticated());
        assert!(!AuthState::Refreshing.is_authenticated());
        assert!(AuthState::Refreshing.is_transient());
        assert!(!AuthState::NotLoggedIn.is_transient());
    }

    #[test]
    fn test_refresh_config_delay_exponential_backoff() {
        let config = RefreshConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(5000));
        assert_eq!(config.delay_for_attempt(40), Duration::from_millis(5000));
    }
}
