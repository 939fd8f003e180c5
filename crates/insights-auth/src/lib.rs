//! Authentication for the insights client.
//!
//! This crate provides:
//! - The [`AuthService`] contract consumed by the stores (sign-in, sign-out,
//!   current session, session-change stream, OAuth authorize URLs)
//! - [`SupabaseAuth`], the hosted `/auth/v1` implementation with token
//!   refresh driven by an explicit state machine
//! - [`MemoryAuth`], an in-process implementation for mock mode and tests

mod auth_fsm;
mod error;
mod memory;
mod service;
mod supabase;

pub use auth_fsm::auth_machine;
pub use auth_fsm::{AuthMachine, AuthMachineInput, AuthMachineState, AuthState, RefreshConfig};
pub use error::{AuthError, AuthResult};
pub use memory::MemoryAuth;
pub use service::{AuthService, OAuthProvider, SessionEvent, SessionEventKind};
pub use supabase::SupabaseAuth;
