//! The authentication contract.

use crate::AuthResult;
use async_trait::async_trait;
use insights_model::Session;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use url::Url;

/// Capacity of session-change channels.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 32;

/// External identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Github,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Github => "github",
        }
    }

    /// Extra authorize parameters for the provider.
    ///
    /// Google is asked for offline access and an explicit consent screen so a
    /// refresh token is always issued.
    pub fn query_params(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            OAuthProvider::Google => &[("access_type", "offline"), ("prompt", "consent")],
            OAuthProvider::Github => &[],
        }
    }
}

impl std::str::FromStr for OAuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(OAuthProvider::Google),
            "github" => Ok(OAuthProvider::Github),
            other => Err(format!("unsupported provider: {other}")),
        }
    }
}

/// What happened to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// A session change, carrying the session as of the change.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    /// `None` after sign-out or a failed refresh.
    pub session: Option<Session>,
}

impl SessionEvent {
    pub fn signed_in(session: Session) -> Self {
        Self {
            kind: SessionEventKind::SignedIn,
            session: Some(session),
        }
    }

    pub fn refreshed(session: Session) -> Self {
        Self {
            kind: SessionEventKind::TokenRefreshed,
            session: Some(session),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            kind: SessionEventKind::SignedOut,
            session: None,
        }
    }
}

/// Authentication service consumed by the auth store.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Email/password sign-in. Emits [`SessionEventKind::SignedIn`].
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session>;

    /// End the current session. Emits [`SessionEventKind::SignedOut`].
    async fn sign_out(&self) -> AuthResult<()>;

    /// The current session, refreshed first when it has expired.
    async fn get_session(&self) -> AuthResult<Option<Session>>;

    /// Stream of session changes from now on.
    fn on_session_change(&self) -> broadcast::Receiver<SessionEvent>;

    /// Browser URL that starts an OAuth sign-in and returns to `redirect_to`.
    fn oauth_authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> AuthResult<Url>;
}
