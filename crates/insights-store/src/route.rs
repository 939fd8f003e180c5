//! Admin-area routing decision.

use crate::AuthState;

/// Where unauthenticated visitors of the admin area are sent.
pub const ADMIN_LOGIN_PATH: &str = "/admin/login";

const ADMIN_PREFIX: &str = "/admin";

/// Outcome of [`guard_route`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    /// Navigate here instead, replacing the current history entry.
    Redirect(String),
}

/// Decide whether `path` may be shown for the given auth state.
///
/// Only the presence of a user is consulted; role checks belong to the admin
/// views themselves (see [`AuthState::can_access_admin`]). While the initial
/// session resolution is still loading the route is allowed, so a restored
/// session is not bounced to the login page.
pub fn guard_route(path: &str, auth: &AuthState) -> RouteDecision {
    let path = normalize(path);
    if !is_admin_path(path) || path == ADMIN_LOGIN_PATH {
        return RouteDecision::Allow;
    }
    if auth.user.is_some() || auth.is_loading {
        RouteDecision::Allow
    } else {
        RouteDecision::Redirect(ADMIN_LOGIN_PATH.to_string())
    }
}

fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

fn is_admin_path(path: &str) -> bool {
    path == ADMIN_PREFIX
        || path
            .strip_prefix(ADMIN_PREFIX)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_model::AuthUser;

    fn signed_out() -> AuthState {
        AuthState {
            is_loading: false,
            ..AuthState::default()
        }
    }

    fn signed_in() -> AuthState {
        AuthState {
            user: Some(AuthUser {
                id: "reader-1".into(),
                email: Some("reader@example.com".to_string()),
            }),
            is_loading: false,
            ..AuthState::default()
        }
    }

    #[test]
    fn public_paths_are_always_allowed() {
        for path in ["/", "/blogs", "/blog/5-ways", "/administrators"] {
            assert_eq!(guard_route(path, &signed_out()), RouteDecision::Allow, "{path}");
        }
    }

    #[test]
    fn admin_paths_redirect_without_user() {
        for path in [
            "/admin",
            "/admin/",
            "/admin/dashboard",
            "/admin/blog/new",
            "/admin/blog/edit/a1?tab=meta",
        ] {
            assert_eq!(
                guard_route(path, &signed_out()),
                RouteDecision::Redirect(ADMIN_LOGIN_PATH.to_string()),
                "{path}"
            );
        }
    }

    #[test]
    fn login_page_is_reachable_signed_out() {
        assert_eq!(guard_route("/admin/login", &signed_out()), RouteDecision::Allow);
        assert_eq!(guard_route("/admin/login/", &signed_out()), RouteDecision::Allow);
    }

    #[test]
    fn any_signed_in_user_passes_the_guard() {
        let state = signed_in();
        assert!(!state.can_access_admin());
        assert_eq!(guard_route("/admin/dashboard", &state), RouteDecision::Allow);
    }

    #[test]
    fn unresolved_session_is_not_redirected() {
        assert_eq!(
            guard_route("/admin/dashboard", &AuthState::default()),
            RouteDecision::Allow
        );
    }
}
