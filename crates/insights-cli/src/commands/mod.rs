//! CLI command implementations.

mod articles;
mod engage;
mod watch;

pub use articles::{create, delete, feature, featured, list, publish, show, CreateForm};
pub use engage::{comment, like};
pub use watch::watch;

use crate::output::{self, OutputFormat};
use anyhow::{bail, Context, Result};
use insights_config::{default_config_path, init_logging, Config};
use insights_model::{Article, AuthUser};
use insights_store::{
    guard_route, AppContext, Backend, RouteDecision, StoreFailure, DEMO_ADMIN_EMAIL,
    DEMO_PASSWORD, DEMO_USER_EMAIL,
};
use serde_json::json;
use std::path::Path;
use tracing::debug;

const ENV_EMAIL: &str = "INSIGHTS_EMAIL";
const ENV_PASSWORD: &str = "INSIGHTS_PASSWORD";

/// Path guarded for editor commands.
const EDITOR_ROUTE: &str = "/admin/dashboard";

/// Load configuration, start logging and build the application context.
pub async fn connect(config_path: Option<&Path>, log_level: Option<&str>) -> Result<AppContext> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };
    let config =
        Config::load(&path).with_context(|| format!("Failed to load {}", path.display()))?;
    init_logging(log_level.unwrap_or(&config.log_level));
    debug!(path = %path.display(), "Configuration loaded");

    let ctx = AppContext::from_config(config)?;
    ctx.initialize().await;
    Ok(ctx)
}

/// The signed-in user, signing in from the environment when needed.
async fn require_user(ctx: &AppContext) -> Result<AuthUser> {
    if let Some(user) = ctx.auth.snapshot().user {
        return Ok(user);
    }

    let credentials = (std::env::var(ENV_EMAIL), std::env::var(ENV_PASSWORD));
    let (Ok(email), Ok(password)) = credentials else {
        let mut message = format!("Sign in required: set {ENV_EMAIL} and {ENV_PASSWORD}");
        if ctx.backend() == Backend::Mock {
            message.push_str(&format!(
                " (sample accounts: {DEMO_ADMIN_EMAIL} or {DEMO_USER_EMAIL}, password {DEMO_PASSWORD})"
            ));
        }
        bail!(message);
    };

    let user = ctx
        .sign_in(email.trim(), &password)
        .await
        .context("Sign in failed")?;
    Ok(user)
}

/// Sign in and pass the admin-area guard.
async fn require_editor(ctx: &AppContext) -> Result<AuthUser> {
    let user = require_user(ctx).await?;
    let state = ctx.auth.snapshot();
    if let RouteDecision::Redirect(to) = guard_route(EDITOR_ROUTE, &state) {
        bail!("Editor access denied, sign in at {to}");
    }
    if !state.can_access_admin() {
        debug!(user_id = %user.id, "Signed-in user has no admin role, the backend may reject edits");
    }
    Ok(user)
}

/// Focus the article with `slug` and return it.
async fn find_article(ctx: &AppContext, slug: &str) -> Result<Article> {
    ctx.articles.fetch_by_slug(slug).await;
    let state = ctx.articles.snapshot();
    match (state.current, state.error) {
        (Some(article), _) if article.slug == slug => Ok(article),
        (_, Some(failure)) => bail!("Could not load article {slug:?}: {failure}"),
        _ => bail!("No article with slug {slug:?}"),
    }
}

fn fail_on(error: Option<StoreFailure>) -> Result<()> {
    match error {
        Some(failure) => bail!("{failure}"),
        None => Ok(()),
    }
}

/// Show the backend in use and the signed-in user.
pub fn status(ctx: &AppContext, format: OutputFormat) -> Result<()> {
    let state = ctx.auth.snapshot();
    let backend = match ctx.backend() {
        Backend::Hosted => "hosted",
        Backend::Mock => "mock",
    };

    match format {
        OutputFormat::Json => output::print_json(&json!({
            "backend": backend,
            "auth": state,
        })),
        OutputFormat::Text => {
            output::print_heading("Insights status");
            output::print_row("Backend", backend);
            match &state.user {
                Some(user) => {
                    output::print_row("Signed in", user.email.as_deref().unwrap_or(user.id.as_str()));
                    output::print_row("Admin", if state.is_admin { "yes" } else { "no" });
                }
                None => output::print_row("Signed in", "no"),
            }
            Ok(())
        }
    }
}
