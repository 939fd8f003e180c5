//! Likes and comments.

use super::{find_article, require_user};
use crate::output::{self, OutputFormat};
use anyhow::{bail, Result};
use insights_model::CommentId;
use insights_store::{AppContext, ToggleOutcome};
use serde_json::json;

/// Toggle the signed-in user's like on an article.
pub async fn like(ctx: &AppContext, slug: &str, format: OutputFormat) -> Result<()> {
    require_user(ctx).await?;
    let article = find_article(ctx, slug).await?;

    let likes = ctx.like_state(article.id.clone());
    likes.refresh().await;

    match likes.toggle().await {
        ToggleOutcome::Applied(toggle) => match format {
            OutputFormat::Json => output::print_json(&toggle),
            OutputFormat::Text => {
                let verb = if toggle.liked { "Liked" } else { "Unliked" };
                println!("{verb} {} ({} likes)", article.slug, toggle.count);
                Ok(())
            }
        },
        ToggleOutcome::SignInRequired => bail!("Sign in required"),
        ToggleOutcome::Unavailable => bail!("Likes are not available on this backend"),
        ToggleOutcome::Failed(failure) => bail!("Like failed: {failure}"),
    }
}

/// Add a comment (or reply) to an article as the signed-in user.
pub async fn comment(
    ctx: &AppContext,
    slug: &str,
    body: &str,
    reply_to: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let user = require_user(ctx).await?;
    let article = find_article(ctx, slug).await?;
    let parent = reply_to.map(CommentId::from_string);

    let thread = ctx.comment_thread(article.id.clone());
    let Some(added) = thread.add(&user.id, body, parent.as_ref()).await? else {
        bail!("Comments are not available on this backend");
    };

    match format {
        OutputFormat::Json => output::print_json(&json!({
            "status": "success",
            "comment": added,
        })),
        OutputFormat::Text => {
            output::print_success(
                &format!("Comment {} added to {}", added.comment.id, article.slug),
                format,
            );
            Ok(())
        }
    }
}
