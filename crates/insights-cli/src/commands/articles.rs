//! Article listing and editor commands.

use super::{fail_on, find_article, require_editor};
use crate::output::{self, OutputFormat};
use anyhow::{anyhow, Context, Result};
use insights_accessors::{upload_image, upload_pdf, ArticleDraft};
use insights_model::{Article, ArticleId};
use insights_store::AppContext;
use serde_json::json;
use std::path::{Path, PathBuf};

/// List articles with optional search, tag and page.
pub async fn list(
    ctx: &AppContext,
    search: Option<String>,
    tag: Option<String>,
    page: usize,
    all: bool,
    format: OutputFormat,
) -> Result<()> {
    ctx.articles.fetch_articles(!all).await;
    fail_on(ctx.articles.snapshot().error)?;

    if let Some(term) = search {
        ctx.articles.set_search(term);
    }
    ctx.articles.set_tag(tag);
    ctx.articles.set_page(page);
    let view = ctx.articles.snapshot().page_view();

    match format {
        OutputFormat::Json => output::print_json(&view),
        OutputFormat::Text => {
            if view.items.is_empty() {
                println!("No articles found");
            } else {
                println!("{:<12} {:<48} {}", "Date", "Title", "Slug");
                output::print_divider();
                for article in &view.items {
                    println!("{}", output::article_line(article));
                }
            }
            println!(
                "\nPage {} of {} ({} articles)",
                view.page,
                view.total_pages.max(1),
                view.total_items
            );
            Ok(())
        }
    }
}

/// List featured articles.
pub async fn featured(ctx: &AppContext, format: OutputFormat) -> Result<()> {
    ctx.articles.fetch_featured().await;
    let featured = ctx.articles.snapshot().featured;

    match format {
        OutputFormat::Json => output::print_json(&featured),
        OutputFormat::Text => {
            if featured.is_empty() {
                println!("No featured articles");
            }
            for article in &featured {
                println!("{}", output::article_line(article));
            }
            Ok(())
        }
    }
}

/// Show an article with its like count and comments.
pub async fn show(ctx: &AppContext, slug: &str, format: OutputFormat) -> Result<()> {
    let article = find_article(ctx, slug).await?;

    let likes = ctx.like_state(article.id.clone());
    likes.refresh().await;
    let thread = ctx.comment_thread(article.id.clone());
    thread.load().await;
    let likes = likes.snapshot();
    let thread = thread.snapshot();

    if format == OutputFormat::Json {
        return output::print_json(&json!({
            "article": article,
            "likes": likes,
            "comments": thread.comments,
        }));
    }

    print_article(&article);
    println!();
    let liked = if likes.liked { " (including you)" } else { "" };
    output::print_row("Likes", &format!("{}{}", likes.count, liked));

    output::print_heading(&format!("Comments ({})", thread.comments.len()));
    if let Some(failure) = &thread.error {
        println!("  Could not load comments: {failure}");
    }
    for entry in &thread.comments {
        let reply = if entry.comment.parent_id.is_some() { "  > " } else { "" };
        println!(
            "  {}{} ({}): {}",
            reply,
            entry.author.full_name,
            entry.comment.created_at.format("%Y-%m-%d %H:%M"),
            entry.comment.content
        );
    }
    Ok(())
}

fn print_article(article: &Article) {
    output::print_heading(&article.title);
    output::print_row("ID", article.id.as_str());
    output::print_row("Slug", &article.slug);
    if !article.author.is_empty() {
        output::print_row("Author", &article.author);
    }
    output::print_row("Date", &article.created_at.format("%Y-%m-%d").to_string());
    if !article.tags.is_empty() {
        output::print_row("Tags", &article.tags.join(", "));
    }
    let status = match (article.published, article.featured) {
        (true, true) => "published, featured",
        (true, false) => "published",
        (false, _) => "draft",
    };
    output::print_row("Status", status);
    for image in &article.images {
        output::print_row("Image", &image.url);
    }
    if let Some(pdf) = article.pdf() {
        output::print_row("PDF", &format!("{} ({})", pdf.name, pdf.url));
    }
    println!("\n{}", article.content);
}

/// Fields of the `create` command.
pub struct CreateForm {
    pub title: String,
    pub content: Option<String>,
    pub content_file: Option<PathBuf>,
    pub author: String,
    pub tags: String,
    pub images: Vec<PathBuf>,
    pub pdf: Option<PathBuf>,
    pub published: bool,
    pub featured: bool,
}

/// Create an article, uploading attachments first.
pub async fn create(ctx: &AppContext, form: CreateForm, format: OutputFormat) -> Result<()> {
    require_editor(ctx).await?;

    let content = match (form.content, &form.content_file) {
        (Some(content), _) => content,
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => String::new(),
    };

    let mut draft = ArticleDraft {
        author: form.author,
        tags: form.tags,
        published: form.published,
        featured: form.featured,
        ..ArticleDraft::new(form.title, content)
    };
    // Reject a bad title before uploading anything.
    draft.slug()?;

    for path in &form.images {
        let (name, bytes) = read_attachment(path).await?;
        draft.images.push(upload_image(ctx.storage.as_ref(), &name, bytes).await?);
    }
    if let Some(path) = &form.pdf {
        let (name, bytes) = read_attachment(path).await?;
        draft.pdf = Some(upload_pdf(ctx.storage.as_ref(), &name, bytes).await?);
    }

    let article = ctx.articles.create(&draft).await?;
    match format {
        OutputFormat::Json => output::print_json(&article),
        OutputFormat::Text => {
            output::print_success(
                &format!("Created {} ({})", article.slug, article.id),
                format,
            );
            Ok(())
        }
    }
}

async fn read_attachment(path: &Path) -> Result<(String, Vec<u8>)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("{} has no file name", path.display()))?
        .to_string();
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok((name, bytes))
}

/// Publish or unpublish an article.
pub async fn publish(ctx: &AppContext, id: &str, on: bool, format: OutputFormat) -> Result<()> {
    require_editor(ctx).await?;
    let article = ctx
        .articles
        .set_published(&ArticleId::from_string(id), on)
        .await?;
    let verb = if on { "Published" } else { "Unpublished" };
    output::print_success(&format!("{verb} {}", article.slug), format);
    Ok(())
}

/// Feature or unfeature an article.
pub async fn feature(ctx: &AppContext, id: &str, on: bool, format: OutputFormat) -> Result<()> {
    require_editor(ctx).await?;
    let article = ctx
        .articles
        .set_featured(&ArticleId::from_string(id), on)
        .await?;
    let verb = if on { "Featured" } else { "Unfeatured" };
    output::print_success(&format!("{verb} {}", article.slug), format);
    Ok(())
}

/// Delete an article.
pub async fn delete(ctx: &AppContext, id: &str, format: OutputFormat) -> Result<()> {
    require_editor(ctx).await?;
    ctx.articles.delete(&ArticleId::from_string(id)).await?;
    output::print_success(&format!("Deleted {id}"), format);
    Ok(())
}
