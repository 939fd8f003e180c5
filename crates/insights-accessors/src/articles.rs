//! Article reads and editor operations.

use chrono::Utc;
use insights_gateway::{Filter, Gateway, GatewayError, GatewayExt, GatewayResult, Query};
use insights_model::{parse_tags, tables, Article, ArticleId, ImageRef, PdfRef, Slug};
use serde_json::{json, Value};
use tracing::info;

/// Editor form contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleDraft {
    pub title: String,
    pub content: String,
    pub author: String,
    /// Comma-separated, as typed.
    pub tags: String,
    pub images: Vec<ImageRef>,
    pub pdf: Option<PdfRef>,
    pub published: bool,
    pub featured: bool,
}

impl ArticleDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    /// Slug for the draft's title. Validation error when the title is blank
    /// or has no alphanumerics.
    pub fn slug(&self) -> GatewayResult<Slug> {
        if self.title.trim().is_empty() {
            return Err(GatewayError::Validation("title is required".to_string()));
        }
        Slug::from_title(&self.title)
            .map_err(|e| GatewayError::Validation(format!("title {:?}: {e}", self.title)))
    }

    fn to_record(&self, slug: &Slug) -> Value {
        json!({
            "title": self.title.trim(),
            "slug": slug.as_str(),
            "content": self.content,
            "author": self.author.trim(),
            "tags": parse_tags(&self.tags),
            "images": self.images,
            "pdf_url": self.pdf.as_ref().map(|p| p.url.clone()),
            "pdf_name": self.pdf.as_ref().map(|p| p.name.clone()),
            "published": self.published,
            "featured": self.featured,
            "updated_at": Utc::now(),
        })
    }
}

impl From<&Article> for ArticleDraft {
    fn from(article: &Article) -> Self {
        Self {
            title: article.title.clone(),
            content: article.content.clone(),
            author: article.author.clone(),
            tags: article.tags.join(", "),
            images: article.images.clone(),
            pdf: article.pdf(),
            published: article.published,
            featured: article.featured,
        }
    }
}

/// Articles, newest first; only published ones when `published_only`.
pub async fn fetch_articles(gateway: &dyn Gateway, published_only: bool) -> GatewayResult<Vec<Article>> {
    let mut query = Query::all().order_desc("created_at");
    if published_only {
        query = query.eq("published", true);
    }
    gateway.read_as(tables::ARTICLES, &query).await
}

/// Up to `limit` published, featured articles, newest first.
pub async fn fetch_featured(gateway: &dyn Gateway, limit: usize) -> GatewayResult<Vec<Article>> {
    let query = Query::all()
        .eq("published", true)
        .eq("featured", true)
        .order_desc("created_at")
        .limit(limit);
    gateway.read_as(tables::ARTICLES, &query).await
}

/// The article with the given slug. Malformed slugs are rejected without a
/// request.
pub async fn fetch_by_slug(gateway: &dyn Gateway, slug: &str) -> GatewayResult<Article> {
    let slug = Slug::parse(slug)
        .map_err(|e| GatewayError::Validation(format!("slug {slug:?}: {e}")))?;
    gateway
        .read_one_as(tables::ARTICLES, &Filter::all().eq("slug", slug.as_str()))
        .await
}

pub async fn fetch_by_id(gateway: &dyn Gateway, id: &ArticleId) -> GatewayResult<Article> {
    gateway
        .read_one_as(tables::ARTICLES, &Filter::all().eq("id", id.as_str()))
        .await
}

/// Create an article from a draft; the slug is derived from the title.
pub async fn create_article(gateway: &dyn Gateway, draft: &ArticleDraft) -> GatewayResult<Article> {
    let slug = draft.slug()?;
    let article: Article = gateway
        .write_as(tables::ARTICLES, &draft.to_record(&slug))
        .await?;
    info!(id = %article.id, slug = %article.slug, "Article created");
    Ok(article)
}

/// Replace an article's editable fields; the slug is re-derived.
pub async fn update_article(
    gateway: &dyn Gateway,
    id: &ArticleId,
    draft: &ArticleDraft,
) -> GatewayResult<Article> {
    let slug = draft.slug()?;
    let article = patch_one(gateway, id, draft.to_record(&slug)).await?;
    info!(id = %article.id, slug = %article.slug, "Article updated");
    Ok(article)
}

pub async fn set_published(gateway: &dyn Gateway, id: &ArticleId, published: bool) -> GatewayResult<Article> {
    patch_one(gateway, id, json!({ "published": published, "updated_at": Utc::now() })).await
}

pub async fn set_featured(gateway: &dyn Gateway, id: &ArticleId, featured: bool) -> GatewayResult<Article> {
    patch_one(gateway, id, json!({ "featured": featured, "updated_at": Utc::now() })).await
}

/// Delete an article. Not found when no article has the id.
pub async fn delete_article(gateway: &dyn Gateway, id: &ArticleId) -> GatewayResult<()> {
    let removed = gateway
        .delete(tables::ARTICLES, &Filter::all().eq("id", id.as_str()))
        .await?;
    if removed.is_empty() {
        return Err(not_found());
    }
    info!(id = %id, "Article deleted");
    Ok(())
}

async fn patch_one(gateway: &dyn Gateway, id: &ArticleId, patch: Value) -> GatewayResult<Article> {
    let rows = gateway
        .update(tables::ARTICLES, &Filter::all().eq("id", id.as_str()), patch)
        .await?;
    let row = rows.into_iter().next().ok_or_else(not_found)?;
    Ok(serde_json::from_value(row)?)
}

fn not_found() -> GatewayError {
    GatewayError::NotFound {
        collection: tables::ARTICLES.to_string(),
    }
}
