//! Articles and their attachments.

use crate::{ArticleId, Keyed};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An image attached to an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ImageRefRepr")]
pub struct ImageRef {
    /// Public URL of the image.
    pub url: String,
    /// Alternative text (the uploaded file name by default).
    #[serde(default)]
    pub alt: Option<String>,
}

/// Older rows store images as bare URL strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum ImageRefRepr {
    Url(String),
    Full {
        url: String,
        #[serde(default)]
        alt: Option<String>,
    },
}

impl From<ImageRefRepr> for ImageRef {
    fn from(repr: ImageRefRepr) -> Self {
        match repr {
            ImageRefRepr::Url(url) => Self { url, alt: None },
            ImageRefRepr::Full { url, alt } => Self { url, alt },
        }
    }
}

/// The single PDF an article may carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfRef {
    /// Public URL of the document.
    pub url: String,
    /// Display name (the uploaded file name).
    pub name: String,
}

/// A published or draft article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    /// Unique, derived from the title at creation time.
    pub slug: String,
    /// Body text.
    pub content: String,
    /// Author display name.
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub pdf_name: Option<String>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Article {
    /// The attached PDF, if both URL and name are present.
    pub fn pdf(&self) -> Option<PdfRef> {
        match (&self.pdf_url, &self.pdf_name) {
            (Some(url), Some(name)) => Some(PdfRef {
                url: url.clone(),
                name: name.clone(),
            }),
            (Some(url), None) => Some(PdfRef {
                url: url.clone(),
                name: "document.pdf".to_string(),
            }),
            _ => None,
        }
    }

    /// Case-insensitive substring match against title, body, author or any tag.
    ///
    /// A blank term matches every article.
    pub fn matches_search(&self, term: &str) -> bool {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }

        self.title.to_lowercase().contains(&needle)
            || self.content.to_lowercase().contains(&needle)
            || self.author.to_lowercase().contains(&needle)
            || self
                .tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(&needle))
    }

    /// Exact tag membership.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

impl Keyed for Article {
    fn key(&self) -> &str {
        self.id.as_str()
    }
}

/// Split comma-separated tag input, trimming and dropping empty entries.
pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}
