//! URL slugs.
//!
//! A slug is derived from an article title once, at creation time: lowercase,
//! every run of characters outside `[a-z0-9]` collapsed to a single `-`, and
//! no leading or trailing `-`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Slug validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlugError {
    /// The input was empty (or the title had no alphanumeric characters).
    #[error("slug is empty")]
    Empty,
    /// The input contained a character outside `[a-z0-9-]`.
    #[error("slug contains invalid character {0:?}")]
    InvalidChar(char),
    /// The input started or ended with a separator, or had two in a row.
    #[error("slug has a misplaced separator")]
    MisplacedSeparator,
}

/// Derive the slug for a title.
///
/// Returns an empty string when the title has no ASCII alphanumerics.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_separator = false;

    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c);
        } else {
            pending_separator = true;
        }
    }

    slug
}

/// A validated slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    /// Validate user-supplied slug input.
    pub fn parse(input: &str) -> Result<Self, SlugError> {
        if input.is_empty() {
            return Err(SlugError::Empty);
        }
        if let Some(bad) = input
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
        {
            return Err(SlugError::InvalidChar(bad));
        }
        if input.starts_with('-') || input.ends_with('-') || input.contains("--") {
            return Err(SlugError::MisplacedSeparator);
        }
        Ok(Self(input.to_string()))
    }

    /// Derive a slug from a title.
    pub fn from_title(title: &str) -> Result<Self, SlugError> {
        let slug = slugify(title);
        if slug.is_empty() {
            return Err(SlugError::Empty);
        }
        Ok(Self(slug))
    }

    /// Returns the slug as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Slug {
    type Error = SlugError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self {
        slug.0
    }
}

impl std::fmt::Display for Slug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
