//! Comments and their author profiles.

use crate::{ArticleId, CommentId, Keyed, UserId, UserProfile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Display name used when a comment's author has no profile.
pub const ANONYMOUS_AUTHOR: &str = "Anonymous";

/// A comment row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    #[serde(rename = "blog_id")]
    pub article_id: ArticleId,
    pub user_id: UserId,
    pub content: String,
    /// Parent comment for threaded replies.
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The display profile attached to a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorProfile {
    #[serde(default = "anonymous", deserialize_with = "name_or_anonymous")]
    pub full_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl AuthorProfile {
    /// Stand-in for a missing profile.
    pub fn placeholder() -> Self {
        Self {
            full_name: ANONYMOUS_AUTHOR.to_string(),
            avatar_url: None,
        }
    }
}

impl Default for AuthorProfile {
    fn default() -> Self {
        Self::placeholder()
    }
}

impl From<&UserProfile> for AuthorProfile {
    fn from(profile: &UserProfile) -> Self {
        Self {
            full_name: profile
                .full_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(anonymous),
            avatar_url: profile.avatar_url.clone(),
        }
    }
}

fn anonymous() -> String {
    ANONYMOUS_AUTHOR.to_string()
}

fn name_or_anonymous<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let name = Option::<String>::deserialize(deserializer)?;
    Ok(name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(anonymous))
}

fn profile_or_placeholder<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<AuthorProfile, D::Error> {
    Ok(Option::<AuthorProfile>::deserialize(deserializer)?.unwrap_or_default())
}

/// A comment enriched with its author's display profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentWithAuthor {
    #[serde(flatten)]
    pub comment: Comment,
    #[serde(
        rename = "user_profiles",
        default,
        deserialize_with = "profile_or_placeholder"
    )]
    pub author: AuthorProfile,
}

impl CommentWithAuthor {
    /// Attach a profile (or the placeholder) to a comment.
    pub fn new(comment: Comment, author: Option<AuthorProfile>) -> Self {
        Self {
            comment,
            author: author.unwrap_or_default(),
        }
    }
}

impl Keyed for Comment {
    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl Keyed for CommentWithAuthor {
    fn key(&self) -> &str {
        self.comment.id.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row() -> serde_json::Value {
        json!({
            "id": "c1",
            "blog_id": "a1",
            "user_id": "u1",
            "content": "Well argued.",
            "created_at": "2024-12-01T10:30:00Z"
        })
    }

    #[test]
    fn decodes_enriched_rpc_row() {
        let mut value = row();
        value["user_profiles"] = json!({"full_name": "Priya", "avatar_url": "https://a/p.png"});
        let c: CommentWithAuthor = serde_json::from_value(value).unwrap();
        assert_eq!(c.comment.article_id.as_str(), "a1");
        assert_eq!(c.author.full_name, "Priya");
    }

    #[test]
    fn missing_or_null_profile_becomes_placeholder() {
        let c: CommentWithAuthor = serde_json::from_value(row()).unwrap();
        assert_eq!(c.author, AuthorProfile::placeholder());

        let mut value = row();
        value["user_profiles"] = serde_json::Value::Null;
        let c: CommentWithAuthor = serde_json::from_value(value).unwrap();
        assert_eq!(c.author.full_name, ANONYMOUS_AUTHOR);

        let mut value = row();
        value["user_profiles"] = json!({"full_name": null, "avatar_url": null});
        let c: CommentWithAuthor = serde_json::from_value(value).unwrap();
        assert_eq!(c.author.full_name, ANONYMOUS_AUTHOR);
    }

    #[test]
    fn serializes_with_backend_column_names() {
        let c: Comment = serde_json::from_value(row()).unwrap();
        let value = serde_json::to_value(&c).unwrap();
        assert_eq!(value["blog_id"], "a1");
        assert!(value.get("article_id").is_none());
    }
}
