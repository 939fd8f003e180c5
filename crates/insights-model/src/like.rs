//! Like rows.

use crate::{ArticleId, UserId};
use serde::{Deserialize, Serialize};

/// A like: at most one per (article, user) pair, enforced by the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Like {
    #[serde(rename = "blog_id")]
    pub article_id: ArticleId,
    pub user_id: UserId,
}

impl Like {
    pub fn new(article_id: ArticleId, user_id: UserId) -> Self {
        Self {
            article_id,
            user_id,
        }
    }
}
