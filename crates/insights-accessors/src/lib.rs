//! # insights-accessors
//!
//! Per-feature operations that hide backend-capability variance. Each
//! likes/comments operation is a [`FallbackChain`]: the privileged remote
//! procedure first, then the equivalent direct table operation. When the
//! last strategy fails because the feature is not provisioned, the chain
//! yields the operation's neutral value instead of an error.
//!
//! | operation | neutral value |
//! |---|---|
//! | [`get_like_count`] | `0` |
//! | [`has_user_liked`] | `false` |
//! | [`toggle_like`] | `None` |
//! | [`get_comments`] | empty list |
//! | [`add_comment`] | `None` |
//! | [`delete_comment`] | `false` |
//!
//! Article editor operations, profile lookups and attachment uploads go
//! straight to the gateway.

mod articles;
mod attachments;
mod comments;
mod fallback;
mod likes;
mod profiles;

pub use articles::{
    create_article, delete_article, fetch_articles, fetch_by_id, fetch_by_slug, fetch_featured,
    set_featured, set_published, update_article, ArticleDraft,
};
pub use attachments::{object_name, upload_image, upload_pdf, IMAGES_BUCKET, PDFS_BUCKET};
pub use comments::{add_comment, attach_authors, delete_comment, get_comments, update_comment};
pub use fallback::FallbackChain;
pub use likes::{get_like_count, has_user_liked, toggle_like, LikeToggle};
pub use profiles::{get_user_profile, get_user_role};

/// Remote procedure names.
pub mod procedures {
    pub const GET_LIKE_COUNT: &str = "get_like_count";
    pub const HAS_USER_LIKED: &str = "has_user_liked";
    pub const TOGGLE_LIKE: &str = "toggle_like";
    pub const GET_BLOG_COMMENTS: &str = "get_blog_comments";
    pub const ADD_BLOG_COMMENT: &str = "add_blog_comment";
    pub const DELETE_BLOG_COMMENT: &str = "delete_blog_comment";
}
