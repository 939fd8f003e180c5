//! # insights-model
//!
//! Typed records shared by every layer of the insights client. Backend rows
//! arrive as JSON; they are decoded into these types at the gateway boundary
//! so "missing", "empty" and "malformed" are distinguished by the type system.
//!
//! - [`article`] - articles, attachments and search/tag matching
//! - [`comment`] - comments and their author profiles
//! - [`like`] - like rows
//! - [`profile`] - user profiles and roles
//! - [`session`] - authenticated sessions
//! - [`slug`] - slug derivation and validation
//! - [`page`] - fixed-size pagination

pub mod article;
pub mod comment;
mod ids;
pub mod like;
pub mod page;
pub mod profile;
pub mod session;
pub mod slug;

pub use article::{parse_tags, Article, ImageRef, PdfRef};
pub use comment::{AuthorProfile, Comment, CommentWithAuthor, ANONYMOUS_AUTHOR};
pub use ids::{ArticleId, CommentId, UserId};
pub use like::Like;
pub use page::{paginate, total_pages, Page};
pub use profile::{Role, UserProfile};
pub use session::{AuthUser, Session};
pub use slug::{slugify, Slug, SlugError};

/// Collection names in the backing store.
pub mod tables {
    /// Articles collection (the hosted table is named `blogs`).
    pub const ARTICLES: &str = "blogs";
    /// Comments collection.
    pub const COMMENTS: &str = "comments";
    /// Likes collection (unique per article/user pair).
    pub const LIKES: &str = "likes";
    /// User profiles collection.
    pub const USER_PROFILES: &str = "user_profiles";
}

/// A record with a stable identity, used to reconcile change events.
pub trait Keyed {
    /// Identity of the record.
    fn key(&self) -> &str;
}
