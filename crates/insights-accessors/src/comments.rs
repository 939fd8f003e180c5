//! Comment listing, posting, deletion and editing.

use crate::procedures::{ADD_BLOG_COMMENT, DELETE_BLOG_COMMENT, GET_BLOG_COMMENTS};
use crate::FallbackChain;
use chrono::Utc;
use insights_gateway::{Filter, Gateway, GatewayError, GatewayExt, GatewayResult, Query};
use insights_model::{
    tables, ArticleId, AuthorProfile, Comment, CommentId, CommentWithAuthor, UserId, UserProfile,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::warn;

/// Comments on an article, oldest first, each with its author's profile.
/// Empty when comments are not provisioned.
pub async fn get_comments(
    gateway: &dyn Gateway,
    article_id: &ArticleId,
) -> GatewayResult<Vec<CommentWithAuthor>> {
    FallbackChain::new("get_comments")
        .then("procedure", move || async move {
            let value = gateway
                .call(GET_BLOG_COMMENTS, json!({ "p_blog_id": article_id }))
                .await?;
            let value = procedure_payload(GET_BLOG_COMMENTS, value)?;
            Ok(serde_json::from_value::<Vec<CommentWithAuthor>>(value)?)
        })
        .then("table", move || async move {
            let comments: Vec<Comment> = gateway
                .read_as(
                    tables::COMMENTS,
                    &Query::all()
                        .eq("blog_id", article_id.as_str())
                        .order_asc("created_at"),
                )
                .await?;
            Ok(attach_authors(gateway, comments).await)
        })
        .neutral(Vec::new())
        .run()
        .await
}

/// Attach author profiles with one batched read over the distinct authors.
///
/// Comments whose author has no profile (or when the lookup fails) get the
/// anonymous placeholder; no comment is dropped.
pub async fn attach_authors(gateway: &dyn Gateway, comments: Vec<Comment>) -> Vec<CommentWithAuthor> {
    let mut author_ids: Vec<&str> = comments.iter().map(|c| c.user_id.as_str()).collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    let profiles: HashMap<UserId, AuthorProfile> = if author_ids.is_empty() {
        HashMap::new()
    } else {
        let query = Query::all()
            .select("id,full_name,avatar_url")
            .is_in("id", author_ids);
        match gateway.read_as::<UserProfile>(tables::USER_PROFILES, &query).await {
            Ok(rows) => rows
                .iter()
                .map(|p| (p.id.clone(), AuthorProfile::from(p)))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Author profile lookup failed, using placeholders");
                HashMap::new()
            }
        }
    };

    comments
        .into_iter()
        .map(|comment| {
            let author = profiles.get(&comment.user_id).cloned();
            CommentWithAuthor::new(comment, author)
        })
        .collect()
}

/// Post a comment as `user_id`.
///
/// Returns `None` when comments are not provisioned. A blank body is a
/// validation error and no request is made.
pub async fn add_comment(
    gateway: &dyn Gateway,
    article_id: &ArticleId,
    user_id: &UserId,
    content: &str,
    parent_id: Option<&CommentId>,
) -> GatewayResult<Option<CommentWithAuthor>> {
    let content = content.trim();
    if content.is_empty() {
        return Err(GatewayError::Validation("comment cannot be empty".to_string()));
    }

    FallbackChain::new("add_comment")
        .then("procedure", move || async move {
            let value = gateway
                .call(
                    ADD_BLOG_COMMENT,
                    json!({
                        "p_blog_id": article_id,
                        "p_content": content,
                        "p_parent_id": parent_id,
                    }),
                )
                .await?;
            let value = procedure_payload(ADD_BLOG_COMMENT, value)?;
            Ok(Some(serde_json::from_value::<CommentWithAuthor>(value)?))
        })
        .then("table", move || async move {
            let row = json!({
                "blog_id": article_id,
                "user_id": user_id,
                "content": content,
                "parent_id": parent_id,
            });
            let comment: Comment = gateway.write_as(tables::COMMENTS, &row).await?;
            let profile: Option<UserProfile> = gateway
                .find_one_as(tables::USER_PROFILES, &Filter::all().eq("id", user_id.as_str()))
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Author profile lookup failed, using placeholder");
                    None
                });
            Ok(Some(CommentWithAuthor::new(
                comment,
                profile.as_ref().map(AuthorProfile::from),
            )))
        })
        .neutral(None)
        .run()
        .await
}

/// Delete a comment authored by `user_id`.
///
/// Returns whether a comment was removed; false when comments are not
/// provisioned or the comment is not the user's.
pub async fn delete_comment(
    gateway: &dyn Gateway,
    comment_id: &CommentId,
    user_id: &UserId,
) -> GatewayResult<bool> {
    FallbackChain::new("delete_comment")
        .then("procedure", move || async move {
            let value = gateway
                .call(DELETE_BLOG_COMMENT, json!({ "p_comment_id": comment_id }))
                .await?;
            procedure_payload(DELETE_BLOG_COMMENT, value)?;
            Ok(true)
        })
        .then("table", move || async move {
            let removed = gateway
                .delete(
                    tables::COMMENTS,
                    &Filter::all()
                        .eq("id", comment_id.as_str())
                        .eq("user_id", user_id.as_str()),
                )
                .await?;
            Ok(!removed.is_empty())
        })
        .neutral(false)
        .run()
        .await
}

/// Replace the body of a comment authored by `user_id`.
pub async fn update_comment(
    gateway: &dyn Gateway,
    comment_id: &CommentId,
    user_id: &UserId,
    content: &str,
) -> GatewayResult<Comment> {
    let content = content.trim();
    if content.is_empty() {
        return Err(GatewayError::Validation("comment cannot be empty".to_string()));
    }

    let rows = gateway
        .update(
            tables::COMMENTS,
            &Filter::all()
                .eq("id", comment_id.as_str())
                .eq("user_id", user_id.as_str()),
            json!({ "content": content, "updated_at": Utc::now() }),
        )
        .await?;
    let row = rows.into_iter().next().ok_or_else(|| GatewayError::NotFound {
        collection: tables::COMMENTS.to_string(),
    })?;
    Ok(serde_json::from_value(row)?)
}

/// A procedure result that is null or carries an `error` field failed.
fn procedure_payload(procedure: &str, value: Value) -> GatewayResult<Value> {
    let message = match &value {
        Value::Null => Some("no result".to_string()),
        Value::Object(fields) => match fields.get("error") {
            None | Some(Value::Null) => None,
            Some(Value::String(message)) => Some(message.clone()),
            Some(other) => Some(other.to_string()),
        },
        _ => None,
    };
    match message {
        Some(message) => Err(GatewayError::Procedure {
            procedure: procedure.to_string(),
            message,
        }),
        None => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_gateway::{ErrorKind, MemoryGateway};
    use insights_model::ANONYMOUS_AUTHOR;

    fn article() -> ArticleId {
        ArticleId::from_string("a1")
    }

    fn user(id: &str) -> UserId {
        UserId::from_string(id)
    }

    fn gateway_with_profile() -> MemoryGateway {
        let gateway = MemoryGateway::provisioned();
        gateway
            .seed(
                tables::USER_PROFILES,
                vec![json!({"id": "u1", "full_name": "Asha Rao", "avatar_url": null, "role": "user"})],
            )
            .unwrap();
        gateway
    }

    #[tokio::test]
    async fn absent_comments_feature_is_empty() {
        let gateway = MemoryGateway::new();
        assert!(get_comments(&gateway, &article()).await.unwrap().is_empty());
        assert_eq!(
            add_comment(&gateway, &article(), &user("u1"), "hello", None).await.unwrap(),
            None
        );
        assert!(!delete_comment(&gateway, &CommentId::from_string("c1"), &user("u1")).await.unwrap());
    }

    #[tokio::test]
    async fn add_via_procedure_carries_author() {
        let gateway = gateway_with_profile();
        gateway.set_access_token(Some("u1".to_string()));
        let added = add_comment(&gateway, &article(), &user("u1"), "  Well argued. ", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(added.comment.content, "Well argued.");
        assert_eq!(added.author.full_name, "Asha Rao");
        assert_eq!(gateway.calls(), vec!["call rpc/add_blog_comment"]);
    }

    #[tokio::test]
    async fn procedure_error_payload_falls_back_to_table() {
        let gateway = gateway_with_profile();
        // Signed out: the procedure answers with an error payload.
        let added = add_comment(&gateway, &article(), &user("u1"), "reply", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(added.author.full_name, "Asha Rao");
        assert_eq!(
            gateway.calls(),
            vec!["call rpc/add_blog_comment", "write comments", "read_one user_profiles"]
        );
    }

    #[tokio::test]
    async fn blank_comment_is_rejected_before_any_call() {
        let gateway = MemoryGateway::provisioned();
        let err = add_comment(&gateway, &article(), &user("u1"), "   ", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn table_listing_enriches_in_one_batch_with_placeholders() {
        let gateway = gateway_with_profile();
        gateway.remove_procedure(GET_BLOG_COMMENTS);
        gateway
            .seed(
                tables::COMMENTS,
                vec![
                    json!({"id": "c2", "blog_id": "a1", "user_id": "u2", "content": "second",
                           "created_at": "2024-12-02T00:00:00Z"}),
                    json!({"id": "c1", "blog_id": "a1", "user_id": "u1", "content": "first",
                           "created_at": "2024-12-01T00:00:00Z"}),
                    json!({"id": "c3", "blog_id": "a1", "user_id": "u1", "content": "third",
                           "created_at": "2024-12-03T00:00:00Z"}),
                    json!({"id": "c9", "blog_id": "a9", "user_id": "u1", "content": "elsewhere",
                           "created_at": "2024-12-01T00:00:00Z"}),
                ],
            )
            .unwrap();

        let comments = get_comments(&gateway, &article()).await.unwrap();
        let ids: Vec<&str> = comments.iter().map(|c| c.comment.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
        assert_eq!(comments[0].author.full_name, "Asha Rao");
        assert_eq!(comments[1].author.full_name, ANONYMOUS_AUTHOR);
        assert!(comments[1].author.avatar_url.is_none());

        let profile_reads = gateway
            .calls()
            .iter()
            .filter(|c| c.as_str() == "read user_profiles")
            .count();
        assert_eq!(profile_reads, 1);
    }

    #[tokio::test]
    async fn profile_lookup_failure_keeps_comments() {
        let gateway = gateway_with_profile();
        gateway.remove_procedure(GET_BLOG_COMMENTS);
        gateway.inject_failure(tables::USER_PROFILES, 500);
        gateway
            .seed(
                tables::COMMENTS,
                vec![json!({"id": "c1", "blog_id": "a1", "user_id": "u1", "content": "x"})],
            )
            .unwrap();
        let comments = get_comments(&gateway, &article()).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].author, AuthorProfile::placeholder());
    }

    #[tokio::test]
    async fn delete_is_author_only() {
        let gateway = gateway_with_profile();
        gateway.set_access_token(Some("u1".to_string()));
        let added = add_comment(&gateway, &article(), &user("u1"), "mine", None)
            .await
            .unwrap()
            .unwrap();

        gateway.set_access_token(Some("u2".to_string()));
        assert!(!delete_comment(&gateway, &added.comment.id, &user("u2")).await.unwrap());
        gateway.set_access_token(Some("u1".to_string()));
        assert!(delete_comment(&gateway, &added.comment.id, &user("u1")).await.unwrap());
        assert!(gateway.rows(tables::COMMENTS).is_empty());
    }

    #[tokio::test]
    async fn update_is_author_only_and_stamps_time() {
        let gateway = gateway_with_profile();
        gateway
            .seed(
                tables::COMMENTS,
                vec![json!({"id": "c1", "blog_id": "a1", "user_id": "u1", "content": "draft"})],
            )
            .unwrap();
        let c1 = CommentId::from_string("c1");

        let err = update_comment(&gateway, &c1, &user("u2"), "hijack").await.unwrap_err();
        assert!(err.is_not_found());

        let updated = update_comment(&gateway, &c1, &user("u1"), "final").await.unwrap();
        assert_eq!(updated.content, "final");
        assert!(updated.updated_at.is_some());
    }

    #[test]
    fn error_payloads_are_failures() {
        assert!(procedure_payload("p", json!({"error": "Not authenticated"})).is_err());
        assert!(procedure_payload("p", Value::Null).is_err());
        assert!(procedure_payload("p", json!({"success": true})).is_ok());
        assert!(procedure_payload("p", json!([])).is_ok());
    }
}
