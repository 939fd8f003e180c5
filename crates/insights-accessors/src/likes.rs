//! Like count, liked state and toggling.

use crate::procedures::{GET_LIKE_COUNT, HAS_USER_LIKED, TOGGLE_LIKE};
use insights_gateway::{Filter, Gateway, GatewayError, GatewayExt, GatewayResult, Query};
use insights_model::{tables, ArticleId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::FallbackChain;

/// Authoritative result of a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeToggle {
    /// Whether the user likes the article after the toggle.
    pub liked: bool,
    /// Like count after the toggle.
    pub count: u64,
}

/// Number of likes on an article. Zero when likes are not provisioned.
pub async fn get_like_count(gateway: &dyn Gateway, article_id: &ArticleId) -> GatewayResult<u64> {
    FallbackChain::new("get_like_count")
        .then("procedure", move || async move {
            let value = gateway
                .call(GET_LIKE_COUNT, json!({ "p_blog_id": article_id }))
                .await?;
            count_from(GET_LIKE_COUNT, &value)
        })
        .then("table", move || async move { count_likes(gateway, article_id).await })
        .neutral(0)
        .run()
        .await
}

/// Whether `user_id` likes the article. Always false when signed out.
pub async fn has_user_liked(
    gateway: &dyn Gateway,
    article_id: &ArticleId,
    user_id: Option<&UserId>,
) -> GatewayResult<bool> {
    let Some(user_id) = user_id else {
        return Ok(false);
    };

    FallbackChain::new("has_user_liked")
        .then("procedure", move || async move {
            let value = gateway
                .call(
                    HAS_USER_LIKED,
                    json!({ "p_blog_id": article_id, "p_user_id": user_id }),
                )
                .await?;
            match value {
                Value::Bool(liked) => Ok(liked),
                Value::Null => Ok(false),
                other => Err(unexpected(HAS_USER_LIKED, &other)),
            }
        })
        .then("table", move || async move { user_likes(gateway, article_id, user_id).await })
        .neutral(false)
        .run()
        .await
}

/// Flip the user's like on an article.
///
/// Returns `None` when likes are not provisioned. Through the table path the
/// toggle is read-then-branch; an insert that loses a race against the same
/// user's concurrent toggle hits the unique pair and counts as liked.
pub async fn toggle_like(
    gateway: &dyn Gateway,
    article_id: &ArticleId,
    user_id: &UserId,
) -> GatewayResult<Option<LikeToggle>> {
    FallbackChain::new("toggle_like")
        .then("procedure", move || async move {
            let value = gateway
                .call(TOGGLE_LIKE, json!({ "p_blog_id": article_id }))
                .await?;
            if value.is_null() {
                return Err(unexpected(TOGGLE_LIKE, &value));
            }
            let toggle: LikeToggle = serde_json::from_value(value)?;
            Ok(Some(toggle))
        })
        .then("table", move || async move {
            let mine = Filter::all()
                .eq("blog_id", article_id.as_str())
                .eq("user_id", user_id.as_str());

            let liked = if user_likes(gateway, article_id, user_id).await? {
                gateway.delete(tables::LIKES, &mine).await?;
                false
            } else {
                let like = json!({ "blog_id": article_id, "user_id": user_id });
                match gateway.write(tables::LIKES, like).await {
                    Ok(_) => {}
                    Err(e) if e.is_conflict() => {
                        debug!(article_id = %article_id, "Like already present, treating insert as no-op");
                    }
                    Err(e) => return Err(e),
                }
                true
            };

            let count = count_likes(gateway, article_id).await?;
            Ok(Some(LikeToggle { liked, count }))
        })
        .neutral(None)
        .run()
        .await
}

async fn count_likes(gateway: &dyn Gateway, article_id: &ArticleId) -> GatewayResult<u64> {
    let rows = gateway
        .read(
            tables::LIKES,
            &Query::all().select("id").eq("blog_id", article_id.as_str()),
        )
        .await?;
    Ok(rows.len() as u64)
}

async fn user_likes(
    gateway: &dyn Gateway,
    article_id: &ArticleId,
    user_id: &UserId,
) -> GatewayResult<bool> {
    let rows: Vec<Value> = gateway
        .read_as(
            tables::LIKES,
            &Query::all()
                .select("id")
                .eq("blog_id", article_id.as_str())
                .eq("user_id", user_id.as_str())
                .limit(1),
        )
        .await?;
    Ok(!rows.is_empty())
}

fn count_from(procedure: &str, value: &Value) -> GatewayResult<u64> {
    match value {
        Value::Null => Ok(0),
        Value::Number(n) => n.as_u64().ok_or_else(|| unexpected(procedure, value)),
        other => Err(unexpected(procedure, other)),
    }
}

fn unexpected(procedure: &str, value: &Value) -> GatewayError {
    GatewayError::Procedure {
        procedure: procedure.to_string(),
        message: format!("unexpected result {value}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_gateway::{ErrorKind, MemoryGateway};

    fn article() -> ArticleId {
        ArticleId::from_string("a1")
    }

    fn user(id: &str) -> UserId {
        UserId::from_string(id)
    }

    fn signed_in(gateway: &MemoryGateway, id: &str) {
        gateway.set_access_token(Some(id.to_string()));
    }

    #[tokio::test]
    async fn count_uses_procedure_when_available() {
        let gateway = MemoryGateway::provisioned();
        gateway
            .seed(tables::LIKES, vec![json!({"blog_id": "a1", "user_id": "u1"})])
            .unwrap();
        assert_eq!(get_like_count(&gateway, &article()).await.unwrap(), 1);
        assert_eq!(gateway.calls(), vec!["call rpc/get_like_count"]);
    }

    #[tokio::test]
    async fn count_falls_back_to_table() {
        let gateway = MemoryGateway::provisioned();
        gateway.remove_procedure(GET_LIKE_COUNT);
        gateway
            .seed(
                tables::LIKES,
                vec![
                    json!({"blog_id": "a1", "user_id": "u1"}),
                    json!({"blog_id": "a1", "user_id": "u2"}),
                    json!({"blog_id": "a2", "user_id": "u1"}),
                ],
            )
            .unwrap();
        assert_eq!(get_like_count(&gateway, &article()).await.unwrap(), 2);
        assert_eq!(
            gateway.calls(),
            vec!["call rpc/get_like_count", "read likes"]
        );
    }

    #[tokio::test]
    async fn absent_likes_feature_is_neutral() {
        let gateway = MemoryGateway::new();
        assert_eq!(get_like_count(&gateway, &article()).await.unwrap(), 0);
        assert!(!has_user_liked(&gateway, &article(), Some(&user("u1"))).await.unwrap());
        signed_in(&gateway, "u1");
        assert_eq!(toggle_like(&gateway, &article(), &user("u1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn table_failure_other_than_provisioning_surfaces() {
        let gateway = MemoryGateway::provisioned();
        gateway.remove_procedure(GET_LIKE_COUNT);
        gateway.inject_failure(tables::LIKES, 403);
        let err = get_like_count(&gateway, &article()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn signed_out_user_has_not_liked_without_any_call() {
        let gateway = MemoryGateway::provisioned();
        assert!(!has_user_liked(&gateway, &article(), None).await.unwrap());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn toggling_twice_is_identity() {
        let gateway = MemoryGateway::provisioned();
        gateway
            .seed(tables::LIKES, vec![json!({"blog_id": "a1", "user_id": "u2"})])
            .unwrap();
        signed_in(&gateway, "u1");

        let first = toggle_like(&gateway, &article(), &user("u1")).await.unwrap().unwrap();
        assert_eq!(first, LikeToggle { liked: true, count: 2 });
        let second = toggle_like(&gateway, &article(), &user("u1")).await.unwrap().unwrap();
        assert_eq!(second, LikeToggle { liked: false, count: 1 });
    }

    #[tokio::test]
    async fn table_toggle_twice_is_identity() {
        let gateway = MemoryGateway::provisioned();
        gateway.remove_procedure(TOGGLE_LIKE);
        signed_in(&gateway, "u1");

        let before = get_like_count(&gateway, &article()).await.unwrap();
        let first = toggle_like(&gateway, &article(), &user("u1")).await.unwrap().unwrap();
        assert!(first.liked);
        assert_eq!(first.count, before + 1);
        let second = toggle_like(&gateway, &article(), &user("u1")).await.unwrap().unwrap();
        assert!(!second.liked);
        assert_eq!(second.count, before);
        assert!(!has_user_liked(&gateway, &article(), Some(&user("u1"))).await.unwrap());
    }

    #[tokio::test]
    async fn procedure_requiring_session_falls_back_to_table() {
        let gateway = MemoryGateway::provisioned();
        let toggle = toggle_like(&gateway, &article(), &user("u1")).await.unwrap().unwrap();
        assert!(toggle.liked);
        assert_eq!(gateway.rows(tables::LIKES).len(), 1);
    }

    /// Answers "has this user liked" reads with a stale empty result.
    struct StaleLikeReads(MemoryGateway);

    #[async_trait::async_trait]
    impl Gateway for StaleLikeReads {
        async fn read(&self, collection: &str, query: &Query) -> GatewayResult<Vec<Value>> {
            let per_user = query
                .filter
                .conditions()
                .iter()
                .any(|c| matches!(c, insights_gateway::Condition::Eq(column, _) if column == "user_id"));
            if collection == tables::LIKES && per_user {
                return Ok(Vec::new());
            }
            self.0.read(collection, query).await
        }
        async fn read_one(&self, collection: &str, filter: &Filter) -> GatewayResult<Value> {
            self.0.read_one(collection, filter).await
        }
        async fn write(&self, collection: &str, record: Value) -> GatewayResult<Value> {
            self.0.write(collection, record).await
        }
        async fn update(&self, collection: &str, filter: &Filter, patch: Value) -> GatewayResult<Vec<Value>> {
            self.0.update(collection, filter, patch).await
        }
        async fn delete(&self, collection: &str, filter: &Filter) -> GatewayResult<Vec<Value>> {
            self.0.delete(collection, filter).await
        }
        async fn call(&self, procedure: &str, args: Value) -> GatewayResult<Value> {
            self.0.call(procedure, args).await
        }
        fn set_access_token(&self, access_token: Option<String>) {
            self.0.set_access_token(access_token);
        }
    }

    #[tokio::test]
    async fn racing_insert_conflict_is_benign() {
        let inner = MemoryGateway::provisioned();
        inner.remove_procedure(TOGGLE_LIKE);
        // Another toggle from the same user landed after our read.
        inner
            .seed(tables::LIKES, vec![json!({"blog_id": "a1", "user_id": "u1"})])
            .unwrap();
        let gateway = StaleLikeReads(inner);

        let toggle = toggle_like(&gateway, &article(), &user("u1")).await.unwrap().unwrap();
        assert_eq!(toggle, LikeToggle { liked: true, count: 1 });
        assert_eq!(gateway.0.rows(tables::LIKES).len(), 1);
    }
}
