//! End-to-end behaviour of the stores over the in-memory backend.

use insights_accessors::{get_comments, get_like_count, procedures, ArticleDraft};
use insights_gateway::{Gateway, MemoryGateway};
use insights_model::{tables, ArticleId, UserId};
use insights_realtime::{ChangeEvent, LocalChangeFeed};
use insights_store::{sample_articles, ArticleStore, LikeState, ToggleOutcome};
use serde_json::{json, Value};
use std::sync::Arc;

fn article_row(index: usize) -> Value {
    json!({
        "id": format!("bulk-{index:03}"),
        "title": format!("Case Note {index}"),
        "slug": format!("case-note-{index}"),
        "content": "Body",
        "author": "Dr. Sarah Chen",
        "tags": ["Case Notes"],
        "published": true,
        "featured": false,
        "created_at": format!("2024-10-01T{:02}:{:02}:00Z", index / 60, index % 60),
    })
}

#[tokio::test]
async fn new_article_appears_once_published() {
    let gateway = Arc::new(MemoryGateway::provisioned());
    gateway.seed(tables::ARTICLES, sample_articles()).unwrap();
    let store = ArticleStore::new(gateway.clone(), 12, 3);

    let created = store
        .create(&ArticleDraft::new("5 Ways", "Five ways to prepare for mediation."))
        .await
        .unwrap();
    assert_eq!(created.slug, "5-ways");
    assert!(!created.published);

    store.fetch_articles(true).await;
    assert!(store.snapshot().articles.iter().all(|a| a.id != created.id));

    store.set_published(&created.id, true).await.unwrap();
    store.fetch_articles(true).await;
    let state = store.snapshot();
    assert!(state.error.is_none());
    assert_eq!(state.articles[0].id, created.id);
    assert_eq!(state.articles[0].slug, "5-ways");
}

#[tokio::test]
async fn last_page_holds_the_remainder() {
    let gateway = Arc::new(MemoryGateway::provisioned());
    let rows: Vec<Value> = (0..30).map(article_row).collect();
    gateway.seed(tables::ARTICLES, rows).unwrap();
    let store = ArticleStore::new(gateway, 12, 3);
    store.fetch_articles(true).await;

    store.set_page(3);
    let page = store.snapshot().page_view();
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.items.len(), 30 % 12);

    store.set_page(4);
    assert!(store.snapshot().page_view().items.is_empty());
}

#[tokio::test]
async fn search_matches_tags_case_insensitively() {
    let gateway = Arc::new(MemoryGateway::provisioned());
    gateway.seed(tables::ARTICLES, sample_articles()).unwrap();
    let store = ArticleStore::new(gateway, 12, 3);
    store.fetch_articles(true).await;

    store.set_search("gavel");
    let matches = store.snapshot().filtered();
    assert_eq!(matches.len(), 1);
    assert!(matches[0].has_tag("Gavel"));
}

#[tokio::test]
async fn absent_features_read_as_neutral_values() {
    let gateway = MemoryGateway::provisioned();
    gateway.remove_procedure(procedures::GET_LIKE_COUNT);
    gateway.remove_procedure(procedures::GET_BLOG_COMMENTS);
    gateway.drop_table(tables::LIKES);
    gateway.drop_table(tables::COMMENTS);
    let article = ArticleId::from_string("a1");

    assert_eq!(get_like_count(&gateway, &article).await.unwrap(), 0);
    assert!(get_comments(&gateway, &article).await.unwrap().is_empty());
}

#[tokio::test]
async fn double_toggle_is_idempotent() {
    let gateway = Arc::new(MemoryGateway::provisioned());
    gateway
        .seed(
            tables::LIKES,
            vec![json!({"blog_id": "a1", "user_id": "someone-else"})],
        )
        .unwrap();
    gateway.set_access_token(Some("reader-1".to_string()));
    let likes = LikeState::new(
        gateway,
        ArticleId::from_string("a1"),
        Some(UserId::from_string("reader-1")),
    );
    likes.refresh().await;
    let before = likes.snapshot();
    assert_eq!(before.count, 1);

    for _ in 0..2 {
        assert!(matches!(likes.toggle().await, ToggleOutcome::Applied(_)));
    }
    let after = likes.snapshot();
    assert_eq!(after.count, before.count);
    assert_eq!(after.liked, before.liked);
}

#[tokio::test]
async fn repeated_insert_event_does_not_duplicate() {
    let feed = Arc::new(LocalChangeFeed::new());
    let gateway = Arc::new(MemoryGateway::provisioned().with_change_feed(feed.clone()));
    gateway.seed(tables::ARTICLES, sample_articles()).unwrap();
    let store = ArticleStore::new(gateway.clone(), 12, 3);
    let _subscription = store.subscribe(feed.as_ref()).unwrap();
    store.fetch_articles(true).await;
    let before = store.snapshot().articles.len();

    let row = article_row(7);
    feed.publish(ChangeEvent::insert(tables::ARTICLES, row.clone()));
    feed.publish(ChangeEvent::insert(tables::ARTICLES, row));
    assert_eq!(store.snapshot().articles.len(), before + 1);

    // The event for an article the store already fetched is absorbed too.
    let existing = sample_articles().remove(0);
    feed.publish(ChangeEvent::insert(tables::ARTICLES, existing));
    assert_eq!(store.snapshot().articles.len(), before + 1);
}

#[tokio::test]
async fn unpublishing_removes_from_public_list() {
    let feed = Arc::new(LocalChangeFeed::new());
    let gateway = Arc::new(MemoryGateway::provisioned().with_change_feed(feed.clone()));
    gateway.seed(tables::ARTICLES, sample_articles()).unwrap();
    let store = ArticleStore::new(gateway.clone(), 12, 3);
    let _subscription = store.subscribe(feed.as_ref()).unwrap();
    store.fetch_articles(true).await;
    store.fetch_featured().await;
    let first = store.snapshot().articles[0].clone();
    assert!(first.featured);

    // Another admin session unpublishes it directly.
    let patched = gateway
        .update(
            tables::ARTICLES,
            &insights_gateway::Filter::all().eq("id", first.id.as_str()),
            json!({"published": false}),
        )
        .await
        .unwrap();
    assert_eq!(patched.len(), 1);

    let state = store.snapshot();
    assert!(state.articles.iter().all(|a| a.id != first.id));
    assert!(state.featured.iter().all(|a| a.id != first.id));
}
