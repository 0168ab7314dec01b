use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use nex_registry::analytics::downloads::HISTORY_RETENTION_DAYS;
use nex_registry::analytics::{Rating, RatingChange};
use nex_registry::db::models::*;
use nex_registry::db::{MemoryStore, PackageStore, StoreError};
use serde_json::json;

fn admin() -> Caller {
    Caller {
        user_id: "admin".into(),
        username: "admin".into(),
        role: Role::Admin,
    }
}

fn manifest(id: &str, version: &str) -> (Manifest, serde_json::Value) {
    let document = json!({
        "id": id,
        "name": id,
        "version": version,
        "description": format!("{} tool", id),
        "runtime": {"type": "node", "version": ">=18"},
        "tags": ["cli"],
        "x-custom": true
    });
    (serde_json::from_value(document.clone()).unwrap(), document)
}

async fn publish(store: &MemoryStore, id: &str, version: &str) {
    let (m, doc) = manifest(id, version);
    store.publish(&m, doc, &admin(), Utc::now()).await.unwrap();
}

fn submission(package: &str, user: &str, rating: i64) -> ReviewSubmission {
    ReviewSubmission {
        package_id: package.into(),
        user_id: user.into(),
        username: user.into(),
        rating: Rating::new(rating).unwrap(),
        title: None,
        comment: None,
    }
}

async fn rating_of(store: &MemoryStore, id: &str) -> (u64, f64) {
    let pkg = store.get_package(id).await.unwrap().unwrap();
    (pkg.rating.total_ratings, pkg.rating.average_rating)
}

#[tokio::test]
async fn test_publish_then_republish() {
    let store = MemoryStore::new();
    let (m, doc) = manifest("alice.fmt", "1.0.0");
    let outcome = store.publish(&m, doc, &admin(), Utc::now()).await.unwrap();
    assert_eq!(outcome, PublishOutcome::Created);

    let (m2, doc2) = manifest("alice.fmt", "1.1.0");
    let outcome = store.publish(&m2, doc2, &admin(), Utc::now()).await.unwrap();
    assert_eq!(outcome, PublishOutcome::Updated);

    let pkg = store.get_package("alice.fmt").await.unwrap().unwrap();
    assert_eq!(pkg.versions, vec!["1.0.0", "1.1.0"]);
    assert_eq!(pkg.latest_version, "1.1.0");
    assert_eq!(pkg.category, DEFAULT_CATEGORY);
    assert_eq!(pkg.manifest["x-custom"], json!(true));
    assert_eq!(store.list_versions("alice.fmt").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_duplicate_version_conflicts() {
    let store = MemoryStore::new();
    publish(&store, "alice.fmt", "1.0.0").await;
    let (m, doc) = manifest("alice.fmt", "1.0.0");
    let err = store.publish(&m, doc, &admin(), Utc::now()).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn test_republish_keeps_tags_when_omitted() {
    let store = MemoryStore::new();
    publish(&store, "alice.fmt", "1.0.0").await;
    let doc = json!({"id": "alice.fmt", "name": "fmt", "version": "2.0.0"});
    let m: Manifest = serde_json::from_value(doc.clone()).unwrap();
    store.publish(&m, doc, &admin(), Utc::now()).await.unwrap();

    let pkg = store.get_package("alice.fmt").await.unwrap().unwrap();
    assert_eq!(pkg.tags, vec!["cli"]);
    assert_eq!(pkg.name, "fmt");
}

#[tokio::test]
async fn test_rating_scenario_through_reviews() {
    let store = MemoryStore::new();
    publish(&store, "tool", "1.0.0").await;
    let now = Utc::now();

    store.submit_review(submission("tool", "u1", 5), now).await.unwrap();
    assert_eq!(rating_of(&store, "tool").await, (1, 5.0));

    store.submit_review(submission("tool", "u2", 1), now).await.unwrap();
    assert_eq!(rating_of(&store, "tool").await, (2, 3.0));

    let outcome = store.submit_review(submission("tool", "u1", 3), now).await.unwrap();
    assert!(outcome.updated);
    assert_eq!(rating_of(&store, "tool").await, (2, 2.0));

    let removed = store.delete_review("tool", "u2").await.unwrap();
    assert_eq!(removed.map(|r| r.rating.value()), Some(1));
    assert_eq!(rating_of(&store, "tool").await, (1, 3.0));

    assert_eq!(store.list_reviews("tool", ReviewSort::Recent, 20).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_one_review_per_user() {
    let store = MemoryStore::new();
    publish(&store, "tool", "1.0.0").await;
    let first = store.submit_review(submission("tool", "u1", 4), Utc::now()).await.unwrap();
    let second = store.submit_review(submission("tool", "u1", 2), Utc::now()).await.unwrap();

    assert!(!first.updated);
    assert!(second.updated);
    assert_eq!(first.review.id, second.review.id);
    assert_eq!(store.list_reviews("tool", ReviewSort::Recent, 20).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_review_on_missing_package_is_not_found() {
    let store = MemoryStore::new();
    let err = store
        .submit_review(submission("ghost", "u1", 4), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_rating_change_on_missing_package_is_noop() {
    let store = MemoryStore::new();
    store
        .apply_rating_change("ghost", RatingChange::Added(Rating::new(4).unwrap()))
        .await
        .unwrap();
    assert!(store.get_package("ghost").await.unwrap().is_none());
    assert!(store.rebuild_ratings("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn test_rebuild_matches_incremental_aggregate() {
    let store = MemoryStore::new();
    publish(&store, "tool", "1.0.0").await;
    for (user, rating) in [("a", 5), ("b", 4), ("c", 4), ("d", 1)] {
        store.submit_review(submission("tool", user, rating), Utc::now()).await.unwrap();
    }
    let incremental = store.get_package("tool").await.unwrap().unwrap().rating;

    // Drift the aggregate, then reconcile from the review set.
    store
        .apply_rating_change("tool", RatingChange::Added(Rating::new(5).unwrap()))
        .await
        .unwrap();
    let rebuilt = store.rebuild_ratings("tool").await.unwrap().unwrap();
    assert_eq!(rebuilt, incremental);
    assert_eq!(rebuilt.average_rating, 3.5);
}

#[tokio::test]
async fn test_ninety_one_daily_downloads() {
    let store = MemoryStore::new();
    publish(&store, "tool", "1.0.0").await;
    let start = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

    let mut last = None;
    for offset in 0..91 {
        last = store
            .record_download("tool", None, start + Duration::days(offset))
            .await
            .unwrap();
    }

    let stats = last.unwrap();
    assert_eq!(stats.downloads, 91);
    assert_eq!(stats.download_history.len(), HISTORY_RETENTION_DAYS);

    let pkg = store.get_package("tool").await.unwrap().unwrap();
    assert_eq!(pkg.download_stats, stats);

    let version = store.get_version("tool", "1.0.0").await.unwrap().unwrap();
    assert_eq!(version.downloads, 91);
}

#[tokio::test]
async fn test_pinned_download_credits_that_version() {
    let store = MemoryStore::new();
    publish(&store, "tool", "1.0.0").await;
    publish(&store, "tool", "2.0.0").await;

    let stats = store
        .record_download("tool", Some("1.0.0"), Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.downloads, 1);
    store.record_download("tool", None, Utc::now()).await.unwrap();

    let old = store.get_version("tool", "1.0.0").await.unwrap().unwrap();
    let current = store.get_version("tool", "2.0.0").await.unwrap().unwrap();
    assert_eq!(old.downloads, 1);
    assert_eq!(current.downloads, 1);

    let pkg = store.get_package("tool").await.unwrap().unwrap();
    assert_eq!(pkg.download_stats.downloads, 2);
}

#[tokio::test]
async fn test_download_on_missing_package() {
    let store = MemoryStore::new();
    assert!(store.record_download("ghost", None, Utc::now()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_downloads_are_not_lost() {
    let store = Arc::new(MemoryStore::new());
    publish(&store, "tool", "1.0.0").await;

    let mut handles = Vec::new();
    for _ in 0..50 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.record_download("tool", None, Utc::now()).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let pkg = store.get_package("tool").await.unwrap().unwrap();
    assert_eq!(pkg.download_stats.downloads, 50);
    assert_eq!(pkg.download_stats.download_history.total(), 50);
}

#[tokio::test]
async fn test_concurrent_reviews_keep_aggregate_consistent() {
    let store = Arc::new(MemoryStore::new());
    publish(&store, "tool", "1.0.0").await;

    let mut handles = Vec::new();
    for user in 0..20i64 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let id = format!("user{}", user);
            store
                .submit_review(submission("tool", &id, user % 5 + 1), Utc::now())
                .await
                .unwrap();
            if user % 2 == 0 {
                store.delete_review("tool", &id).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let pkg = store.get_package("tool").await.unwrap().unwrap();
    assert_eq!(pkg.rating.total_ratings, 10);
    let rebuilt = store.rebuild_ratings("tool").await.unwrap().unwrap();
    assert_eq!(pkg.rating, rebuilt);
}

#[tokio::test]
async fn test_delete_cascades() {
    let store = MemoryStore::new();
    publish(&store, "tool", "1.0.0").await;
    store.submit_review(submission("tool", "u1", 4), Utc::now()).await.unwrap();

    assert!(store.delete_package("tool").await.unwrap());
    assert!(!store.delete_package("tool").await.unwrap());
    assert!(store.list_versions("tool").await.unwrap().is_empty());
    assert!(store.list_reviews("tool", ReviewSort::Recent, 20).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_filters_and_sorts() {
    let store = MemoryStore::new();
    publish(&store, "alpha", "1.0.0").await;
    publish(&store, "beta", "1.0.0").await;
    publish(&store, "gamma", "1.0.0").await;
    store.record_download("beta", None, Utc::now()).await.unwrap();
    store.record_download("beta", None, Utc::now()).await.unwrap();
    store.record_download("gamma", None, Utc::now()).await.unwrap();
    store
        .set_deprecation("gamma", Deprecation::deprecate(None, Some("beta".into()), Utc::now()))
        .await
        .unwrap();

    let by_downloads = store
        .list_packages(&PackageQuery {
            sort: PackageSort::Downloads,
            limit: 50,
            ..PackageQuery::default()
        })
        .await
        .unwrap();
    let ids: Vec<_> = by_downloads.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["beta", "gamma", "alpha"]);

    let active = store
        .list_packages(&PackageQuery {
            deprecated: Some(false),
            search: Some("ALP".into()),
            limit: 50,
            ..PackageQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "alpha");

    let categories = store.category_counts().await.unwrap();
    assert_eq!(categories, vec![FacetCount { name: "other".into(), count: 2 }]);
}

#[tokio::test]
async fn test_dependents_lookup() {
    let store = MemoryStore::new();
    publish(&store, "core", "1.0.0").await;
    let doc = json!({
        "id": "plugin",
        "name": "plugin",
        "version": "0.1.0",
        "dependencies": [{"packageId": "core", "version": "^1"}]
    });
    let m: Manifest = serde_json::from_value(doc.clone()).unwrap();
    store.publish(&m, doc, &admin(), Utc::now()).await.unwrap();

    let dependents = store.dependents("core", 50).await.unwrap();
    assert_eq!(dependents.len(), 1);
    assert_eq!(dependents[0].id, "plugin");
    assert!(store.dependents("plugin", 50).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_votes_and_stats() {
    let store = MemoryStore::new();
    publish(&store, "tool", "1.0.0").await;
    let review = store
        .submit_review(submission("tool", "u1", 5), Utc::now())
        .await
        .unwrap()
        .review;

    let voted = store.vote_review("tool", review.id, true).await.unwrap().unwrap();
    assert_eq!(voted.helpful, 1);
    let voted = store.vote_review("tool", review.id, false).await.unwrap().unwrap();
    assert_eq!(voted.not_helpful, 1);
    assert!(store.vote_review("other", review.id, true).await.unwrap().is_none());

    let now = Utc::now();
    store.record_download("tool", None, now).await.unwrap();
    let stats = store
        .stats(nex_registry::analytics::local_day(now))
        .await
        .unwrap();
    assert_eq!(stats.total_packages, 1);
    assert_eq!(stats.total_downloads, 1);
    assert_eq!(stats.top_packages.len(), 1);
    assert_eq!(stats.daily_downloads.len(), 1);
    assert_eq!(stats.downloads_by_runtime[0].name.as_deref(), Some("node"));
}

#[tokio::test]
async fn test_tokens_are_unique() {
    let store = MemoryStore::new();
    let record = TokenRecord {
        token_hash: "abc".into(),
        user_id: "bob".into(),
        username: "bob".into(),
        role: Role::User,
        created_at: Utc::now(),
    };
    store.create_token(record.clone()).await.unwrap();
    let err = store.create_token(record).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    let found = store.find_token("abc").await.unwrap().unwrap();
    assert_eq!(found.caller().role, Role::User);
    assert!(store.find_token("missing").await.unwrap().is_none());
}
