use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use nex_registry::api::create_router;
use nex_registry::config::Config;
use nex_registry::db::MemoryStore;
use nex_registry::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

const ADMIN: &str = "admin-secret";

fn app() -> Router {
    let state = AppState::new(Arc::new(MemoryStore::new()), Config::in_memory(Some(ADMIN)));
    create_router(state)
}

async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
    user_agent: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("x-auth-token", token);
    }
    if let Some(ua) = user_agent {
        builder = builder.header("user-agent", ua);
    }
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let response = router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn send_raw(router: &Router, method: &str, uri: &str, body: &str, token: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("x-auth-token", token);
    }
    let response = router
        .clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn publish(router: &Router, id: &str, version: &str) -> StatusCode {
    let manifest = json!({
        "id": id,
        "name": id,
        "version": version,
        "description": "a tool",
        "category": "devtools",
        "tags": ["cli", "format"],
        "runtime": {"type": "node", "version": ">=18"}
    });
    send(router, "POST", "/api/packages", Some(manifest), Some(ADMIN), None).await.0
}

async fn issue_token(router: &Router, username: &str) -> String {
    let (status, body) = send(
        router,
        "POST",
        "/api/auth/tokens",
        Some(json!({"username": username})),
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let router = app();
    let (status, body) = send(&router, "GET", "/health", None, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn test_publish_requires_admin() {
    let router = app();
    let manifest = json!({"id": "tool", "name": "tool", "version": "1.0.0"});

    let (status, body) = send(&router, "POST", "/api/packages", Some(manifest.clone()), None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));

    let token = issue_token(&router, "bob").await;
    let (status, _) = send(&router, "POST", "/api/packages", Some(manifest), Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&router, "POST", "/api/packages", None, Some("bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_publish_validation_and_conflict() {
    let router = app();
    assert_eq!(publish(&router, "alice.tool", "1.0.0").await, StatusCode::CREATED);
    assert_eq!(publish(&router, "alice.tool", "1.0.0").await, StatusCode::CONFLICT);
    assert_eq!(publish(&router, "alice.tool", "1.1.0").await, StatusCode::OK);
    assert_eq!(publish(&router, "Bad_Id", "1.0.0").await, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &router,
        "POST",
        "/api/packages",
        Some(json!({"id": "x"})),
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Package must have id, name, and version"));
}

#[tokio::test]
async fn test_manifest_fetch_tracks_cli_downloads() {
    let router = app();
    publish(&router, "tool", "1.0.0").await;

    // Browser fetch: not counted.
    let (status, body) = send(&router, "GET", "/api/packages/tool", None, None, Some("Mozilla/5.0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], json!("tool"));

    send(&router, "GET", "/api/packages/tool", None, None, Some("nex/0.1.0")).await;
    send(&router, "GET", "/api/packages/tool?download=true", None, None, None).await;
    let (_, body) = send(&router, "POST", "/api/packages/tool/download", None, None, None).await;
    assert_eq!(body["data"]["downloads"], json!(3));

    let (_, body) = send(&router, "GET", "/api/packages/tool/downloads", None, None, None).await;
    assert_eq!(body["data"]["downloads"], json!(3));
    assert_eq!(body["data"]["weeklyDownloads"], json!(3));
    assert_eq!(body["data"]["downloadHistory"].as_array().unwrap().len(), 1);

    let (status, _) = send(&router, "POST", "/api/packages/ghost/download", None, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&router, "GET", "/api/packages/ghost", None, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_review_lifecycle_updates_rating() {
    let router = app();
    publish(&router, "tool", "1.0.0").await;
    let alice = issue_token(&router, "alice").await;
    let bob = issue_token(&router, "bob").await;

    let (status, _) = send(
        &router,
        "POST",
        "/api/packages/tool/reviews",
        Some(json!({"rating": 5, "title": "great"})),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    send(&router, "POST", "/api/packages/tool/reviews", Some(json!({"rating": 1})), Some(&bob), None).await;
    let (status, _) = send(
        &router,
        "POST",
        "/api/packages/tool/reviews",
        Some(json!({"rating": 3})),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, info) = send(&router, "GET", "/api/packages/tool/info", None, None, None).await;
    assert_eq!(info["data"]["totalRatings"], json!(2));
    assert_eq!(info["data"]["averageRating"], json!(2.0));
    assert_eq!(info["data"]["ratingDistribution"]["3"], json!(1));
    assert_eq!(info["data"]["reviews"].as_array().unwrap().len(), 2);

    let (status, _) = send(&router, "DELETE", "/api/packages/tool/reviews", None, Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&router, "DELETE", "/api/packages/tool/reviews", None, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, info) = send(&router, "GET", "/api/packages/tool/info", None, None, None).await;
    assert_eq!(info["data"]["totalRatings"], json!(1));
    assert_eq!(info["data"]["averageRating"], json!(3.0));
}

#[tokio::test]
async fn test_review_validation() {
    let router = app();
    publish(&router, "tool", "1.0.0").await;
    let alice = issue_token(&router, "alice").await;

    for body in [json!({"rating": 0}), json!({"rating": 6}), json!({}), json!({"rating": 4, "title": "t".repeat(101)})] {
        let (status, _) = send(&router, "POST", "/api/packages/tool/reviews", Some(body), Some(&alice), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, _) = send(&router, "POST", "/api/packages/tool/reviews", Some(json!({"rating": 4})), None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&router, "POST", "/api/packages/ghost/reviews", Some(json!({"rating": 4})), Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_review_votes_and_sorting() {
    let router = app();
    publish(&router, "tool", "1.0.0").await;
    let alice = issue_token(&router, "alice").await;
    let bob = issue_token(&router, "bob").await;

    send(&router, "POST", "/api/packages/tool/reviews", Some(json!({"rating": 2})), Some(&alice), None).await;
    let (_, created) = send(&router, "POST", "/api/packages/tool/reviews", Some(json!({"rating": 5})), Some(&bob), None).await;
    let review_id = created["data"]["id"].as_str().unwrap().to_string();

    let uri = format!("/api/packages/tool/reviews/{}/vote", review_id);
    let (status, voted) = send(&router, "POST", &uri, Some(json!({"helpful": true})), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(voted["data"]["helpful"], json!(1));

    let (_, low) = send(&router, "GET", "/api/packages/tool/reviews?sort=rating-low", None, None, None).await;
    assert_eq!(low["data"][0]["rating"], json!(2));
    let (_, helpful) = send(&router, "GET", "/api/packages/tool/reviews?sort=helpful&limit=1", None, None, None).await;
    assert_eq!(helpful["data"].as_array().unwrap().len(), 1);
    assert_eq!(helpful["data"][0]["username"], json!("bob"));
}

#[tokio::test]
async fn test_deprecation_and_listing() {
    let router = app();
    publish(&router, "old", "1.0.0").await;
    publish(&router, "new", "1.0.0").await;

    let (status, body) = send(
        &router,
        "POST",
        "/api/packages/old/deprecate",
        Some(json!({"replacementPackage": "new"})),
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deprecationMessage"], json!("This package has been deprecated"));

    let (_, listed) = send(&router, "GET", "/api/packages?deprecated=false", None, None, None).await;
    let ids: Vec<_> = listed["data"].as_array().unwrap().iter().map(|p| p["id"].clone()).collect();
    assert_eq!(ids, vec![json!("new")]);
    assert!(listed["data"][0].get("manifest").is_none());

    let (_, categories) = send(&router, "GET", "/api/packages/categories", None, None, None).await;
    assert_eq!(categories["data"], json!([{"name": "devtools", "count": 1}]));

    let (status, _) = send(&router, "POST", "/api/packages/old/undeprecate", None, Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, listed) = send(&router, "GET", "/api/packages?deprecated=false", None, None, None).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 2);

    let (_, tags) = send(&router, "GET", "/api/packages/tags", None, None, None).await;
    assert_eq!(tags["data"][0], json!({"name": "cli", "count": 2}));
}

#[tokio::test]
async fn test_versions_and_delete() {
    let router = app();
    publish(&router, "tool", "1.0.0").await;
    publish(&router, "tool", "1.2.0").await;

    let (_, versions) = send(&router, "GET", "/api/packages/tool/versions", None, None, None).await;
    assert_eq!(versions["data"].as_array().unwrap().len(), 2);

    let (status, version) = send(&router, "GET", "/api/packages/tool/versions/1.0.0", None, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(version["data"]["manifest"]["version"], json!("1.0.0"));

    let (status, _) = send(&router, "GET", "/api/packages/tool/versions/9.9.9", None, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&router, "DELETE", "/api/packages/tool", None, Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&router, "GET", "/api/packages/tool/info", None, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stats_are_admin_only() {
    let router = app();
    publish(&router, "tool", "1.0.0").await;
    let bob = issue_token(&router, "bob").await;

    let (status, _) = send(&router, "GET", "/api/packages/stats", None, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&router, "GET", "/api/packages/stats", None, Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalPackages"], json!(1));
    assert_eq!(body["data"]["totalUsers"], json!(1));
}

#[tokio::test]
async fn test_rebuild_ratings_endpoint() {
    let router = app();
    publish(&router, "tool", "1.0.0").await;
    let alice = issue_token(&router, "alice").await;
    send(&router, "POST", "/api/packages/tool/reviews", Some(json!({"rating": 4})), Some(&alice), None).await;

    let (status, body) = send(&router, "POST", "/api/packages/tool/ratings/rebuild", None, Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalRatings"], json!(1));
    assert_eq!(body["data"]["averageRating"], json!(4.0));
}

#[tokio::test]
async fn test_legacy_index_redirects() {
    let router = app();
    let response = router
        .oneshot(Request::builder().uri("/registry/index.json").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.status().is_redirection());
    assert_eq!(response.headers()["location"], "/api/packages");
}

#[tokio::test]
async fn test_unrecognized_query_values_are_ignored() {
    let router = app();
    publish(&router, "tool", "1.0.0").await;

    let (status, body) = send(&router, "GET", "/api/packages/tool?download=1", None, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], json!("tool"));
    let (_, stats) = send(&router, "GET", "/api/packages/tool/downloads", None, None, None).await;
    assert_eq!(stats["data"]["downloads"], json!(0));

    let (status, body) = send(&router, "GET", "/api/packages?deprecated=yes&limit=abc", None, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = send(&router, "GET", "/api/packages/tool/reviews?limit=lots", None, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn test_malformed_bodies_get_error_envelope() {
    let router = app();
    publish(&router, "tool", "1.0.0").await;
    let alice = issue_token(&router, "alice").await;

    let (status, body) = send_raw(&router, "POST", "/api/packages/tool/reviews", "{not json", Some(&alice)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].is_string());

    let (status, body) = send_raw(&router, "POST", "/api/packages/tool/reviews", r#"{"rating": "4"}"#, Some(&alice)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));

    let (status, body) = send_raw(&router, "POST", "/api/packages", "[1, 2", Some(ADMIN)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));

    let (status, body) = send_raw(&router, "POST", "/api/auth/tokens", r#"{"user": "x"}"#, Some(ADMIN)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));

    // Integral floats are ordinary ratings.
    let (status, body) = send_raw(&router, "POST", "/api/packages/tool/reviews", r#"{"rating": 4.0}"#, Some(&alice)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["rating"], json!(4));

    let review_id = body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/packages/tool/reviews/{}/vote", review_id);
    let (status, body) = send_raw(&router, "POST", &uri, r#"{"helpful": "yes"}"#, Some(&alice)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn test_pinned_download_credits_requested_version() {
    let router = app();
    publish(&router, "tool", "1.0.0").await;
    publish(&router, "tool", "2.0.0").await;

    let (status, body) = send(&router, "POST", "/api/packages/tool/download?version=1.0.0", None, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["downloads"], json!(1));

    let (_, body) = send(&router, "GET", "/api/packages/tool/versions", None, None, None).await;
    let versions = body["data"].as_array().unwrap();
    let downloads_of = |v: &str| {
        versions
            .iter()
            .find(|entry| entry["version"] == json!(v))
            .map(|entry| entry["downloads"].clone())
    };
    assert_eq!(downloads_of("1.0.0"), Some(json!(1)));
    assert_eq!(downloads_of("2.0.0"), Some(json!(0)));

    let (status, _) = send(&router, "POST", "/api/packages/tool/download?version=9.9.9", None, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, stats) = send(&router, "GET", "/api/packages/tool/downloads", None, None, None).await;
    assert_eq!(stats["data"]["downloads"], json!(1));
}

#[tokio::test]
async fn test_issued_admin_username_is_not_bootstrap_admin() {
    let router = app();
    publish(&router, "tool", "1.0.0").await;
    let (status, _) = send(&router, "POST", "/api/packages/tool/reviews", Some(json!({"rating": 5})), Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::CREATED);

    let namesake = issue_token(&router, "admin").await;
    let (status, _) = send(&router, "DELETE", "/api/packages/tool/reviews", None, Some(&namesake), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, info) = send(&router, "GET", "/api/packages/tool/info", None, None, None).await;
    assert_eq!(info["data"]["totalRatings"], json!(1));

    let (status, body) = send(
        &router,
        "POST",
        "/api/auth/tokens",
        Some(json!({"username": ":admin"})),
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
}
