use axum::{
    response::Redirect,
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;

use super::auth::issue_token_handler;
use super::handlers::*;
use super::reviews::*;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();

    let router = Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/packages",
            get(list_packages_handler).post(publish_package_handler),
        )
        .route("/api/packages/categories", get(categories_handler))
        .route("/api/packages/tags", get(tags_handler))
        .route("/api/packages/stats", get(stats_handler))
        .route(
            "/api/packages/:id",
            get(get_manifest_handler).delete(delete_package_handler),
        )
        .route("/api/packages/:id/info", get(package_info_handler))
        .route("/api/packages/:id/downloads", get(download_stats_handler))
        .route("/api/packages/:id/download", post(track_download_handler))
        .route("/api/packages/:id/versions", get(list_versions_handler))
        .route("/api/packages/:id/versions/:version", get(get_version_handler))
        .route(
            "/api/packages/:id/reviews",
            get(list_reviews_handler)
                .post(submit_review_handler)
                .delete(delete_review_handler),
        )
        .route(
            "/api/packages/:id/reviews/:review_id/vote",
            post(vote_review_handler),
        )
        .route("/api/packages/:id/ratings/rebuild", post(rebuild_ratings_handler))
        .route("/api/packages/:id/deprecate", post(deprecate_package_handler))
        .route("/api/packages/:id/undeprecate", post(undeprecate_package_handler))
        .route("/api/packages/:id/dependencies", get(dependencies_handler))
        .route("/api/packages/:id/dependents", get(dependents_handler))
        .route("/api/auth/tokens", post(issue_token_handler))
        .route(
            "/registry/index.json",
            get(|| async { Redirect::permanent("/api/packages") }),
        )
        .with_state(state);

    match static_dir {
        Some(dir) => {
            tracing::info!("Serving static files from {}", dir.display());
            router.fallback_service(ServeDir::new(dir))
        }
        None => router,
    }
}
