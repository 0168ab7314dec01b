//! Review endpoints. Every write adjusts the package's rating aggregate in the
//! same store operation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::auth::{AdminUser, CurrentUser};
use super::extract::{ApiJson, ApiQuery};
use super::handlers::{clamp_limit, parse_limit, require_package, MAX_LIST_LIMIT};
use super::response::ApiResponse;
use crate::analytics::{Rating, RatingSummary};
use crate::db::models::{Review, ReviewSort, ReviewSubmission};
use crate::db::StoreError;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_REVIEW_LIMIT: i64 = 20;
pub const MAX_TITLE_LEN: usize = 100;
pub const MAX_COMMENT_LEN: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct ReviewListQuery {
    pub sort: Option<String>,
    pub limit: Option<String>,
}

/// GET /api/packages/:id/reviews
pub async fn list_reviews_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiQuery(params): ApiQuery<ReviewListQuery>,
) -> ApiResult<Json<ApiResponse<Vec<Review>>>> {
    require_package(&state, &id).await?;
    let sort = params.sort.as_deref().map(ReviewSort::parse).unwrap_or_default();
    let limit = clamp_limit(
        parse_limit(params.limit.as_deref()),
        DEFAULT_REVIEW_LIMIT,
        MAX_LIST_LIMIT,
    );
    let reviews = state.store.list_reviews(&id, sort, limit).await?;
    Ok(Json(ApiResponse::success(reviews)))
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub rating: Option<Value>,
    pub title: Option<String>,
    pub comment: Option<String>,
}

/// Accepts any JSON number with an integral value in range, so `4` and `4.0` agree.
fn parse_rating(value: Option<&Value>) -> ApiResult<Rating> {
    let number = match value {
        None | Some(Value::Null) => {
            return Err(ApiError::BadRequest("Rating is required".to_string()))
        }
        Some(Value::Number(n)) => n,
        Some(_) => return Err(ApiError::BadRequest("Rating must be a number".to_string())),
    };
    let whole = match (number.as_i64(), number.as_f64()) {
        (Some(i), _) => i,
        (None, Some(f)) if f.fract() == 0.0 && f.abs() <= i64::MAX as f64 => f as i64,
        _ => {
            return Err(ApiError::BadRequest(
                "Rating must be a whole number between 1 and 5".to_string(),
            ))
        }
    };
    Rating::try_from(whole).map_err(ApiError::BadRequest)
}

fn optional_text(value: Option<String>, field: &str, max: usize) -> ApiResult<Option<String>> {
    let Some(text) = value.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    if text.chars().count() > max {
        return Err(ApiError::BadRequest(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(Some(text))
}

/// POST /api/packages/:id/reviews
pub async fn submit_review_handler(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<ReviewRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Review>>)> {
    let rating = parse_rating(req.rating.as_ref())?;
    let title = optional_text(req.title, "Title", MAX_TITLE_LEN)?;
    let comment = optional_text(req.comment, "Comment", MAX_COMMENT_LEN)?;

    let submission = ReviewSubmission {
        package_id: id.clone(),
        user_id: caller.user_id.clone(),
        username: caller.username.clone(),
        rating,
        title,
        comment,
    };
    let outcome = match state.store.submit_review(submission, Utc::now()).await {
        Ok(outcome) => outcome,
        Err(StoreError::NotFound(_)) => {
            return Err(ApiError::NotFound("Package not found".to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(
        package = %id,
        user = %caller.username,
        rating = rating.value(),
        updated = outcome.updated,
        "review saved"
    );

    let (status, message) = if outcome.updated {
        (StatusCode::OK, "Review updated successfully")
    } else {
        (StatusCode::CREATED, "Review submitted successfully")
    };
    Ok((status, Json(ApiResponse::with_message(outcome.review, message))))
}

/// DELETE /api/packages/:id/reviews
pub async fn delete_review_handler(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let removed = state
        .store
        .delete_review(&id, &caller.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Review not found".to_string()))?;
    tracing::info!(package = %id, user = %caller.username, rating = removed.rating.value(), "review deleted");
    Ok(Json(ApiResponse::message("Review deleted successfully")))
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub helpful: bool,
}

/// POST /api/packages/:id/reviews/:review_id/vote
pub async fn vote_review_handler(
    State(state): State<AppState>,
    CurrentUser(_caller): CurrentUser,
    Path((id, review_id)): Path<(String, Uuid)>,
    ApiJson(req): ApiJson<VoteRequest>,
) -> ApiResult<Json<ApiResponse<Review>>> {
    let review = state
        .store
        .vote_review(&id, review_id, req.helpful)
        .await?
        .ok_or_else(|| ApiError::NotFound("Review not found".to_string()))?;
    Ok(Json(ApiResponse::success(review)))
}

/// POST /api/packages/:id/ratings/rebuild
pub async fn rebuild_ratings_handler(
    State(state): State<AppState>,
    AdminUser(caller): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<RatingSummary>>> {
    let summary = state
        .store
        .rebuild_ratings(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Package not found".to_string()))?;
    tracing::info!(
        package = %id,
        by = %caller.username,
        total = summary.total_ratings,
        average = summary.average_rating,
        "rating aggregate rebuilt"
    );
    Ok(Json(ApiResponse::success(summary)))
}
