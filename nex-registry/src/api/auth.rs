//! Token authentication extractors and token issuance.

use axum::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::extract::ApiJson;
use super::response::ApiResponse;
use crate::db::models::{Caller, Role, TokenRecord};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub const TOKEN_HEADER: &str = "x-auth-token";

const MAX_USERNAME_LEN: usize = 64;

/// Identity of the `ADMIN_TOKEN` caller. Issued usernames may not start with
/// `:`, so no stored token can act as this user.
pub const BOOTSTRAP_ADMIN_ID: &str = ":admin";

/// Any authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Caller);

/// An authenticated caller holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Caller);

/// Hash a token for storage lookup.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Token from `x-auth-token`, falling back to `Authorization: Bearer`.
fn extract_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()) {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() > 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(v[7..].trim())
            } else {
                None
            }
        })
}

fn bootstrap_admin() -> Caller {
    Caller {
        user_id: BOOTSTRAP_ADMIN_ID.to_string(),
        username: "admin".to_string(),
        role: Role::Admin,
    }
}

async fn authenticate(state: &AppState, token: &str) -> ApiResult<Caller> {
    if state.config.admin_token.as_deref() == Some(token) {
        return Ok(bootstrap_admin());
    }
    match state.store.find_token(&hash_token(token)).await? {
        Some(record) => Ok(record.caller()),
        None => Err(ApiError::Unauthorized("Token is not valid".to_string())),
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("No token, authorization denied".to_string()))?;
        let caller = authenticate(state, token).await?;
        tracing::debug!(user = %caller.username, role = caller.role.as_str(), "authenticated request");
        Ok(CurrentUser(caller))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(caller) = CurrentUser::from_request_parts(parts, state).await?;
        if !caller.is_admin() {
            return Err(ApiError::Forbidden("Admin access required".to_string()));
        }
        Ok(AdminUser(caller))
    }
}

#[derive(Debug, Deserialize)]
pub struct IssueTokenRequest {
    pub username: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub user_id: String,
    pub username: String,
    pub role: Role,
}

fn is_reserved_username(username: &str) -> bool {
    username.starts_with(':')
}

fn generate_token() -> String {
    format!("nex_{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// POST /api/auth/tokens
pub async fn issue_token_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(req): ApiJson<IssueTokenRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<IssuedToken>>)> {
    let username = req.username.trim();
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "Username must be 1 to {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(ApiError::BadRequest("Username cannot contain whitespace".to_string()));
    }
    if is_reserved_username(username) {
        return Err(ApiError::BadRequest("Username is reserved".to_string()));
    }

    let role = req.role.unwrap_or(Role::User);
    let token = generate_token();
    state
        .store
        .create_token(TokenRecord {
            token_hash: hash_token(&token),
            user_id: username.to_string(),
            username: username.to_string(),
            role,
            created_at: Utc::now(),
        })
        .await?;

    tracing::info!(issued_by = %admin.username, user = %username, role = role.as_str(), "issued API token");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(IssuedToken {
            token,
            user_id: username.to_string(),
            username: username.to_string(),
            role,
        })),
    ))
}
