use std::sync::OnceLock;

use axum::{
    extract::{Path, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::auth::AdminUser;
use super::extract::{ApiJson, ApiQuery};
use super::response::ApiResponse;
use crate::analytics::{local_day, DownloadStats};
use crate::db::models::*;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 100;
const TAG_LIMIT: i64 = 50;
const DEPENDENTS_LIMIT: i64 = 50;
const INFO_REVIEW_COUNT: i64 = 5;
const MAX_VERSION_LEN: usize = 64;

/// User-Agent marker sent by the `nex` CLI when it installs a package.
const CLI_AGENT_MARKER: &str = "nex/";

fn package_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([a-z0-9.-]*[a-z0-9])?$").expect("package id pattern compiles")
    })
}

pub fn is_valid_package_id(id: &str) -> bool {
    id.len() <= 214 && package_id_pattern().is_match(id)
}

pub(crate) fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, max)
}

/// Numeric query value. Anything unparsable falls back to the default.
pub(crate) fn parse_limit(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse().ok())
}

/// Only the literal strings `true` and `false` are flags; other values are ignored.
pub(crate) fn parse_flag(raw: Option<&str>) -> Option<bool> {
    match raw {
        Some("true") => Some(true),
        Some("false") => Some(false),
        _ => None,
    }
}

fn package_not_found() -> ApiError {
    ApiError::NotFound("Package not found".to_string())
}

pub(crate) async fn require_package(state: &AppState, id: &str) -> ApiResult<Package> {
    state.store.get_package(id).await?.ok_or_else(package_not_found)
}

pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<String>>> {
    state.store.health_check().await?;
    Ok(Json(ApiResponse::success("OK".to_string())))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub tag: Option<String>,
    pub deprecated: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<String>,
}

impl ListQuery {
    fn into_package_query(self) -> PackageQuery {
        PackageQuery {
            category: self.category.filter(|c| !c.is_empty()),
            tag: self.tag.filter(|t| !t.is_empty()),
            deprecated: parse_flag(self.deprecated.as_deref()),
            search: self
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            sort: self.sort.as_deref().map(PackageSort::parse).unwrap_or_default(),
            limit: clamp_limit(
                parse_limit(self.limit.as_deref()),
                DEFAULT_LIST_LIMIT,
                MAX_LIST_LIMIT,
            ),
        }
    }
}

/// GET /api/packages
pub async fn list_packages_handler(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListQuery>,
) -> ApiResult<Json<ApiResponse<Vec<PackageSummary>>>> {
    let query = params.into_package_query();
    let packages = state.store.list_packages(&query).await?;
    Ok(Json(ApiResponse::success(
        packages.into_iter().map(PackageSummary::from).collect(),
    )))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    pub id: String,
    pub version: String,
    pub created: bool,
}

fn validate_manifest(manifest: &Manifest) -> ApiResult<()> {
    if manifest.id.is_empty() || manifest.name.trim().is_empty() || manifest.version.is_empty() {
        return Err(ApiError::BadRequest(
            "Package must have id, name, and version".to_string(),
        ));
    }
    if !is_valid_package_id(&manifest.id) {
        return Err(ApiError::BadRequest(
            "Package id must be lowercase letters, digits, dots and hyphens".to_string(),
        ));
    }
    if manifest.version.len() > MAX_VERSION_LEN || manifest.version.chars().any(char::is_whitespace) {
        return Err(ApiError::BadRequest("Invalid version".to_string()));
    }
    if let Some(deps) = &manifest.dependencies {
        if deps.iter().any(|d| d.package_id == manifest.id) {
            return Err(ApiError::BadRequest(
                "A package cannot depend on itself".to_string(),
            ));
        }
    }
    Ok(())
}

/// POST /api/packages
pub async fn publish_package_handler(
    State(state): State<AppState>,
    AdminUser(caller): AdminUser,
    ApiJson(document): ApiJson<Value>,
) -> ApiResult<(StatusCode, Json<ApiResponse<PublishResult>>)> {
    if !document.is_object() {
        return Err(ApiError::BadRequest("Manifest must be a JSON object".to_string()));
    }
    let manifest: Manifest = serde_json::from_value(document.clone())
        .map_err(|e| ApiError::BadRequest(format!("Invalid manifest: {}", e)))?;
    validate_manifest(&manifest)?;

    let outcome = state
        .store
        .publish(&manifest, document, &caller, Utc::now())
        .await?;

    let created = outcome == PublishOutcome::Created;
    tracing::info!(
        package = %manifest.id,
        version = %manifest.version,
        publisher = %caller.username,
        created,
        "package published"
    );

    let (status, message) = if created {
        (StatusCode::CREATED, "Package published successfully")
    } else {
        (StatusCode::OK, "Package updated successfully")
    };
    Ok((
        status,
        Json(ApiResponse::with_message(
            PublishResult {
                id: manifest.id,
                version: manifest.version,
                created,
            },
            message,
        )),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ManifestQuery {
    pub download: Option<String>,
}

fn should_track_download(headers: &HeaderMap, query: &ManifestQuery) -> bool {
    let from_cli = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|ua| ua.contains(CLI_AGENT_MARKER))
        .unwrap_or(false);
    from_cli || parse_flag(query.download.as_deref()) == Some(true)
}

/// GET /api/packages/:id
///
/// Returns the stored manifest. Fetches from the CLI, or with `download=true`,
/// count as a download.
pub async fn get_manifest_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<ManifestQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<ApiResponse<Value>>> {
    let package = require_package(&state, &id).await?;

    if should_track_download(&headers, &query) {
        // Serving the manifest does not depend on the counter write.
        match state.store.record_download(&id, None, Utc::now()).await {
            Ok(Some(stats)) => tracing::debug!(package = %id, downloads = stats.downloads, "download tracked"),
            Ok(None) => tracing::warn!(package = %id, "package vanished before download was tracked"),
            Err(e) => tracing::error!(package = %id, "Track download error: {}", e),
        }
    }

    Ok(Json(ApiResponse::success(package.manifest)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    #[serde(flatten)]
    pub package: PackageSummary,
    pub reviews: Vec<Review>,
}

/// GET /api/packages/:id/info
pub async fn package_info_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<PackageInfo>>> {
    let package = require_package(&state, &id).await?;
    let reviews = state
        .store
        .list_reviews(&id, ReviewSort::Recent, INFO_REVIEW_COUNT)
        .await?;
    Ok(Json(ApiResponse::success(PackageInfo {
        package: package.into(),
        reviews,
    })))
}

/// GET /api/packages/:id/downloads
pub async fn download_stats_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<DownloadStats>>> {
    let package = require_package(&state, &id).await?;
    Ok(Json(ApiResponse::success(package.download_stats)))
}

#[derive(Debug, Serialize)]
pub struct DownloadCount {
    pub downloads: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct TrackDownloadQuery {
    pub version: Option<String>,
}

/// POST /api/packages/:id/download
///
/// `?version=` credits that version's counter; otherwise the current version.
pub async fn track_download_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<TrackDownloadQuery>,
) -> ApiResult<Json<ApiResponse<DownloadCount>>> {
    let version = query.version.filter(|v| !v.is_empty());
    if let Some(version) = &version {
        if state.store.get_version(&id, version).await?.is_none() {
            require_package(&state, &id).await?;
            return Err(ApiError::NotFound("Version not found".to_string()));
        }
    }
    let stats = state
        .store
        .record_download(&id, version.as_deref(), Utc::now())
        .await?
        .ok_or_else(package_not_found)?;
    tracing::debug!(package = %id, version = ?version, downloads = stats.downloads, "download tracked");
    Ok(Json(ApiResponse::success(DownloadCount {
        downloads: stats.downloads,
    })))
}

/// GET /api/packages/:id/versions
pub async fn list_versions_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<Vec<VersionSummary>>>> {
    require_package(&state, &id).await?;
    let versions = state.store.list_versions(&id).await?;
    Ok(Json(ApiResponse::success(
        versions.into_iter().map(VersionSummary::from).collect(),
    )))
}

/// GET /api/packages/:id/versions/:version
pub async fn get_version_handler(
    State(state): State<AppState>,
    Path((id, version)): Path<(String, String)>,
) -> ApiResult<Json<ApiResponse<PackageVersion>>> {
    let found = state
        .store
        .get_version(&id, &version)
        .await?
        .ok_or_else(|| ApiError::NotFound("Version not found".to_string()))?;
    Ok(Json(ApiResponse::success(found)))
}

/// DELETE /api/packages/:id
pub async fn delete_package_handler(
    State(state): State<AppState>,
    AdminUser(caller): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<()>>> {
    if !state.store.delete_package(&id).await? {
        return Err(package_not_found());
    }
    tracing::info!(package = %id, by = %caller.username, "package deleted");
    Ok(Json(ApiResponse::message("Package deleted successfully")))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeprecateRequest {
    pub message: Option<String>,
    pub replacement_package: Option<String>,
}

/// POST /api/packages/:id/deprecate
pub async fn deprecate_package_handler(
    State(state): State<AppState>,
    AdminUser(caller): AdminUser,
    Path(id): Path<String>,
    body: Option<ApiJson<DeprecateRequest>>,
) -> ApiResult<Json<ApiResponse<Deprecation>>> {
    let req = body.map(|ApiJson(req)| req).unwrap_or_default();
    let deprecation = Deprecation::deprecate(
        req.message.filter(|m| !m.trim().is_empty()),
        req.replacement_package.filter(|r| !r.is_empty()),
        Utc::now(),
    );
    if !state.store.set_deprecation(&id, deprecation.clone()).await? {
        return Err(package_not_found());
    }
    tracing::info!(package = %id, by = %caller.username, "package deprecated");
    Ok(Json(ApiResponse::with_message(deprecation, "Package deprecated")))
}

/// POST /api/packages/:id/undeprecate
pub async fn undeprecate_package_handler(
    State(state): State<AppState>,
    AdminUser(caller): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<()>>> {
    if !state.store.set_deprecation(&id, Deprecation::default()).await? {
        return Err(package_not_found());
    }
    tracing::info!(package = %id, by = %caller.username, "package undeprecated");
    Ok(Json(ApiResponse::message("Package undeprecated")))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedDependency {
    pub package_id: String,
    pub version: Option<String>,
    pub package: Option<PackageSummary>,
}

/// GET /api/packages/:id/dependencies
pub async fn dependencies_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<Vec<ResolvedDependency>>>> {
    let package = require_package(&state, &id).await?;
    let mut resolved = Vec::with_capacity(package.dependencies.len());
    for dep in package.dependencies {
        let found = state.store.get_package(&dep.package_id).await?;
        resolved.push(ResolvedDependency {
            package_id: dep.package_id,
            version: dep.version,
            package: found.map(PackageSummary::from),
        });
    }
    Ok(Json(ApiResponse::success(resolved)))
}

/// GET /api/packages/:id/dependents
pub async fn dependents_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<Vec<PackageSummary>>>> {
    let dependents = state.store.dependents(&id, DEPENDENTS_LIMIT).await?;
    Ok(Json(ApiResponse::success(
        dependents.into_iter().map(PackageSummary::from).collect(),
    )))
}

/// GET /api/packages/categories
pub async fn categories_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<Vec<FacetCount>>>> {
    Ok(Json(ApiResponse::success(state.store.category_counts().await?)))
}

/// GET /api/packages/tags
pub async fn tags_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<Vec<FacetCount>>>> {
    Ok(Json(ApiResponse::success(state.store.tag_counts(TAG_LIMIT).await?)))
}

/// GET /api/packages/stats
pub async fn stats_handler(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
) -> ApiResult<Json<ApiResponse<RegistryStats>>> {
    let stats = state.store.stats(local_day(Utc::now())).await?;
    Ok(Json(ApiResponse::success(stats)))
}
