//! Record store contract shared by the Postgres and in-memory backends.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::error::StoreResult;
use super::models::*;
use crate::analytics::{DownloadStats, RatingChange, RatingSummary};

/// Package, version, review and token records.
///
/// Every method that read-modify-writes a package record holds that record
/// exclusively for the duration of the call, so concurrent downloads and
/// reviews on one package never lose updates.
#[async_trait]
pub trait PackageStore: Send + Sync {
    async fn health_check(&self) -> StoreResult<()>;

    async fn list_packages(&self, query: &PackageQuery) -> StoreResult<Vec<Package>>;

    async fn get_package(&self, id: &str) -> StoreResult<Option<Package>>;

    /// Create the package or move it to a new version and record the version entry.
    /// Publishing a version the package already has is a `Conflict`.
    async fn publish(
        &self,
        manifest: &Manifest,
        document: Value,
        publisher: &Caller,
        now: DateTime<Utc>,
    ) -> StoreResult<PublishOutcome>;

    /// Remove a package together with its versions and reviews.
    async fn delete_package(&self, id: &str) -> StoreResult<bool>;

    async fn set_deprecation(&self, id: &str, deprecation: Deprecation) -> StoreResult<bool>;

    async fn list_versions(&self, id: &str) -> StoreResult<Vec<PackageVersion>>;

    async fn get_version(&self, id: &str, version: &str) -> StoreResult<Option<PackageVersion>>;

    /// Count one download of the package, credited to `version` or, when
    /// `None`, to the current version. Returns `None` when the package does not exist.
    async fn record_download(
        &self,
        id: &str,
        version: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<DownloadStats>>;

    /// Adjust the rating aggregate. A missing package is a silent no-op.
    async fn apply_rating_change(&self, id: &str, change: RatingChange) -> StoreResult<()>;

    /// Recompute the rating aggregate from the package's reviews.
    async fn rebuild_ratings(&self, id: &str) -> StoreResult<Option<RatingSummary>>;

    async fn list_reviews(&self, id: &str, sort: ReviewSort, limit: i64) -> StoreResult<Vec<Review>>;

    /// Create the caller's review or update it in place, adjusting the aggregate
    /// in the same atomic step. Fails with `NotFound` when the package is missing.
    async fn submit_review(&self, submission: ReviewSubmission, now: DateTime<Utc>) -> StoreResult<ReviewOutcome>;

    /// Delete the user's review and adjust the aggregate; returns the removed review.
    async fn delete_review(&self, id: &str, user_id: &str) -> StoreResult<Option<Review>>;

    async fn vote_review(&self, id: &str, review_id: Uuid, helpful: bool) -> StoreResult<Option<Review>>;

    async fn dependents(&self, id: &str, limit: i64) -> StoreResult<Vec<Package>>;

    async fn category_counts(&self) -> StoreResult<Vec<FacetCount>>;

    async fn tag_counts(&self, limit: i64) -> StoreResult<Vec<FacetCount>>;

    /// Registry-wide rollups; daily downloads cover the 30 days up to `today`.
    async fn stats(&self, today: NaiveDate) -> StoreResult<RegistryStats>;

    async fn create_token(&self, record: TokenRecord) -> StoreResult<()>;

    async fn find_token(&self, token_hash: &str) -> StoreResult<Option<TokenRecord>>;
}
