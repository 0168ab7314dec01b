//! In-memory record store used by tests and by `DATABASE_URL=memory://`.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::error::{StoreError, StoreResult};
use super::models::*;
use super::store::PackageStore;
use crate::analytics::downloads::MONTHLY_WINDOW_DAYS;
use crate::analytics::{local_day, DailyDownloads, DownloadStats, RatingChange, RatingSummary};

#[derive(Default)]
struct MemoryState {
    packages: HashMap<String, Package>,
    versions: Vec<PackageVersion>,
    reviews: Vec<Review>,
    tokens: HashMap<String, TokenRecord>,
}

impl MemoryState {
    fn adjust_rating(&mut self, id: &str, change: RatingChange) -> bool {
        match self.packages.get_mut(id) {
            Some(pkg) => {
                pkg.rating.apply(change);
                true
            }
            None => false,
        }
    }
}

/// Every operation runs under one write lock, which makes each
/// read-modify-write of a package atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn take(limit: i64) -> usize {
    limit.max(0) as usize
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn matches_query(pkg: &Package, query: &PackageQuery) -> bool {
    if let Some(category) = &query.category {
        if &pkg.category != category {
            return false;
        }
    }
    if let Some(tag) = &query.tag {
        if !pkg.tags.iter().any(|t| t == tag) {
            return false;
        }
    }
    if let Some(deprecated) = query.deprecated {
        if pkg.deprecation.deprecated != deprecated {
            return false;
        }
    }
    if let Some(search) = &query.search {
        let in_description = pkg
            .description
            .as_deref()
            .map(|d| contains_ignore_case(d, search))
            .unwrap_or(false);
        if !(contains_ignore_case(&pkg.id, search) || contains_ignore_case(&pkg.name, search) || in_description) {
            return false;
        }
    }
    true
}

fn sort_packages(packages: &mut [Package], sort: PackageSort) {
    match sort {
        PackageSort::Newest => packages.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id))),
        PackageSort::Downloads => packages.sort_by(|a, b| {
            b.download_stats
                .downloads
                .cmp(&a.download_stats.downloads)
                .then(a.id.cmp(&b.id))
        }),
        PackageSort::Rating => packages.sort_by(|a, b| {
            b.rating
                .average_rating
                .total_cmp(&a.rating.average_rating)
                .then(a.id.cmp(&b.id))
        }),
        PackageSort::Updated => packages.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id))),
        PackageSort::Name => packages.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id))),
    }
}

fn group_downloads<F>(packages: &HashMap<String, Package>, key: F) -> Vec<GroupDownloads>
where
    F: Fn(&Package) -> Option<String>,
{
    let mut groups: BTreeMap<Option<String>, (i64, i64)> = BTreeMap::new();
    for pkg in packages.values() {
        let entry = groups.entry(key(pkg)).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += pkg.download_stats.downloads as i64;
    }
    let mut rows: Vec<GroupDownloads> = groups
        .into_iter()
        .map(|(name, (count, downloads))| GroupDownloads { name, count, downloads })
        .collect();
    rows.sort_by_key(|g| Reverse(g.downloads));
    rows
}

fn facet_counts<'a, I>(names: I) -> Vec<FacetCount>
where
    I: Iterator<Item = &'a String>,
{
    let mut counts: BTreeMap<&String, i64> = BTreeMap::new();
    for name in names {
        *counts.entry(name).or_insert(0) += 1;
    }
    let mut rows: Vec<FacetCount> = counts
        .into_iter()
        .map(|(name, count)| FacetCount { name: name.clone(), count })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then(a.name.cmp(&b.name)));
    rows
}

#[async_trait]
impl PackageStore for MemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn list_packages(&self, query: &PackageQuery) -> StoreResult<Vec<Package>> {
        let state = self.state.read().await;
        let mut packages: Vec<Package> = state
            .packages
            .values()
            .filter(|pkg| matches_query(pkg, query))
            .cloned()
            .collect();
        sort_packages(&mut packages, query.sort);
        packages.truncate(take(query.limit));
        Ok(packages)
    }

    async fn get_package(&self, id: &str) -> StoreResult<Option<Package>> {
        Ok(self.state.read().await.packages.get(id).cloned())
    }

    async fn publish(
        &self,
        manifest: &Manifest,
        document: Value,
        publisher: &Caller,
        now: DateTime<Utc>,
    ) -> StoreResult<PublishOutcome> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let outcome = match state.packages.get_mut(&manifest.id) {
            Some(pkg) => {
                if pkg.has_version(&manifest.version) {
                    return Err(StoreError::Conflict(format!(
                        "Version {} already exists",
                        manifest.version
                    )));
                }
                pkg.apply_manifest(manifest, document.clone(), now);
                PublishOutcome::Updated
            }
            None => {
                let pkg = Package::from_manifest(manifest, document.clone(), &publisher.user_id, now);
                state.packages.insert(pkg.id.clone(), pkg);
                PublishOutcome::Created
            }
        };

        let exists = state
            .versions
            .iter()
            .any(|v| v.package_id == manifest.id && v.version == manifest.version);
        if !exists {
            state.versions.push(PackageVersion {
                package_id: manifest.id.clone(),
                version: manifest.version.clone(),
                changelog: manifest.changelog.clone().unwrap_or_default(),
                manifest: document,
                downloads: 0,
                published_at: now,
                published_by: Some(publisher.user_id.clone()),
                deprecated: false,
                deprecation_message: None,
            });
        }
        Ok(outcome)
    }

    async fn delete_package(&self, id: &str) -> StoreResult<bool> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        if state.packages.remove(id).is_none() {
            return Ok(false);
        }
        state.versions.retain(|v| v.package_id != id);
        state.reviews.retain(|r| r.package_id != id);
        Ok(true)
    }

    async fn set_deprecation(&self, id: &str, deprecation: Deprecation) -> StoreResult<bool> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        match state.packages.get_mut(id) {
            Some(pkg) => {
                pkg.deprecation = deprecation;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_versions(&self, id: &str) -> StoreResult<Vec<PackageVersion>> {
        let state = self.state.read().await;
        let mut versions: Vec<PackageVersion> = state
            .versions
            .iter()
            .filter(|v| v.package_id == id)
            .cloned()
            .collect();
        // Newest first; among equal timestamps the later publish wins.
        versions.reverse();
        versions.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(versions)
    }

    async fn get_version(&self, id: &str, version: &str) -> StoreResult<Option<PackageVersion>> {
        let state = self.state.read().await;
        Ok(state
            .versions
            .iter()
            .find(|v| v.package_id == id && v.version == version)
            .cloned())
    }

    async fn record_download(
        &self,
        id: &str,
        version: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<DownloadStats>> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let (stats, credited) = match state.packages.get_mut(id) {
            Some(pkg) => {
                pkg.download_stats.record_download(now, local_day(now));
                let credited = version.map_or_else(|| pkg.version.clone(), str::to_string);
                (pkg.download_stats.clone(), credited)
            }
            None => return Ok(None),
        };
        if let Some(version) = state
            .versions
            .iter_mut()
            .find(|v| v.package_id == id && v.version == credited)
        {
            version.downloads += 1;
        }
        Ok(Some(stats))
    }

    async fn apply_rating_change(&self, id: &str, change: RatingChange) -> StoreResult<()> {
        self.state.write().await.adjust_rating(id, change);
        Ok(())
    }

    async fn rebuild_ratings(&self, id: &str) -> StoreResult<Option<RatingSummary>> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let summary = RatingSummary::from_ratings(
            state.reviews.iter().filter(|r| r.package_id == id).map(|r| r.rating),
        );
        match state.packages.get_mut(id) {
            Some(pkg) => {
                pkg.rating = summary.clone();
                Ok(Some(summary))
            }
            None => Ok(None),
        }
    }

    async fn list_reviews(&self, id: &str, sort: ReviewSort, limit: i64) -> StoreResult<Vec<Review>> {
        let state = self.state.read().await;
        let mut reviews: Vec<Review> = state
            .reviews
            .iter()
            .filter(|r| r.package_id == id)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| {
            let primary = match sort {
                ReviewSort::Recent => std::cmp::Ordering::Equal,
                ReviewSort::Helpful => b.helpful.cmp(&a.helpful),
                ReviewSort::RatingHigh => b.rating.cmp(&a.rating),
                ReviewSort::RatingLow => a.rating.cmp(&b.rating),
            };
            primary.then(b.created_at.cmp(&a.created_at))
        });
        reviews.truncate(take(limit));
        Ok(reviews)
    }

    async fn submit_review(&self, submission: ReviewSubmission, now: DateTime<Utc>) -> StoreResult<ReviewOutcome> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        if !state.packages.contains_key(&submission.package_id) {
            return Err(StoreError::NotFound(format!("package {}", submission.package_id)));
        }

        let existing = state
            .reviews
            .iter_mut()
            .find(|r| r.package_id == submission.package_id && r.user_id == submission.user_id);

        let (review, change) = match existing {
            Some(review) => {
                let previous = review.rating;
                review.rating = submission.rating;
                review.title = submission.title;
                review.comment = submission.comment;
                review.updated_at = now;
                (
                    review.clone(),
                    RatingChange::Changed { from: previous, to: submission.rating },
                )
            }
            None => {
                let review = Review {
                    id: Uuid::new_v4(),
                    package_id: submission.package_id.clone(),
                    user_id: submission.user_id,
                    username: submission.username,
                    rating: submission.rating,
                    title: submission.title,
                    comment: submission.comment,
                    helpful: 0,
                    not_helpful: 0,
                    created_at: now,
                    updated_at: now,
                };
                state.reviews.push(review.clone());
                (review, RatingChange::Added(submission.rating))
            }
        };

        state.adjust_rating(&submission.package_id, change);
        Ok(ReviewOutcome {
            updated: matches!(change, RatingChange::Changed { .. }),
            review,
        })
    }

    async fn delete_review(&self, id: &str, user_id: &str) -> StoreResult<Option<Review>> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let Some(pos) = state
            .reviews
            .iter()
            .position(|r| r.package_id == id && r.user_id == user_id)
        else {
            return Ok(None);
        };
        let review = state.reviews.remove(pos);
        state.adjust_rating(id, RatingChange::Removed(review.rating));
        Ok(Some(review))
    }

    async fn vote_review(&self, id: &str, review_id: Uuid, helpful: bool) -> StoreResult<Option<Review>> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let review = state
            .reviews
            .iter_mut()
            .find(|r| r.package_id == id && r.id == review_id);
        Ok(review.map(|review| {
            if helpful {
                review.helpful += 1;
            } else {
                review.not_helpful += 1;
            }
            review.clone()
        }))
    }

    async fn dependents(&self, id: &str, limit: i64) -> StoreResult<Vec<Package>> {
        let state = self.state.read().await;
        let mut packages: Vec<Package> = state
            .packages
            .values()
            .filter(|pkg| pkg.depends_on(id))
            .cloned()
            .collect();
        packages.sort_by(|a, b| a.id.cmp(&b.id));
        packages.truncate(take(limit));
        Ok(packages)
    }

    async fn category_counts(&self) -> StoreResult<Vec<FacetCount>> {
        let state = self.state.read().await;
        Ok(facet_counts(
            state
                .packages
                .values()
                .filter(|pkg| !pkg.deprecation.deprecated)
                .map(|pkg| &pkg.category),
        ))
    }

    async fn tag_counts(&self, limit: i64) -> StoreResult<Vec<FacetCount>> {
        let state = self.state.read().await;
        let mut rows = facet_counts(state.packages.values().flat_map(|pkg| pkg.tags.iter()));
        rows.truncate(take(limit));
        Ok(rows)
    }

    async fn stats(&self, today: NaiveDate) -> StoreResult<RegistryStats> {
        let state = self.state.read().await;

        let mut by_downloads: Vec<Package> = state.packages.values().cloned().collect();
        sort_packages(&mut by_downloads, PackageSort::Downloads);
        let mut by_created = by_downloads.clone();
        sort_packages(&mut by_created, PackageSort::Newest);

        let since = today - Duration::days(MONTHLY_WINDOW_DAYS);
        let mut daily: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        for pkg in state.packages.values() {
            for entry in pkg.download_stats.download_history.iter().filter(|e| e.date >= since) {
                *daily.entry(entry.date).or_insert(0) += entry.count;
            }
        }

        let users: HashSet<&String> = state.tokens.values().map(|t| &t.user_id).collect();

        Ok(RegistryStats {
            total_packages: state.packages.len() as i64,
            total_users: users.len() as i64,
            total_downloads: state
                .packages
                .values()
                .map(|pkg| pkg.download_stats.downloads as i64)
                .sum(),
            deprecated_count: state
                .packages
                .values()
                .filter(|pkg| pkg.deprecation.deprecated)
                .count() as i64,
            top_packages: by_downloads.into_iter().take(10).map(PackageSummary::from).collect(),
            recent_packages: by_created.into_iter().take(5).map(PackageSummary::from).collect(),
            downloads_by_runtime: group_downloads(&state.packages, |pkg| {
                pkg.runtime.as_ref().and_then(|r| r.kind.clone())
            }),
            downloads_by_category: group_downloads(&state.packages, |pkg| Some(pkg.category.clone())),
            daily_downloads: daily
                .into_iter()
                .map(|(date, count)| DailyDownloads { date, count })
                .collect(),
        })
    }

    async fn create_token(&self, record: TokenRecord) -> StoreResult<()> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        if state.tokens.contains_key(&record.token_hash) {
            return Err(StoreError::Conflict("token already exists".to_string()));
        }
        state.tokens.insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn find_token(&self, token_hash: &str) -> StoreResult<Option<TokenRecord>> {
        Ok(self.state.read().await.tokens.get(token_hash).cloned())
    }
}
