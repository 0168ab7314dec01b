use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use deadpool_postgres::{Pool, Transaction};
use serde_json::{json, Value};
use tokio_postgres::types::{Json, ToSql};
use tokio_postgres::Row;
use uuid::Uuid;

use super::error::{StoreError, StoreResult};
use super::models::*;
use super::store::PackageStore;
use crate::analytics::downloads::MONTHLY_WINDOW_DAYS;
use crate::analytics::{
    local_day, DailyDownloads, DownloadHistory, DownloadStats, Rating, RatingChange,
    RatingDistribution, RatingSummary,
};

macro_rules! package_columns {
    () => {
        "id, name, version, description, author, license, repository, homepage, runtime, \
         entrypoint, commands, keywords, category, tags, dependencies, manifest, owner, \
         versions, latest_version, deprecated, deprecation_message, deprecated_at, \
         replacement_package, downloads, weekly_downloads, monthly_downloads, download_history, \
         last_downloaded_at, rating_distribution, created_at, updated_at, last_published_at"
    };
}

macro_rules! version_columns {
    () => {
        "package_id, version, changelog, manifest, downloads, published_at, published_by, \
         deprecated, deprecation_message"
    };
}

macro_rules! review_columns {
    () => {
        "id, package_id, user_id, username, rating, title, comment, helpful, not_helpful, \
         created_at, updated_at"
    };
}

const INSERT_PACKAGE: &str = "INSERT INTO packages (
        id, name, version, description, author, license, repository, homepage, runtime,
        entrypoint, commands, keywords, category, tags, dependencies, manifest, versions,
        latest_version, updated_at, last_published_at, owner, created_at)
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
        $18, $19, $20, $21, $22)";

const UPDATE_PACKAGE: &str = "UPDATE packages SET
        name = $2, version = $3, description = $4, author = $5, license = $6,
        repository = $7, homepage = $8, runtime = $9, entrypoint = $10, commands = $11,
        keywords = $12, category = $13, tags = $14, dependencies = $15, manifest = $16,
        versions = $17, latest_version = $18, updated_at = $19, last_published_at = $20
     WHERE id = $1";

/// Postgres-backed store. Per-package atomicity comes from `SELECT ... FOR UPDATE`
/// inside a transaction.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    value.max(0) as u64
}

fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn order_by(sort: PackageSort) -> &'static str {
    match sort {
        PackageSort::Newest => "created_at DESC, id ASC",
        PackageSort::Downloads => "downloads DESC, id ASC",
        PackageSort::Rating => "average_rating DESC, id ASC",
        PackageSort::Updated => "updated_at DESC, id ASC",
        PackageSort::Name => "name ASC, id ASC",
    }
}

fn download_stats_from_row(row: &Row) -> DownloadStats {
    let history: Json<DownloadHistory> = row.get("download_history");
    DownloadStats {
        downloads: to_u64(row.get("downloads")),
        weekly_downloads: to_u64(row.get("weekly_downloads")),
        monthly_downloads: to_u64(row.get("monthly_downloads")),
        download_history: history.0,
        last_downloaded_at: row.get("last_downloaded_at"),
    }
}

fn row_to_package(row: &Row) -> Package {
    let author: Option<Json<Author>> = row.get("author");
    let runtime: Option<Json<Runtime>> = row.get("runtime");
    let commands: Json<BTreeMap<String, String>> = row.get("commands");
    let dependencies: Json<Vec<Dependency>> = row.get("dependencies");
    let distribution: Vec<i64> = row.get("rating_distribution");

    Package {
        id: row.get("id"),
        name: row.get("name"),
        version: row.get("version"),
        description: row.get("description"),
        author: author.map(|a| a.0),
        license: row.get("license"),
        repository: row.get("repository"),
        homepage: row.get("homepage"),
        runtime: runtime.map(|r| r.0),
        entrypoint: row.get("entrypoint"),
        commands: commands.0,
        keywords: row.get("keywords"),
        category: row.get("category"),
        tags: row.get("tags"),
        dependencies: dependencies.0,
        manifest: row.get("manifest"),
        owner: row.get("owner"),
        versions: row.get("versions"),
        latest_version: row.get("latest_version"),
        deprecation: Deprecation {
            deprecated: row.get("deprecated"),
            deprecation_message: row.get("deprecation_message"),
            deprecated_at: row.get("deprecated_at"),
            replacement_package: row.get("replacement_package"),
        },
        download_stats: download_stats_from_row(row),
        rating: RatingSummary::from_distribution(RatingDistribution::from_counts(&distribution)),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_published_at: row.get("last_published_at"),
    }
}

fn row_to_version(row: &Row) -> PackageVersion {
    PackageVersion {
        package_id: row.get("package_id"),
        version: row.get("version"),
        changelog: row.get("changelog"),
        manifest: row.get("manifest"),
        downloads: to_u64(row.get("downloads")),
        published_at: row.get("published_at"),
        published_by: row.get("published_by"),
        deprecated: row.get("deprecated"),
        deprecation_message: row.get("deprecation_message"),
    }
}

fn row_to_review(row: &Row) -> StoreResult<Review> {
    let stored: i16 = row.get("rating");
    let rating = Rating::new(stored as i64)
        .ok_or_else(|| StoreError::InvalidRecord(format!("review rating {}", stored)))?;
    Ok(Review {
        id: row.get("id"),
        package_id: row.get("package_id"),
        user_id: row.get("user_id"),
        username: row.get("username"),
        rating,
        title: row.get("title"),
        comment: row.get("comment"),
        helpful: to_u64(row.get("helpful")),
        not_helpful: to_u64(row.get("not_helpful")),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_token(row: &Row) -> StoreResult<TokenRecord> {
    let role: String = row.get("role");
    Ok(TokenRecord {
        token_hash: row.get("token_hash"),
        user_id: row.get("user_id"),
        username: row.get("username"),
        role: Role::parse(&role).ok_or_else(|| StoreError::InvalidRecord(format!("token role {}", role)))?,
        created_at: row.get("created_at"),
    })
}

async fn write_package(tx: &Transaction<'_>, pkg: &Package, insert: bool) -> StoreResult<()> {
    let author = pkg.author.as_ref().map(Json);
    let runtime = pkg.runtime.as_ref().map(Json);
    let commands = Json(&pkg.commands);
    let dependencies = Json(&pkg.dependencies);
    let params: [&(dyn ToSql + Sync); 22] = [
        &pkg.id,
        &pkg.name,
        &pkg.version,
        &pkg.description,
        &author,
        &pkg.license,
        &pkg.repository,
        &pkg.homepage,
        &runtime,
        &pkg.entrypoint,
        &commands,
        &pkg.keywords,
        &pkg.category,
        &pkg.tags,
        &dependencies,
        &pkg.manifest,
        &pkg.versions,
        &pkg.latest_version,
        &pkg.updated_at,
        &pkg.last_published_at,
        &pkg.owner,
        &pkg.created_at,
    ];
    if insert {
        tx.execute(INSERT_PACKAGE, &params).await?;
    } else {
        tx.execute(UPDATE_PACKAGE, &params[..20]).await?;
    }
    Ok(())
}

/// Lock the package row for the rest of the transaction; false when it does not exist.
async fn lock_package(tx: &Transaction<'_>, id: &str) -> StoreResult<bool> {
    let row = tx
        .query_opt("SELECT 1 FROM packages WHERE id = $1 FOR UPDATE", &[&id])
        .await?;
    Ok(row.is_some())
}

async fn write_rating(tx: &Transaction<'_>, id: &str, summary: &RatingSummary) -> StoreResult<()> {
    let counts: Vec<i64> = summary
        .rating_distribution
        .counts()
        .iter()
        .map(|c| to_i64(*c))
        .collect();
    tx.execute(
        "UPDATE packages
         SET rating_distribution = $2, total_ratings = $3, average_rating = $4
         WHERE id = $1",
        &[&id, &counts, &to_i64(summary.total_ratings), &summary.average_rating],
    )
    .await?;
    Ok(())
}

async fn adjust_rating(tx: &Transaction<'_>, id: &str, change: RatingChange) -> StoreResult<Option<RatingSummary>> {
    let row = tx
        .query_opt(
            "SELECT rating_distribution FROM packages WHERE id = $1 FOR UPDATE",
            &[&id],
        )
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let counts: Vec<i64> = row.get(0);
    let mut summary = RatingSummary::from_distribution(RatingDistribution::from_counts(&counts));
    summary.apply(change);
    write_rating(tx, id, &summary).await?;
    Ok(Some(summary))
}

#[async_trait]
impl PackageStore for PgStore {
    async fn health_check(&self) -> StoreResult<()> {
        let client = self.pool.get().await?;
        client.query_one("SELECT 1", &[]).await?;
        Ok(())
    }

    async fn list_packages(&self, query: &PackageQuery) -> StoreResult<Vec<Package>> {
        let client = self.pool.get().await?;

        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn ToSql + Sync + Send>> = Vec::new();
        if let Some(category) = &query.category {
            params.push(Box::new(category.clone()));
            clauses.push(format!("category = ${}", params.len()));
        }
        if let Some(tag) = &query.tag {
            params.push(Box::new(tag.clone()));
            clauses.push(format!("${} = ANY(tags)", params.len()));
        }
        if let Some(deprecated) = query.deprecated {
            params.push(Box::new(deprecated));
            clauses.push(format!("deprecated = ${}", params.len()));
        }
        if let Some(search) = &query.search {
            params.push(Box::new(format!("%{}%", escape_like(search))));
            let n = params.len();
            clauses.push(format!(
                "(id ILIKE ${n} OR name ILIKE ${n} OR description ILIKE ${n})"
            ));
        }
        params.push(Box::new(query.limit));

        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            concat!("SELECT ", package_columns!(), " FROM packages{} ORDER BY {} LIMIT ${}"),
            filter,
            order_by(query.sort),
            params.len()
        );
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let rows = client.query(sql.as_str(), &refs).await?;
        Ok(rows.iter().map(row_to_package).collect())
    }

    async fn get_package(&self, id: &str) -> StoreResult<Option<Package>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                concat!("SELECT ", package_columns!(), " FROM packages WHERE id = $1"),
                &[&id],
            )
            .await?;
        Ok(row.as_ref().map(row_to_package))
    }

    async fn publish(
        &self,
        manifest: &Manifest,
        document: Value,
        publisher: &Caller,
        now: DateTime<Utc>,
    ) -> StoreResult<PublishOutcome> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let existing = tx
            .query_opt(
                concat!("SELECT ", package_columns!(), " FROM packages WHERE id = $1 FOR UPDATE"),
                &[&manifest.id],
            )
            .await?;

        let outcome = match existing.as_ref().map(row_to_package) {
            Some(mut pkg) => {
                if pkg.has_version(&manifest.version) {
                    return Err(StoreError::Conflict(format!(
                        "Version {} already exists",
                        manifest.version
                    )));
                }
                pkg.apply_manifest(manifest, document.clone(), now);
                write_package(&tx, &pkg, false).await?;
                PublishOutcome::Updated
            }
            None => {
                let pkg = Package::from_manifest(manifest, document.clone(), &publisher.user_id, now);
                write_package(&tx, &pkg, true).await?;
                PublishOutcome::Created
            }
        };

        let changelog = manifest.changelog.clone().unwrap_or_default();
        tx.execute(
            "INSERT INTO package_versions (package_id, version, changelog, manifest, published_at, published_by)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (package_id, version) DO NOTHING",
            &[&manifest.id, &manifest.version, &changelog, &document, &now, &publisher.user_id],
        )
        .await?;

        tx.commit().await?;
        Ok(outcome)
    }

    async fn delete_package(&self, id: &str) -> StoreResult<bool> {
        let client = self.pool.get().await?;
        // Versions and reviews go with the package through ON DELETE CASCADE.
        let deleted = client
            .execute("DELETE FROM packages WHERE id = $1", &[&id])
            .await?;
        Ok(deleted > 0)
    }

    async fn set_deprecation(&self, id: &str, deprecation: Deprecation) -> StoreResult<bool> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE packages
                 SET deprecated = $2, deprecation_message = $3, deprecated_at = $4, replacement_package = $5
                 WHERE id = $1",
                &[
                    &id,
                    &deprecation.deprecated,
                    &deprecation.deprecation_message,
                    &deprecation.deprecated_at,
                    &deprecation.replacement_package,
                ],
            )
            .await?;
        Ok(updated > 0)
    }

    async fn list_versions(&self, id: &str) -> StoreResult<Vec<PackageVersion>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                concat!(
                    "SELECT ", version_columns!(),
                    " FROM package_versions WHERE package_id = $1 ORDER BY published_at DESC"
                ),
                &[&id],
            )
            .await?;
        Ok(rows.iter().map(row_to_version).collect())
    }

    async fn get_version(&self, id: &str, version: &str) -> StoreResult<Option<PackageVersion>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                concat!(
                    "SELECT ", version_columns!(),
                    " FROM package_versions WHERE package_id = $1 AND version = $2"
                ),
                &[&id, &version],
            )
            .await?;
        Ok(row.as_ref().map(row_to_version))
    }

    async fn record_download(
        &self,
        id: &str,
        version: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<DownloadStats>> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let row = tx
            .query_opt(
                "SELECT version, downloads, weekly_downloads, monthly_downloads, download_history, last_downloaded_at
                 FROM packages WHERE id = $1 FOR UPDATE",
                &[&id],
            )
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let credited: String = match version {
            Some(v) => v.to_string(),
            None => row.get("version"),
        };
        let mut stats = download_stats_from_row(&row);
        stats.record_download(now, local_day(now));

        tx.execute(
            "UPDATE packages
             SET downloads = $2, weekly_downloads = $3, monthly_downloads = $4,
                 download_history = $5, last_downloaded_at = $6
             WHERE id = $1",
            &[
                &id,
                &to_i64(stats.downloads),
                &to_i64(stats.weekly_downloads),
                &to_i64(stats.monthly_downloads),
                &Json(&stats.download_history),
                &stats.last_downloaded_at,
            ],
        )
        .await?;
        tx.execute(
            "UPDATE package_versions SET downloads = downloads + 1 WHERE package_id = $1 AND version = $2",
            &[&id, &credited],
        )
        .await?;

        tx.commit().await?;
        Ok(Some(stats))
    }

    async fn apply_rating_change(&self, id: &str, change: RatingChange) -> StoreResult<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        if adjust_rating(&tx, id, change).await?.is_some() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rebuild_ratings(&self, id: &str) -> StoreResult<Option<RatingSummary>> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        if !lock_package(&tx, id).await? {
            return Ok(None);
        }

        let rows = tx
            .query("SELECT rating FROM reviews WHERE package_id = $1", &[&id])
            .await?;
        let ratings = rows
            .iter()
            .map(|row| {
                let stored: i16 = row.get(0);
                Rating::new(stored as i64)
                    .ok_or_else(|| StoreError::InvalidRecord(format!("review rating {}", stored)))
            })
            .collect::<StoreResult<Vec<Rating>>>()?;

        let summary = RatingSummary::from_ratings(ratings);
        write_rating(&tx, id, &summary).await?;
        tx.commit().await?;
        Ok(Some(summary))
    }

    async fn list_reviews(&self, id: &str, sort: ReviewSort, limit: i64) -> StoreResult<Vec<Review>> {
        let client = self.pool.get().await?;
        let sql = match sort {
            ReviewSort::Recent => concat!(
                "SELECT ", review_columns!(),
                " FROM reviews WHERE package_id = $1 ORDER BY created_at DESC LIMIT $2"
            ),
            ReviewSort::Helpful => concat!(
                "SELECT ", review_columns!(),
                " FROM reviews WHERE package_id = $1 ORDER BY helpful DESC, created_at DESC LIMIT $2"
            ),
            ReviewSort::RatingHigh => concat!(
                "SELECT ", review_columns!(),
                " FROM reviews WHERE package_id = $1 ORDER BY rating DESC, created_at DESC LIMIT $2"
            ),
            ReviewSort::RatingLow => concat!(
                "SELECT ", review_columns!(),
                " FROM reviews WHERE package_id = $1 ORDER BY rating ASC, created_at DESC LIMIT $2"
            ),
        };
        let rows = client.query(sql, &[&id, &limit]).await?;
        rows.iter().map(row_to_review).collect()
    }

    async fn submit_review(&self, submission: ReviewSubmission, now: DateTime<Utc>) -> StoreResult<ReviewOutcome> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        if !lock_package(&tx, &submission.package_id).await? {
            return Err(StoreError::NotFound(format!("package {}", submission.package_id)));
        }

        let existing = tx
            .query_opt(
                concat!(
                    "SELECT ", review_columns!(),
                    " FROM reviews WHERE package_id = $1 AND user_id = $2"
                ),
                &[&submission.package_id, &submission.user_id],
            )
            .await?;
        let previous = existing.as_ref().map(row_to_review).transpose()?;

        let rating = submission.rating.value() as i16;
        let (row, change) = match previous {
            Some(previous) => {
                let row = tx
                    .query_one(
                        concat!(
                            "UPDATE reviews SET rating = $2, title = $3, comment = $4, updated_at = $5
                             WHERE id = $1 RETURNING ", review_columns!()
                        ),
                        &[&previous.id, &rating, &submission.title, &submission.comment, &now],
                    )
                    .await?;
                (row, RatingChange::Changed { from: previous.rating, to: submission.rating })
            }
            None => {
                let row = tx
                    .query_one(
                        concat!(
                            "INSERT INTO reviews (id, package_id, user_id, username, rating, title, comment, created_at, updated_at)
                             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
                             RETURNING ", review_columns!()
                        ),
                        &[
                            &Uuid::new_v4(),
                            &submission.package_id,
                            &submission.user_id,
                            &submission.username,
                            &rating,
                            &submission.title,
                            &submission.comment,
                            &now,
                        ],
                    )
                    .await?;
                (row, RatingChange::Added(submission.rating))
            }
        };
        let review = row_to_review(&row)?;

        adjust_rating(&tx, &submission.package_id, change).await?;
        tx.commit().await?;

        Ok(ReviewOutcome {
            updated: matches!(change, RatingChange::Changed { .. }),
            review,
        })
    }

    async fn delete_review(&self, id: &str, user_id: &str) -> StoreResult<Option<Review>> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        if !lock_package(&tx, id).await? {
            return Ok(None);
        }
        let row = tx
            .query_opt(
                concat!(
                    "DELETE FROM reviews WHERE package_id = $1 AND user_id = $2 RETURNING ",
                    review_columns!()
                ),
                &[&id, &user_id],
            )
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let review = row_to_review(&row)?;

        adjust_rating(&tx, id, RatingChange::Removed(review.rating)).await?;
        tx.commit().await?;
        Ok(Some(review))
    }

    async fn vote_review(&self, id: &str, review_id: Uuid, helpful: bool) -> StoreResult<Option<Review>> {
        let client = self.pool.get().await?;
        let sql = if helpful {
            concat!(
                "UPDATE reviews SET helpful = helpful + 1 WHERE package_id = $1 AND id = $2 RETURNING ",
                review_columns!()
            )
        } else {
            concat!(
                "UPDATE reviews SET not_helpful = not_helpful + 1 WHERE package_id = $1 AND id = $2 RETURNING ",
                review_columns!()
            )
        };
        let row = client.query_opt(sql, &[&id, &review_id]).await?;
        row.as_ref().map(row_to_review).transpose()
    }

    async fn dependents(&self, id: &str, limit: i64) -> StoreResult<Vec<Package>> {
        let client = self.pool.get().await?;
        let needle = Json(json!([{ "packageId": id }]));
        let rows = client
            .query(
                concat!(
                    "SELECT ", package_columns!(),
                    " FROM packages WHERE dependencies @> $1 ORDER BY id LIMIT $2"
                ),
                &[&needle, &limit],
            )
            .await?;
        Ok(rows.iter().map(row_to_package).collect())
    }

    async fn category_counts(&self) -> StoreResult<Vec<FacetCount>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT category, COUNT(*)::BIGINT
                 FROM packages
                 WHERE deprecated = FALSE
                 GROUP BY category
                 ORDER BY 2 DESC, 1 ASC",
                &[],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| FacetCount { name: row.get(0), count: row.get(1) })
            .collect())
    }

    async fn tag_counts(&self, limit: i64) -> StoreResult<Vec<FacetCount>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT tag, COUNT(*)::BIGINT
                 FROM packages, unnest(tags) AS tag
                 GROUP BY tag
                 ORDER BY 2 DESC, 1 ASC
                 LIMIT $1",
                &[&limit],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| FacetCount { name: row.get(0), count: row.get(1) })
            .collect())
    }

    async fn stats(&self, today: NaiveDate) -> StoreResult<RegistryStats> {
        let client = self.pool.get().await?;

        let totals = client
            .query_one(
                "SELECT
                    (SELECT COUNT(*) FROM packages)::BIGINT,
                    (SELECT COUNT(DISTINCT user_id) FROM api_tokens)::BIGINT,
                    (SELECT COALESCE(SUM(downloads), 0) FROM packages)::BIGINT,
                    (SELECT COUNT(*) FROM packages WHERE deprecated = TRUE)::BIGINT",
                &[],
            )
            .await?;

        let top = client
            .query(
                concat!("SELECT ", package_columns!(), " FROM packages ORDER BY downloads DESC, id ASC LIMIT 10"),
                &[],
            )
            .await?;
        let recent = client
            .query(
                concat!("SELECT ", package_columns!(), " FROM packages ORDER BY created_at DESC, id ASC LIMIT 5"),
                &[],
            )
            .await?;

        let group_rows = |rows: Vec<Row>| -> Vec<GroupDownloads> {
            rows.iter()
                .map(|row| GroupDownloads {
                    name: row.get(0),
                    count: row.get(1),
                    downloads: row.get(2),
                })
                .collect()
        };
        let by_runtime = client
            .query(
                "SELECT runtime->>'type', COUNT(*)::BIGINT, COALESCE(SUM(downloads), 0)::BIGINT
                 FROM packages GROUP BY 1 ORDER BY 3 DESC",
                &[],
            )
            .await?;
        let by_category = client
            .query(
                "SELECT category, COUNT(*)::BIGINT, COALESCE(SUM(downloads), 0)::BIGINT
                 FROM packages GROUP BY 1 ORDER BY 3 DESC",
                &[],
            )
            .await?;

        let since = today - Duration::days(MONTHLY_WINDOW_DAYS);
        let daily = client
            .query(
                "SELECT (entry->>'date')::DATE AS day, SUM((entry->>'count')::BIGINT)::BIGINT
                 FROM packages, jsonb_array_elements(download_history) AS entry
                 WHERE (entry->>'date')::DATE >= $1
                 GROUP BY day
                 ORDER BY day",
                &[&since],
            )
            .await?;

        Ok(RegistryStats {
            total_packages: totals.get(0),
            total_users: totals.get(1),
            total_downloads: totals.get(2),
            deprecated_count: totals.get(3),
            top_packages: top.iter().map(|row| row_to_package(row).into()).collect(),
            recent_packages: recent.iter().map(|row| row_to_package(row).into()).collect(),
            downloads_by_runtime: group_rows(by_runtime),
            downloads_by_category: group_rows(by_category),
            daily_downloads: daily
                .iter()
                .map(|row| DailyDownloads {
                    date: row.get(0),
                    count: to_u64(row.get(1)),
                })
                .collect(),
        })
    }

    async fn create_token(&self, record: TokenRecord) -> StoreResult<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO api_tokens (token_hash, user_id, username, role, created_at)
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &record.token_hash,
                    &record.user_id,
                    &record.username,
                    &record.role.as_str(),
                    &record.created_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn find_token(&self, token_hash: &str) -> StoreResult<Option<TokenRecord>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT token_hash, user_id, username, role, created_at FROM api_tokens WHERE token_hash = $1",
                &[&token_hash],
            )
            .await?;
        row.as_ref().map(row_to_token).transpose()
    }
}
