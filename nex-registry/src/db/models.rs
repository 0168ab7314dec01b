use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::analytics::{DailyDownloads, DownloadStats, Rating, RatingSummary};

pub const DEFAULT_CATEGORY: &str = "other";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Author {
    Name(String),
    Profile {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        github: Option<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Runtime {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub package_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Package descriptor (`nex.json`) as submitted by a publisher.
///
/// Unknown keys are kept in `extra` so the stored document round-trips.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<Runtime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub commands: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<Dependency>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deprecation {
    pub deprecated: bool,
    pub deprecation_message: Option<String>,
    pub deprecated_at: Option<DateTime<Utc>>,
    pub replacement_package: Option<String>,
}

impl Deprecation {
    pub fn deprecate(message: Option<String>, replacement: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            deprecated: true,
            deprecation_message: Some(
                message.unwrap_or_else(|| "This package has been deprecated".to_string()),
            ),
            deprecated_at: Some(now),
            replacement_package: replacement,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub author: Option<Author>,
    pub license: Option<String>,
    pub repository: Option<String>,
    pub homepage: Option<String>,
    pub runtime: Option<Runtime>,
    pub entrypoint: Option<String>,
    pub commands: BTreeMap<String, String>,
    pub keywords: Vec<String>,
    pub category: String,
    pub tags: Vec<String>,
    pub dependencies: Vec<Dependency>,
    pub manifest: Value,
    pub owner: Option<String>,
    pub versions: Vec<String>,
    pub latest_version: String,
    #[serde(flatten)]
    pub deprecation: Deprecation,
    #[serde(flatten)]
    pub download_stats: DownloadStats,
    #[serde(flatten)]
    pub rating: RatingSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_published_at: Option<DateTime<Utc>>,
}

impl Package {
    /// A fresh record for the first published version of a package.
    pub fn from_manifest(manifest: &Manifest, document: Value, owner: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: manifest.id.clone(),
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            description: manifest.description.clone(),
            author: manifest.author.clone(),
            license: manifest.license.clone(),
            repository: manifest.repository.clone(),
            homepage: manifest.homepage.clone(),
            runtime: manifest.runtime.clone(),
            entrypoint: manifest.entrypoint.clone(),
            commands: manifest.commands.clone(),
            keywords: manifest.keywords.clone(),
            category: manifest
                .category
                .clone()
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            tags: manifest.tags.clone().unwrap_or_default(),
            dependencies: manifest.dependencies.clone().unwrap_or_default(),
            manifest: document,
            owner: Some(owner.to_string()),
            versions: vec![manifest.version.clone()],
            latest_version: manifest.version.clone(),
            deprecation: Deprecation::default(),
            download_stats: DownloadStats::default(),
            rating: RatingSummary::default(),
            created_at: now,
            updated_at: now,
            last_published_at: Some(now),
        }
    }

    /// Move an existing record to a newly published version.
    /// Category, tags and dependencies keep their previous values when the manifest omits them.
    pub fn apply_manifest(&mut self, manifest: &Manifest, document: Value, now: DateTime<Utc>) {
        self.name = manifest.name.clone();
        self.version = manifest.version.clone();
        self.description = manifest.description.clone();
        self.author = manifest.author.clone();
        self.license = manifest.license.clone();
        self.repository = manifest.repository.clone();
        self.homepage = manifest.homepage.clone();
        self.runtime = manifest.runtime.clone();
        self.entrypoint = manifest.entrypoint.clone();
        self.commands = manifest.commands.clone();
        self.keywords = manifest.keywords.clone();
        if let Some(category) = &manifest.category {
            self.category = category.clone();
        }
        if let Some(tags) = &manifest.tags {
            self.tags = tags.clone();
        }
        if let Some(dependencies) = &manifest.dependencies {
            self.dependencies = dependencies.clone();
        }
        self.manifest = document;
        self.versions.push(manifest.version.clone());
        self.latest_version = manifest.version.clone();
        self.updated_at = now;
        self.last_published_at = Some(now);
    }

    pub fn has_version(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v == version)
    }

    pub fn depends_on(&self, package_id: &str) -> bool {
        self.dependencies.iter().any(|d| d.package_id == package_id)
    }
}

/// Listing view of a package: no manifest document, no per-day history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSummary {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub author: Option<Author>,
    pub license: Option<String>,
    pub repository: Option<String>,
    pub homepage: Option<String>,
    pub runtime: Option<Runtime>,
    pub keywords: Vec<String>,
    pub category: String,
    pub tags: Vec<String>,
    pub versions: Vec<String>,
    pub latest_version: String,
    #[serde(flatten)]
    pub deprecation: Deprecation,
    pub downloads: u64,
    pub weekly_downloads: u64,
    pub monthly_downloads: u64,
    pub last_downloaded_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub rating: RatingSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Package> for PackageSummary {
    fn from(pkg: Package) -> Self {
        Self {
            id: pkg.id,
            name: pkg.name,
            version: pkg.version,
            description: pkg.description,
            author: pkg.author,
            license: pkg.license,
            repository: pkg.repository,
            homepage: pkg.homepage,
            runtime: pkg.runtime,
            keywords: pkg.keywords,
            category: pkg.category,
            tags: pkg.tags,
            versions: pkg.versions,
            latest_version: pkg.latest_version,
            deprecation: pkg.deprecation,
            downloads: pkg.download_stats.downloads,
            weekly_downloads: pkg.download_stats.weekly_downloads,
            monthly_downloads: pkg.download_stats.monthly_downloads,
            last_downloaded_at: pkg.download_stats.last_downloaded_at,
            rating: pkg.rating,
            created_at: pkg.created_at,
            updated_at: pkg.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageVersion {
    pub package_id: String,
    pub version: String,
    pub changelog: String,
    pub manifest: Value,
    pub downloads: u64,
    pub published_at: DateTime<Utc>,
    pub published_by: Option<String>,
    pub deprecated: bool,
    pub deprecation_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub version: String,
    pub changelog: String,
    pub published_at: DateTime<Utc>,
    pub downloads: u64,
    pub deprecated: bool,
}

impl From<PackageVersion> for VersionSummary {
    fn from(v: PackageVersion) -> Self {
        Self {
            version: v.version,
            changelog: v.changelog,
            published_at: v.published_at,
            downloads: v.downloads,
            deprecated: v.deprecated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub package_id: String,
    pub user_id: String,
    pub username: String,
    pub rating: Rating,
    pub title: Option<String>,
    pub comment: Option<String>,
    pub helpful: u64,
    pub not_helpful: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReviewSubmission {
    pub package_id: String,
    pub user_id: String,
    pub username: String,
    pub rating: Rating,
    pub title: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    pub review: Review,
    pub updated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Identity attached to an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub username: String,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub token_hash: String,
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn caller(&self) -> Caller {
        Caller {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            role: self.role,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PackageSort {
    #[default]
    Newest,
    Downloads,
    Rating,
    Updated,
    Name,
}

impl PackageSort {
    pub fn parse(s: &str) -> Self {
        match s {
            "downloads" => Self::Downloads,
            "rating" => Self::Rating,
            "updated" => Self::Updated,
            "name" => Self::Name,
            _ => Self::Newest,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PackageQuery {
    pub category: Option<String>,
    pub tag: Option<String>,
    pub deprecated: Option<bool>,
    pub search: Option<String>,
    pub sort: PackageSort,
    pub limit: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReviewSort {
    #[default]
    Recent,
    Helpful,
    RatingHigh,
    RatingLow,
}

impl ReviewSort {
    pub fn parse(s: &str) -> Self {
        match s {
            "helpful" => Self::Helpful,
            "rating-high" => Self::RatingHigh,
            "rating-low" => Self::RatingLow,
            _ => Self::Recent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDownloads {
    pub name: Option<String>,
    pub count: i64,
    pub downloads: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total_packages: i64,
    pub total_users: i64,
    pub total_downloads: i64,
    pub deprecated_count: i64,
    pub top_packages: Vec<PackageSummary>,
    pub recent_packages: Vec<PackageSummary>,
    pub downloads_by_runtime: Vec<GroupDownloads>,
    pub downloads_by_category: Vec<GroupDownloads>,
    pub daily_downloads: Vec<DailyDownloads>,
}
