use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Package descriptor written by `nex init` (nex.json)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NexManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: Author,
    pub license: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    pub runtime: Runtime,
    pub entrypoint: String,
    pub commands: BTreeMap<String, String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runtime {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Envelope returned by every registry endpoint
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSummary {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub weekly_downloads: u64,
    #[serde(default)]
    pub monthly_downloads: u64,
    #[serde(default)]
    pub rating_distribution: BTreeMap<String, u64>,
    #[serde(default)]
    pub total_ratings: u64,
    #[serde(default)]
    pub average_rating: f64,
    #[serde(default)]
    pub deprecated: bool,
    pub deprecation_message: Option<String>,
    pub replacement_package: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageInfo {
    #[serde(flatten)]
    pub package: PackageSummary,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub username: String,
    pub rating: u8,
    pub title: Option<String>,
    pub comment: Option<String>,
    #[serde(default)]
    pub helpful: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub version: String,
    #[serde(default)]
    pub changelog: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub deprecated: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishResult {
    pub id: String,
    pub version: String,
    pub created: bool,
}

/// Result type for error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
