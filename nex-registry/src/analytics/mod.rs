//! Download analytics and rating aggregation for package records.
//!
//! Everything here is pure: callers load a package under a per-package lock,
//! apply one of these updates, and write the record back.

pub mod downloads;
pub mod ratings;

pub use downloads::{local_day, DailyDownloads, DownloadHistory, DownloadStats};
pub use ratings::{Rating, RatingChange, RatingDistribution, RatingSummary};
