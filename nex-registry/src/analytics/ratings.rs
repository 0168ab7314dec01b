use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// A star rating, always within `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub fn new(value: i64) -> Option<Self> {
        if (MIN_RATING as i64..=MAX_RATING as i64).contains(&value) {
            Some(Self(value as u8))
        } else {
            None
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    fn index(self) -> usize {
        (self.0 - MIN_RATING) as usize
    }
}

impl TryFrom<i64> for Rating {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| {
            format!("Rating must be between {} and {}", MIN_RATING, MAX_RATING)
        })
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a single user's review moved the package aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingChange {
    Added(Rating),
    Changed { from: Rating, to: Rating },
    Removed(Rating),
}

impl RatingChange {
    /// Build a change from the `(new, old)` pair a review lifecycle produces.
    /// `(None, None)` describes nothing and yields `None`.
    pub fn from_pair(new: Option<Rating>, old: Option<Rating>) -> Option<Self> {
        match (new, old) {
            (Some(to), None) => Some(Self::Added(to)),
            (Some(to), Some(from)) => Some(Self::Changed { from, to }),
            (None, Some(from)) => Some(Self::Removed(from)),
            (None, None) => None,
        }
    }
}

/// Count of reviews per star value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<u8, u64>", into = "BTreeMap<u8, u64>")]
pub struct RatingDistribution {
    counts: [u64; 5],
}

impl RatingDistribution {
    /// Build from stored counts ordered 1..=5; missing trailing slots count as zero
    /// and negative values are clamped.
    pub fn from_counts(counts: &[i64]) -> Self {
        let mut dist = Self::default();
        for (slot, count) in dist.counts.iter_mut().zip(counts) {
            *slot = (*count).max(0) as u64;
        }
        dist
    }

    pub fn counts(&self) -> [u64; 5] {
        self.counts
    }

    pub fn get(&self, rating: Rating) -> u64 {
        self.counts[rating.index()]
    }

    pub fn increment(&mut self, rating: Rating) {
        self.counts[rating.index()] += 1;
    }

    /// Decrement, flooring at zero.
    pub fn decrement(&mut self, rating: Rating) {
        let slot = &mut self.counts[rating.index()];
        *slot = slot.saturating_sub(1);
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn weighted_sum(&self) -> u64 {
        self.counts
            .iter()
            .enumerate()
            .map(|(i, count)| (i as u64 + 1) * count)
            .sum()
    }
}

impl From<BTreeMap<u8, u64>> for RatingDistribution {
    fn from(map: BTreeMap<u8, u64>) -> Self {
        let mut dist = Self::default();
        for (star, count) in map {
            if let Some(rating) = Rating::new(star as i64) {
                dist.counts[rating.index()] = count;
            }
        }
        dist
    }
}

impl From<RatingDistribution> for BTreeMap<u8, u64> {
    fn from(dist: RatingDistribution) -> Self {
        dist.counts
            .iter()
            .enumerate()
            .map(|(i, count)| (i as u8 + MIN_RATING, *count))
            .collect()
    }
}

/// Rating aggregate carried on every package record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub rating_distribution: RatingDistribution,
    pub total_ratings: u64,
    pub average_rating: f64,
}

impl RatingSummary {
    /// Rebuild an aggregate from scratch from a full set of review ratings.
    pub fn from_ratings<I: IntoIterator<Item = Rating>>(ratings: I) -> Self {
        let mut summary = Self::default();
        for rating in ratings {
            summary.rating_distribution.increment(rating);
        }
        summary.recompute();
        summary
    }

    pub fn from_distribution(rating_distribution: RatingDistribution) -> Self {
        let mut summary = Self { rating_distribution, ..Self::default() };
        summary.recompute();
        summary
    }

    /// Apply one review change. Removing from an empty bucket is a no-op and
    /// leaves `total_ratings` alone, since the total is always the distribution sum.
    pub fn apply(&mut self, change: RatingChange) {
        match change {
            RatingChange::Added(to) => self.rating_distribution.increment(to),
            RatingChange::Changed { from, to } => {
                self.rating_distribution.decrement(from);
                self.rating_distribution.increment(to);
            }
            RatingChange::Removed(from) => self.rating_distribution.decrement(from),
        }
        self.recompute();
    }

    // total_ratings is derived from the distribution so the two can never drift.
    fn recompute(&mut self) {
        self.total_ratings = self.rating_distribution.total();
        self.average_rating = if self.total_ratings > 0 {
            round_one_decimal(self.rating_distribution.weighted_sum() as f64 / self.total_ratings as f64)
        } else {
            0.0
        };
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
