use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Number of calendar days of per-day counts kept on a package.
pub const HISTORY_RETENTION_DAYS: usize = 90;
/// Trailing window for `weekly_downloads`.
pub const WEEKLY_WINDOW_DAYS: i64 = 7;
/// Trailing window for `monthly_downloads`.
pub const MONTHLY_WINDOW_DAYS: i64 = 30;

// Rolling windows are recomputed from retained history, so the history must cover them.
const _: () = assert!(MONTHLY_WINDOW_DAYS as usize <= HISTORY_RETENTION_DAYS);
const _: () = assert!(WEEKLY_WINDOW_DAYS <= MONTHLY_WINDOW_DAYS);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyDownloads {
    pub date: NaiveDate,
    pub count: u64,
}

/// Per-day download counts, ordered by day, at most one entry per day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<DailyDownloads>", into = "Vec<DailyDownloads>")]
pub struct DownloadHistory {
    days: BTreeMap<NaiveDate, u64>,
}

impl DownloadHistory {
    /// Add one download on `day`, evicting the oldest days beyond the retention cap.
    pub fn record(&mut self, day: NaiveDate) {
        *self.days.entry(day).or_insert(0) += 1;
        self.evict();
    }

    /// Sum of counts for every day on or after `since`.
    pub fn sum_since(&self, since: NaiveDate) -> u64 {
        self.days.range(since..).map(|(_, count)| count).sum()
    }

    pub fn total(&self) -> u64 {
        self.days.values().sum()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn count_on(&self, day: NaiveDate) -> u64 {
        self.days.get(&day).copied().unwrap_or(0)
    }

    pub fn oldest(&self) -> Option<NaiveDate> {
        self.days.keys().next().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = DailyDownloads> + '_ {
        self.days
            .iter()
            .map(|(date, count)| DailyDownloads { date: *date, count: *count })
    }

    fn evict(&mut self) {
        while self.days.len() > HISTORY_RETENTION_DAYS {
            self.days.pop_first();
        }
    }
}

impl From<Vec<DailyDownloads>> for DownloadHistory {
    fn from(entries: Vec<DailyDownloads>) -> Self {
        let mut days = BTreeMap::new();
        for entry in entries {
            *days.entry(entry.date).or_insert(0) += entry.count;
        }
        let mut history = Self { days };
        history.evict();
        history
    }
}

impl From<DownloadHistory> for Vec<DailyDownloads> {
    fn from(history: DownloadHistory) -> Self {
        history.iter().collect()
    }
}

/// Download counters carried on every package record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadStats {
    pub downloads: u64,
    pub weekly_downloads: u64,
    pub monthly_downloads: u64,
    pub download_history: DownloadHistory,
    pub last_downloaded_at: Option<DateTime<Utc>>,
}

impl DownloadStats {
    /// Count one download at `now`, with `today` being the server-local calendar day.
    ///
    /// The weekly and monthly figures are recomputed from the retained history
    /// rather than decayed, so they always agree with `download_history`.
    pub fn record_download(&mut self, now: DateTime<Utc>, today: NaiveDate) {
        self.downloads += 1;
        self.last_downloaded_at = Some(now);
        self.download_history.record(today);
        self.refresh_windows(today);
    }

    pub fn refresh_windows(&mut self, today: NaiveDate) {
        self.weekly_downloads = self
            .download_history
            .sum_since(today - Duration::days(WEEKLY_WINDOW_DAYS));
        self.monthly_downloads = self
            .download_history
            .sum_since(today - Duration::days(MONTHLY_WINDOW_DAYS));
    }
}

/// The calendar day of `now` in the server's local timezone.
pub fn local_day(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&Local).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn same_day_downloads_share_an_entry() {
        let mut stats = DownloadStats::default();
        let now = Utc::now();
        for _ in 0..3 {
            stats.record_download(now, day(2026, 3, 1));
        }
        assert_eq!(stats.downloads, 3);
        assert_eq!(stats.download_history.len(), 1);
        assert_eq!(stats.download_history.count_on(day(2026, 3, 1)), 3);
        assert_eq!(stats.last_downloaded_at, Some(now));
    }

    #[test]
    fn out_of_order_day_keeps_history_sorted() {
        let mut history = DownloadHistory::default();
        history.record(day(2026, 3, 5));
        history.record(day(2026, 3, 2));
        let dates: Vec<_> = history.iter().map(|e| e.date).collect();
        assert_eq!(dates, vec![day(2026, 3, 2), day(2026, 3, 5)]);
    }

    #[test]
    fn deserializing_merges_duplicate_days_and_caps_length() {
        let start = day(2026, 1, 1);
        let mut entries: Vec<DailyDownloads> = (0..100)
            .map(|i| DailyDownloads { date: start + Duration::days(i), count: 1 })
            .collect();
        entries.push(DailyDownloads { date: start + Duration::days(99), count: 4 });

        let history = DownloadHistory::from(entries);
        assert_eq!(history.len(), HISTORY_RETENTION_DAYS);
        assert_eq!(history.oldest(), Some(start + Duration::days(10)));
        assert_eq!(history.count_on(start + Duration::days(99)), 5);
    }

    #[test]
    fn serializes_as_ordered_array() {
        let mut history = DownloadHistory::default();
        history.record(day(2026, 2, 2));
        history.record(day(2026, 2, 1));
        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"date": "2026-02-01", "count": 1},
                {"date": "2026-02-02", "count": 1}
            ])
        );
    }

    #[test]
    fn window_boundaries_are_inclusive() {
        let today = day(2026, 6, 30);
        let mut stats = DownloadStats::default();
        stats.record_download(Utc::now(), today - Duration::days(31));
        stats.record_download(Utc::now(), today - Duration::days(30));
        stats.record_download(Utc::now(), today - Duration::days(8));
        stats.record_download(Utc::now(), today - Duration::days(7));
        stats.record_download(Utc::now(), today);

        assert_eq!(stats.weekly_downloads, 2);
        assert_eq!(stats.monthly_downloads, 4);
        assert_eq!(stats.downloads, 5);
    }
}
