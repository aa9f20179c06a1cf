//! Daily activity samples and the merge / roll-up primitives over them.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::DAYS_IN_WEEK;
use crate::date::{DateRange, FormattedDate};
use crate::error::{Result, UsageError};

// ---------------------------------------------------------------------------
// ActivityRecord
// ---------------------------------------------------------------------------

/// One day of observed activity for a package.
///
/// `primary_count` is downloads / clones / views / requests; `secondary_count`
/// is the distinct-actor count where the upstream provides one (GitHub
/// `uniques`), zero otherwise. Snapshot field names follow the historical
/// `downloads` / `uniques` layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    #[serde(default = "FormattedDate::sentinel")]
    pub date: FormattedDate,
    #[serde(rename = "downloads", default)]
    pub primary_count: u64,
    #[serde(rename = "uniques", default, skip_serializing_if = "is_zero")]
    pub secondary_count: u64,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

impl ActivityRecord {
    pub fn new(date: FormattedDate, primary_count: u64) -> Self {
        Self {
            date,
            primary_count,
            secondary_count: 0,
        }
    }

    pub fn with_secondary(date: FormattedDate, primary_count: u64, secondary_count: u64) -> Self {
        Self {
            date,
            primary_count,
            secondary_count,
        }
    }

    /// A copy carrying the distinct-actor count as its primary count, so the
    /// same roll-ups apply to uniques.
    pub fn secondary_as_primary(&self) -> Self {
        Self::new(self.date, self.secondary_count)
    }
}

// ---------------------------------------------------------------------------
// RecordShape -- one raw-to-record mapping per upstream
// ---------------------------------------------------------------------------

/// The raw JSON layouts activity arrives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordShape {
    /// npm downloads range: `{"day", "downloads"}`.
    NpmDay,
    /// crates.io version / extra downloads: `{"date", "downloads"}`.
    CratesDay,
    /// pypistats overall: `{"date", "downloads"}`.
    PypiDay,
    /// Search-engine date histogram bucket: `{"key_as_string", "doc_count"}`.
    SearchBucket,
    /// GitHub traffic: `{"timestamp", "count", "uniques"}`.
    GithubTraffic,
}

impl RecordShape {
    /// Map one raw upstream entry to an [`ActivityRecord`].
    ///
    /// Never fails: a missing or unparseable date becomes the sentinel date
    /// and missing counts become zero, so one bad entry cannot abort a fetch.
    pub fn parse(&self, raw: &Value) -> ActivityRecord {
        let (date_field, count_field, secondary_field) = match self {
            RecordShape::NpmDay => ("day", "downloads", None),
            RecordShape::CratesDay | RecordShape::PypiDay => ("date", "downloads", None),
            RecordShape::SearchBucket => ("key_as_string", "doc_count", None),
            RecordShape::GithubTraffic => ("timestamp", "count", Some("uniques")),
        };

        let date = match raw.get(date_field).and_then(Value::as_str) {
            Some(text) => FormattedDate::from_timestamp(text).unwrap_or_else(|e| {
                log::warn!("{:?} entry has unusable date: {}", self, e);
                FormattedDate::sentinel()
            }),
            None => FormattedDate::sentinel(),
        };
        let count = raw.get(count_field).and_then(Value::as_u64).unwrap_or(0);
        let secondary = secondary_field
            .and_then(|field| raw.get(field))
            .and_then(Value::as_u64)
            .unwrap_or(0);

        ActivityRecord::with_secondary(date, count, secondary)
    }

    /// Map every entry of a raw JSON array, dropping records outside `range`.
    pub fn parse_all(&self, raw: Option<&Value>, range: &DateRange) -> Vec<ActivityRecord> {
        raw.and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| self.parse(item))
                    .filter(|record| range.contains(record.date))
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Merge-by-date
// ---------------------------------------------------------------------------

/// Merge `incoming` records into `target`, summing counts that share a date.
///
/// Both primary and secondary counts are added. The result is sorted by
/// date ascending. Re-merging already merged data double-counts, so callers
/// merge each raw source exactly once per range.
///
/// Fails with [`UsageError::MergeInvariant`] if `target` itself already holds
/// two records for the same date, since the sum would be ambiguous.
pub fn merge_by_date<I>(target: &mut Vec<ActivityRecord>, incoming: I) -> Result<()>
where
    I: IntoIterator<Item = ActivityRecord>,
{
    let mut index: HashMap<FormattedDate, usize> = HashMap::with_capacity(target.len());
    for (position, record) in target.iter().enumerate() {
        if index.insert(record.date, position).is_some() {
            return Err(UsageError::MergeInvariant {
                date: record.date.to_string(),
            });
        }
    }

    for record in incoming {
        match index.get(&record.date) {
            Some(&position) => {
                let existing = &mut target[position];
                existing.primary_count += record.primary_count;
                existing.secondary_count += record.secondary_count;
            }
            None => {
                index.insert(record.date, target.len());
                target.push(record);
            }
        }
    }

    target.sort_by_key(|record| record.date);
    Ok(())
}

/// Sum of primary counts.
pub fn total(records: &[ActivityRecord]) -> u64 {
    records.iter().map(|r| r.primary_count).sum()
}

// ---------------------------------------------------------------------------
// Roll-ups
// ---------------------------------------------------------------------------

/// Roll-up statistics for one activity series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub total: u64,
    pub last_7_days_total: u64,
    /// `total / window_length_days`, untruncated.
    pub avg_per_day: f64,
    /// Number of days that actually carry a record.
    pub observed_days: usize,
}

impl ActivityStats {
    /// Compute the roll-ups of `records` for a window ending on `end_date`.
    ///
    /// The trailing total always covers the 7 calendar days ending on
    /// `end_date`; `window_length_days` only feeds the average denominator.
    pub fn compute(records: &[ActivityRecord], end_date: FormattedDate, window_length_days: u32) -> Self {
        let total = total(records);
        let week_start = end_date - (i64::from(DAYS_IN_WEEK) - 1);
        let last_7_days_total = records
            .iter()
            .filter(|r| r.date >= week_start && r.date <= end_date)
            .map(|r| r.primary_count)
            .sum();
        let avg_per_day = if window_length_days == 0 {
            0.0
        } else {
            total as f64 / f64::from(window_length_days)
        };

        Self {
            total,
            last_7_days_total,
            avg_per_day,
            observed_days: records.len(),
        }
    }

    /// Daily average truncated toward zero, as shown in report tables.
    pub fn avg_display(&self) -> u64 {
        self.avg_per_day.trunc() as u64
    }

    /// Average over the days that have data rather than the whole window.
    pub fn avg_per_observed_day(&self) -> f64 {
        if self.observed_days == 0 {
            0.0
        } else {
            self.total as f64 / self.observed_days as f64
        }
    }
}

/// Totals per ISO week, keyed by `(iso_year, iso_week)`.
pub fn weekly_totals(records: &[ActivityRecord]) -> BTreeMap<(i32, u32), u64> {
    let mut totals = BTreeMap::new();
    for record in records {
        *totals
            .entry((record.date.iso_year(), record.date.iso_week()))
            .or_insert(0) += record.primary_count;
    }
    totals
}

/// Totals per calendar month, keyed by `YYYY-MM`.
pub fn monthly_totals(records: &[ActivityRecord]) -> BTreeMap<String, u64> {
    let mut totals = BTreeMap::new();
    for record in records {
        let key = record.date.to_string()[..7].to_string();
        *totals.entry(key).or_insert(0) += record.primary_count;
    }
    totals
}

/// Counts for every day of `range`, zero-filled where no record exists.
pub fn daily_series(records: &[ActivityRecord], range: &DateRange) -> Vec<(FormattedDate, u64)> {
    let by_date: HashMap<FormattedDate, u64> =
        records.iter().map(|r| (r.date, r.primary_count)).collect();
    range
        .days()
        .map(|day| (day, by_date.get(&day).copied().unwrap_or(0)))
        .collect()
}
