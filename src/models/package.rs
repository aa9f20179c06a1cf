use std::fmt;

use serde::{Deserialize, Serialize};

use crate::date::FormattedDate;
use crate::error::Result;
use crate::models::activity::{self, merge_by_date, ActivityRecord, ActivityStats};
use crate::models::registry::{Registry, Source};
use crate::models::score::{self, Score, ScoreDetail, HAS_MARKER, PRESENT_MARKER};

// ---------------------------------------------------------------------------
// PackageExtra
// ---------------------------------------------------------------------------

/// Source-specific data carried next to the common package fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PackageExtra {
    /// Page views alongside clones (repositories only).
    pub views: Vec<ActivityRecord>,
    /// libraries.io source-rank breakdown (registry packages only).
    pub libraries_io_score: Option<ScoreDetail>,
    /// Stars, forks and feature flags from the repository search result.
    pub main_page_statistics: Option<ScoreDetail>,
}

// ---------------------------------------------------------------------------
// Package
// ---------------------------------------------------------------------------

/// One tracked unit of usage: a published package, a repository, or a
/// user-agent group.
///
/// `activity` is kept sorted by date and `total_count` always equals the sum
/// of its primary counts; both are only changed through [`Package::merge_activity`]
/// and [`Package::set_activity`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Package {
    pub name: String,
    pub language: String,
    pub source: Source,
    activity: Vec<ActivityRecord>,
    total_count: u64,
    pub score: Score,
    pub extra: PackageExtra,
}

impl Package {
    pub fn new(name: impl Into<String>, language: impl Into<String>, source: impl Into<Source>) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn activity(&self) -> &[ActivityRecord] {
        &self.activity
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Replace the activity series with records built from one raw payload.
    ///
    /// Records sharing a date are summed, so the stored list has unique dates.
    pub fn set_activity(&mut self, records: Vec<ActivityRecord>) -> Result<()> {
        self.activity.clear();
        self.merge_activity(records)
    }

    /// Merge-by-date more records into this package and refresh the total.
    pub fn merge_activity<I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = ActivityRecord>,
    {
        merge_by_date(&mut self.activity, records)?;
        self.total_count = activity::total(&self.activity);
        Ok(())
    }

    pub fn with_score(mut self, score: Score) -> Self {
        self.score = score;
        self
    }

    // -- Roll-ups -----------------------------------------------------------

    /// Total, trailing-week total and daily average of the primary series.
    pub fn summarize(&self, end_date: FormattedDate, window_length_days: u32) -> ActivityStats {
        ActivityStats::compute(&self.activity, end_date, window_length_days)
    }

    /// Roll-ups of every series this package tracks, under distinct labels.
    ///
    /// Primary counts are always reported as `downloads`. Repositories add
    /// `downloaders` (clone uniques), `visits` (views) and `visitors`
    /// (view uniques).
    pub fn summarize_series(&self, end_date: FormattedDate, window_length_days: u32) -> Vec<(SeriesLabel, ActivityStats)> {
        let mut series = vec![(
            SeriesLabel::Downloads,
            self.summarize(end_date, window_length_days),
        )];

        if self.source == Source::Registry(Registry::Github) {
            let clone_uniques: Vec<ActivityRecord> = self
                .activity
                .iter()
                .map(ActivityRecord::secondary_as_primary)
                .collect();
            let view_uniques: Vec<ActivityRecord> = self
                .extra
                .views
                .iter()
                .map(ActivityRecord::secondary_as_primary)
                .collect();
            series.push((
                SeriesLabel::Downloaders,
                ActivityStats::compute(&clone_uniques, end_date, window_length_days),
            ));
            series.push((
                SeriesLabel::Visits,
                ActivityStats::compute(&self.extra.views, end_date, window_length_days),
            ));
            series.push((
                SeriesLabel::Visitors,
                ActivityStats::compute(&view_uniques, end_date, window_length_days),
            ));
        }

        series
    }

    /// Sum of the libraries.io sub-scores, if this package has them.
    pub fn libraries_io_total(&self) -> Option<f64> {
        self.extra
            .libraries_io_score
            .as_ref()
            .map(|detail| detail.values().filter_map(|v| v.as_f64()).sum())
    }

    /// Warnings for the report's info box; empty when nothing is wrong.
    pub fn negatives(&self) -> String {
        let mut parts = Vec::new();
        if let Some(stats) = &self.extra.main_page_statistics {
            parts.push(score::negatives(stats, HAS_MARKER));
        }
        parts.push(self.score.negatives());
        if let Some(libraries_io) = &self.extra.libraries_io_score {
            parts.push(score::negatives(libraries_io, PRESENT_MARKER));
        }
        parts.retain(|p| !p.is_empty());
        parts.join(", ")
    }

    /// Everything a report row needs for this package.
    pub fn summary(&self, end_date: FormattedDate, window_length_days: u32) -> PackageSummary {
        PackageSummary {
            name: self.name.clone(),
            language: self.language.clone(),
            source: self.source.clone(),
            series: self.summarize_series(end_date, window_length_days),
            site_score: self.score.final_display(),
            site_score_details: self.score.to_string(),
            libraries_io_score: self.libraries_io_total(),
            negatives: self.negatives(),
        }
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "PACKAGE = {} - language = {} - site = {} - downloads = {}",
            self.name, self.language, self.source, self.total_count
        )?;
        for record in &self.activity {
            write!(f, "{} - {} downloads", record.date, record.primary_count)?;
            if record.secondary_count > 0 {
                write!(f, ", {} uniques", record.secondary_count)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PackageSummary
// ---------------------------------------------------------------------------

/// Which activity series a roll-up was computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesLabel {
    Downloads,
    Downloaders,
    Visits,
    Visitors,
}

/// Derived per-package values consumed by the dashboard tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageSummary {
    pub name: String,
    pub language: String,
    pub source: Source,
    pub series: Vec<(SeriesLabel, ActivityStats)>,
    pub site_score: String,
    pub site_score_details: String,
    pub libraries_io_score: Option<f64>,
    pub negatives: String,
}

impl PackageSummary {
    pub fn stats(&self, label: SeriesLabel) -> Option<&ActivityStats> {
        self.series
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, stats)| stats)
    }
}
