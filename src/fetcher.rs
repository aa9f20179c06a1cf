//! One organization's snapshot: a date range plus its packages.
//!
//! A [`Fetcher`] is built by a gather run (see [`crate::sources`]) or
//! re-hydrated from a snapshot file for reporting. Both directions go
//! through the serde shapes in this module, which mirror the JSON layout
//! written to disk:
//!
//! ```text
//! { "<organization>": { "metadata": {...}, "records": [ {"metadata": {...}, "downloads": [...]} ] } }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::date::{DateRange, FormattedDate};
use crate::error::{Result, UsageError};
use crate::models::{
    daily_series, weekly_totals, ActivityRecord, Package, PackageExtra, PackageSummary, Score,
    ScoreDetail, Source,
};

// ---------------------------------------------------------------------------
// Snapshot shapes
// ---------------------------------------------------------------------------

/// `metadata` block of one organization in a snapshot.
///
/// A missing block reads as an unnamed organization over the sentinel date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    #[serde(default)]
    pub organization: String,
    #[serde(default = "FormattedDate::sentinel")]
    pub start_date: FormattedDate,
    #[serde(default = "FormattedDate::sentinel")]
    pub end_date: FormattedDate,
}

impl Default for SnapshotMetadata {
    fn default() -> Self {
        Self {
            organization: String::new(),
            start_date: FormattedDate::sentinel(),
            end_date: FormattedDate::sentinel(),
        }
    }
}

/// `metadata` block of one package record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PackageMetadata {
    #[serde(default)]
    pub section_name: Source,
    #[serde(default)]
    pub package_name: String,
    #[serde(default)]
    pub language: String,
    /// Written for readers of the file; recomputed from `downloads` on load.
    #[serde(default)]
    pub no_of_downloads: u64,
    #[serde(default)]
    pub site_score: Score,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub libraries_io_score: Option<ScoreDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_page_statistics: Option<ScoreDetail>,
}

/// One package as stored in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PackageRecord {
    #[serde(default)]
    pub metadata: PackageMetadata,
    #[serde(default)]
    pub downloads: Vec<ActivityRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub views: Vec<ActivityRecord>,
}

/// One organization as stored in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationSnapshot {
    #[serde(default)]
    pub metadata: SnapshotMetadata,
    #[serde(default)]
    pub records: Vec<PackageRecord>,
}

/// A whole snapshot file: organizations keyed by name.
pub type SnapshotDocument = BTreeMap<String, OrganizationSnapshot>;

impl From<&Package> for PackageRecord {
    fn from(package: &Package) -> Self {
        Self {
            metadata: PackageMetadata {
                section_name: package.source.clone(),
                package_name: package.name.clone(),
                language: package.language.clone(),
                no_of_downloads: package.total_count(),
                site_score: package.score.clone(),
                libraries_io_score: package.extra.libraries_io_score.clone(),
                main_page_statistics: package.extra.main_page_statistics.clone(),
            },
            downloads: package.activity().to_vec(),
            views: package.extra.views.clone(),
        }
    }
}

impl PackageRecord {
    /// Rebuild the package; the total is recomputed from the stored records.
    pub fn into_package(self) -> Result<Package> {
        let metadata = self.metadata;
        let mut package = Package::new(metadata.package_name, metadata.language, metadata.section_name)
            .with_score(metadata.site_score);
        package.set_activity(self.downloads)?;
        let mut views = Vec::with_capacity(self.views.len());
        crate::models::merge_by_date(&mut views, self.views)?;
        package.extra = PackageExtra {
            views,
            libraries_io_score: metadata.libraries_io_score,
            main_page_statistics: metadata.main_page_statistics,
        };
        Ok(package)
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// One organization's packages over one date range.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetcher {
    pub organization: String,
    range: DateRange,
    pub packages: Vec<Package>,
}

impl Fetcher {
    /// An empty fetcher; fails if `start_date > end_date`.
    pub fn new(organization: impl Into<String>, start_date: FormattedDate, end_date: FormattedDate) -> Result<Self> {
        Ok(Self {
            organization: organization.into(),
            range: DateRange::new(start_date, end_date)?,
            packages: Vec::new(),
        })
    }

    /// An empty fetcher over the `window_days`-long window ending on `end_date`.
    pub fn for_window(organization: impl Into<String>, end_date: FormattedDate, window_days: u32) -> Self {
        Self {
            organization: organization.into(),
            range: DateRange::ending_on(end_date, window_days),
            packages: Vec::new(),
        }
    }

    /// A valid fetcher with no packages, shown when a snapshot cannot be read.
    pub fn empty(organization: impl Into<String>) -> Self {
        let today = FormattedDate::now();
        Self::for_window(organization, today, 1)
    }

    pub fn start_date(&self) -> FormattedDate {
        self.range.start
    }

    pub fn end_date(&self) -> FormattedDate {
        self.range.end
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    /// Days covered by the range, used as the average denominator.
    pub fn window_length_days(&self) -> u32 {
        u32::try_from(self.range.len_days()).unwrap_or(u32::MAX)
    }

    /// Add a package, dropping any activity outside the fetcher's range.
    pub fn add_package(&mut self, mut package: Package) -> Result<()> {
        let in_range: Vec<ActivityRecord> = package
            .activity()
            .iter()
            .copied()
            .filter(|record| self.range.contains(record.date))
            .collect();
        let dropped = package.activity().len() - in_range.len();
        if dropped > 0 {
            log::warn!(
                "{}: dropped {} record(s) outside {} - {}",
                package.name,
                dropped,
                self.range.start,
                self.range.end
            );
            package.set_activity(in_range)?;
        }
        let range = self.range;
        package.extra.views.retain(|record| range.contains(record.date));
        self.packages.push(package);
        Ok(())
    }

    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Packages produced by `source`, in stored order.
    pub fn packages_from<'a>(&'a self, source: &'a Source) -> impl Iterator<Item = &'a Package> + 'a {
        self.packages.iter().filter(move |p| &p.source == source)
    }

    /// Distinct sources present, in first-seen order.
    pub fn sources(&self) -> Vec<Source> {
        let mut seen = HashSet::new();
        self.packages
            .iter()
            .filter(|p| seen.insert(p.source.clone()))
            .map(|p| p.source.clone())
            .collect()
    }

    /// Sum of every package's total.
    pub fn total_count(&self) -> u64 {
        self.packages.iter().map(Package::total_count).sum()
    }

    // -- Reporting views -------------------------------------------------------

    /// Per-package summaries over this fetcher's window, largest total first.
    pub fn summaries(&self) -> Vec<PackageSummary> {
        let window = self.window_length_days();
        let mut rows: Vec<(u64, PackageSummary)> = self
            .packages
            .iter()
            .map(|p| (p.total_count(), p.summary(self.range.end, window)))
            .collect();
        rows.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));
        rows.into_iter().map(|(_, summary)| summary).collect()
    }

    /// Zero-filled daily counts of every package over `[start, end]`.
    pub fn daily_series(&self, start: FormattedDate, end: FormattedDate) -> Result<Vec<(String, Vec<(FormattedDate, u64)>)>> {
        let range = DateRange::new(start, end)?;
        Ok(self
            .packages
            .iter()
            .map(|p| (p.name.clone(), daily_series(p.activity(), &range)))
            .collect())
    }

    /// Per-package totals per ISO week.
    pub fn weekly_totals(&self) -> Vec<(String, BTreeMap<(i32, u32), u64>)> {
        self.packages
            .iter()
            .map(|p| (p.name.clone(), weekly_totals(p.activity())))
            .collect()
    }

    // -- Serialization ---------------------------------------------------------

    pub fn to_snapshot(&self) -> OrganizationSnapshot {
        OrganizationSnapshot {
            metadata: SnapshotMetadata {
                organization: self.organization.clone(),
                start_date: self.range.start,
                end_date: self.range.end,
            },
            records: self.packages.iter().map(PackageRecord::from).collect(),
        }
    }

    /// Rebuild from a stored organization, falling back to `key` when the
    /// metadata carries no organization name.
    pub fn from_snapshot(key: &str, snapshot: OrganizationSnapshot) -> Result<Self> {
        let metadata = snapshot.metadata;
        let organization = if metadata.organization.is_empty() {
            key.to_string()
        } else {
            metadata.organization
        };
        let range = DateRange::new(metadata.start_date, metadata.end_date).map_err(|e| {
            UsageError::Format(format!("snapshot for {organization} has an invalid range: {e}"))
        })?;
        let packages = snapshot
            .records
            .into_iter()
            .map(PackageRecord::into_package)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            organization,
            range,
            packages,
        })
    }

    /// `{ "<organization>": {...} }` for this fetcher alone.
    pub fn to_json(&self) -> Result<Value> {
        to_document_json(std::slice::from_ref(self))
    }

    /// Read this organization back from a snapshot document.
    ///
    /// With `organization = None` the document must hold exactly one
    /// organization. Missing optional fields default; malformed dates or
    /// structure fail with [`UsageError::Format`].
    pub fn from_json(value: &Value, organization: Option<&str>) -> Result<Self> {
        let mut document = parse_document(value)?;
        let key = match organization {
            Some(name) => document
                .keys()
                .find(|k| k.eq_ignore_ascii_case(name))
                .cloned()
                .ok_or_else(|| UsageError::NotFound(format!("organization '{name}' in snapshot")))?,
            None if document.len() == 1 => document.keys().next().cloned().unwrap_or_default(),
            None => {
                return Err(UsageError::InvalidArgument(format!(
                    "snapshot holds {} organizations; name one",
                    document.len()
                )))
            }
        };
        let snapshot = document
            .remove(&key)
            .ok_or_else(|| UsageError::NotFound(format!("organization '{key}' in snapshot")))?;
        Self::from_snapshot(&key, snapshot)
    }
}

/// Serialize several organizations into one snapshot document.
pub fn to_document_json(fetchers: &[Fetcher]) -> Result<Value> {
    let document: SnapshotDocument = fetchers
        .iter()
        .map(|f| (f.organization.clone(), f.to_snapshot()))
        .collect();
    Ok(serde_json::to_value(document)?)
}

/// Every organization of a snapshot document.
pub fn from_document_json(value: &Value) -> Result<Vec<Fetcher>> {
    parse_document(value)?
        .into_iter()
        .map(|(key, snapshot)| Fetcher::from_snapshot(&key, snapshot))
        .collect()
}

fn parse_document(value: &Value) -> Result<SnapshotDocument> {
    SnapshotDocument::deserialize(value)
        .map_err(|e| UsageError::Format(format!("malformed snapshot: {e}")))
}

impl fmt::Display for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ORGANIZATION = {} - {} to {} - {} packages",
            self.organization,
            self.range.start,
            self.range.end,
            self.packages.len()
        )?;
        for package in &self.packages {
            write!(f, "{package}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Gather outcome
// ---------------------------------------------------------------------------

/// Why a package ended up without some of its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// The endpoint refused access (private traffic statistics).
    Forbidden,
    /// The endpoint has no entry for the package (score lookups).
    NotFound,
    /// The endpoint answered but reported no data.
    NoData,
}

/// A benign gap recorded during a run and reported at its end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnavailableData {
    pub source: Source,
    pub package: String,
    /// What was missing, e.g. `traffic` or `community profile`.
    pub what: &'static str,
    pub reason: UnavailableReason,
}

impl fmt::Display for UnavailableData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} unavailable ({:?})",
            self.source, self.package, self.what, self.reason
        )
    }
}

/// Result of one gather run.
#[derive(Debug, Clone, PartialEq)]
pub struct GatherOutcome {
    pub fetcher: Fetcher,
    pub unavailable: Vec<UnavailableData>,
}

impl GatherOutcome {
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            unavailable: Vec::new(),
        }
    }

    pub fn note(&mut self, source: impl Into<Source>, package: &str, what: &'static str, reason: UnavailableReason) {
        self.unavailable.push(UnavailableData {
            source: source.into(),
            package: package.to_string(),
            what,
            reason,
        });
    }

    /// Log the end-of-run summary of missing data.
    pub fn log_summary(&self) {
        if self.unavailable.is_empty() {
            return;
        }
        log::warn!(
            "{}: {} item(s) without data",
            self.fetcher.organization,
            self.unavailable.len()
        );
        for item in &self.unavailable {
            log::warn!("  {item}");
        }
    }
}
