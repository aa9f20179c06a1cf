//! Report kinds, the on-disk snapshot store, and the table model the
//! dashboards render.
//!
//! Snapshots are written atomically: the document goes to a temporary file
//! in the target directory which is then renamed over the final name, so a
//! failed run never leaves a partial file behind.

use std::fmt;
use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use flate2::read::GzDecoder;
use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::config::{DAYS_IN_MONTHLY_REPORT, DAYS_IN_TWO_WEEKS_REPORT};
use crate::date::FormattedDate;
use crate::error::{Result, UsageError};
use crate::fetcher::{from_document_json, to_document_json, Fetcher};
use crate::models::{ActivityStats, PackageSummary, SeriesLabel, Source};

// ---------------------------------------------------------------------------
// ReportKind
// ---------------------------------------------------------------------------

/// The three dashboards, each with its own snapshot file family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReportKind {
    /// Package managers.
    Blue,
    /// Repositories.
    Green,
    /// Access-log user agents.
    Yellow,
}

impl ReportKind {
    pub const ALL: [ReportKind; 3] = [ReportKind::Blue, ReportKind::Green, ReportKind::Yellow];

    pub fn color(&self) -> &'static str {
        match self {
            ReportKind::Blue => "blue",
            ReportKind::Green => "green",
            ReportKind::Yellow => "yellow",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ReportKind::Blue => "Package managers",
            ReportKind::Green => "Repositories",
            ReportKind::Yellow => "User agents",
        }
    }

    /// Length of the gathered window, ending on the report date.
    pub fn window_days(&self) -> u32 {
        match self {
            ReportKind::Blue => DAYS_IN_MONTHLY_REPORT,
            ReportKind::Green | ReportKind::Yellow => DAYS_IN_TWO_WEEKS_REPORT,
        }
    }

    /// `{color}{end_date}.json`.
    pub fn filename(&self, end_date: FormattedDate) -> String {
        format!("{}{}.json", self.color(), end_date)
    }

    /// The end date encoded in a snapshot file name of this kind, if any.
    /// Both `.json` and `.json.gz` names are recognized.
    pub fn parse_filename(&self, filename: &str) -> Option<FormattedDate> {
        let rest = filename.strip_prefix(self.color())?;
        let date = rest
            .strip_suffix(".json.gz")
            .or_else(|| rest.strip_suffix(".json"))?;
        FormattedDate::parse(date).ok()
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.color())
    }
}

impl FromStr for ReportKind {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self> {
        ReportKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.color().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UsageError::InvalidArgument(format!("unknown report '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// A directory of snapshot files.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    pub dir: PathBuf,
}

impl SnapshotStore {
    /// Open (and create if needed) the snapshot directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, kind: ReportKind, end_date: FormattedDate) -> PathBuf {
        self.dir.join(kind.filename(end_date))
    }

    /// Write every organization of one report into a single file.
    pub fn write(&self, kind: ReportKind, end_date: FormattedDate, fetchers: &[Fetcher]) -> Result<PathBuf> {
        let document = to_document_json(fetchers)?;
        let path = self.path_for(kind, end_date);
        write_atomically(&self.dir, &path, &document)?;
        log::info!("Wrote {} organization(s) to {}", fetchers.len(), path.display());
        Ok(path)
    }

    /// Every organization stored in the file at `path` (`.gz` handled transparently).
    pub fn load_file(&self, path: &Path) -> Result<Vec<Fetcher>> {
        let contents = read_snapshot_text(path)?;
        let value: Value = serde_json::from_str(&contents)
            .map_err(|e| UsageError::Format(format!("{}: {e}", path.display())))?;
        from_document_json(&value)
    }

    /// One organization from the `kind` snapshot ending on `end_date`.
    pub fn load(&self, kind: ReportKind, end_date: FormattedDate, organization: &str) -> Result<Fetcher> {
        let path = self.existing_path(kind, end_date)?;
        let contents = read_snapshot_text(&path)?;
        let value: Value = serde_json::from_str(&contents)
            .map_err(|e| UsageError::Format(format!("{}: {e}", path.display())))?;
        Fetcher::from_json(&value, Some(organization))
    }

    /// Like [`load`](Self::load) but never fails: a missing or unreadable
    /// snapshot yields an empty fetcher and a warning.
    pub fn load_or_empty(&self, kind: ReportKind, end_date: FormattedDate, organization: &str) -> Fetcher {
        match self.load(kind, end_date, organization) {
            Ok(fetcher) => fetcher,
            Err(e) => {
                log::warn!("No usable {kind} snapshot for {organization} on {end_date}: {e}");
                Fetcher::empty(organization)
            }
        }
    }

    /// Snapshot files of `kind`, newest end date first.
    pub fn list(&self, kind: ReportKind) -> Result<Vec<(FormattedDate, PathBuf)>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(date) = name.to_str().and_then(|n| kind.parse_filename(n)) {
                found.push((date, entry.path()));
            }
        }
        found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        found.dedup_by_key(|(date, _)| *date);
        Ok(found)
    }

    /// End date of the newest snapshot of `kind`, if any.
    pub fn latest(&self, kind: ReportKind) -> Result<Option<FormattedDate>> {
        Ok(self.list(kind)?.first().map(|(date, _)| *date))
    }

    fn existing_path(&self, kind: ReportKind, end_date: FormattedDate) -> Result<PathBuf> {
        let plain = self.path_for(kind, end_date);
        if plain.exists() {
            return Ok(plain);
        }
        let gz = plain.with_extension("json.gz");
        if gz.exists() {
            return Ok(gz);
        }
        Err(UsageError::NotFound(format!("snapshot {}", plain.display())))
    }
}

fn write_atomically(dir: &Path, path: &Path, document: &Value) -> Result<()> {
    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, document)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| UsageError::Io(e.error))?;
    Ok(())
}

fn read_snapshot_text(path: &Path) -> Result<String> {
    let file = fs::File::open(path)?;
    let mut contents = String::new();
    if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        let mut reader = BufReader::new(GzDecoder::new(BufReader::new(file)));
        reader.read_to_string(&mut contents)?;
    } else {
        BufReader::new(file).read_to_string(&mut contents)?;
    }
    Ok(contents)
}

// ---------------------------------------------------------------------------
// Table model
// ---------------------------------------------------------------------------

/// Rows of one dashboard table plus the totals row underneath.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportTable {
    pub end_date: FormattedDate,
    pub window_days: u32,
    /// Largest total first.
    pub rows: Vec<PackageSummary>,
    pub totals: Vec<(SeriesLabel, ActivityStats)>,
}

impl ReportTable {
    /// Table for every package of `fetcher`, or only those of `source`.
    pub fn build(fetcher: &Fetcher, source: Option<&Source>) -> Self {
        let rows: Vec<PackageSummary> = fetcher
            .summaries()
            .into_iter()
            .filter(|row| source.map(|s| &row.source == s).unwrap_or(true))
            .collect();
        let totals = totals_row(&rows);
        Self {
            end_date: fetcher.end_date(),
            window_days: fetcher.window_length_days(),
            rows,
            totals,
        }
    }

    /// Rows that carry warnings.
    pub fn warnings(&self) -> impl Iterator<Item = &PackageSummary> {
        self.rows.iter().filter(|row| !row.negatives.is_empty())
    }
}

/// Column sums of every series; the average is the sum of averages and is
/// shown truncated like any other row.
pub fn totals_row(rows: &[PackageSummary]) -> Vec<(SeriesLabel, ActivityStats)> {
    let mut totals: Vec<(SeriesLabel, ActivityStats)> = Vec::new();
    for row in rows {
        for (label, stats) in &row.series {
            match totals.iter_mut().find(|(l, _)| l == label) {
                Some((_, sum)) => {
                    sum.total += stats.total;
                    sum.last_7_days_total += stats.last_7_days_total;
                    sum.avg_per_day += stats.avg_per_day;
                    sum.observed_days = sum.observed_days.max(stats.observed_days);
                }
                None => totals.push((*label, *stats)),
            }
        }
    }
    totals
}
