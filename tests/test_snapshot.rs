//! Snapshot serialization, the on-disk store and the report table model.

mod common;

use std::io::Write;

use common::{date, sample_fetcher};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;
use usage_analytics::models::{ScoreValue, SeriesLabel};
use usage_analytics::{Fetcher, Registry, ReportKind, ReportTable, SnapshotStore, Source, UsageError};

// ---------------------------------------------------------------------------
// Round trip
// ---------------------------------------------------------------------------

#[test]
fn json_round_trip_preserves_the_fetcher() {
    let original = sample_fetcher();
    let value = original.to_json().unwrap();
    let restored = Fetcher::from_json(&value, None).unwrap();

    assert_eq!(restored.organization, original.organization);
    assert_eq!(restored.range(), original.range());
    assert_eq!(restored.packages.len(), original.packages.len());
    for (a, b) in original.packages.iter().zip(&restored.packages) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.language, b.language);
        assert_eq!(a.source, b.source);
        assert_eq!(a.total_count(), b.total_count());
        assert_eq!(a.activity(), b.activity());
        assert_eq!(a.extra.views, b.extra.views);
    }
    assert_eq!(restored, original);
}

#[test]
fn document_layout_matches_historical_files() {
    let value = sample_fetcher().to_json().unwrap();
    let org = &value["Multiversx"];
    assert_eq!(org["metadata"]["start_date"], "2024-05-01");
    assert_eq!(org["metadata"]["end_date"], "2024-05-14");

    let record = &org["records"][0];
    assert_eq!(record["metadata"]["section_name"], "npmjs");
    assert_eq!(record["metadata"]["package_name"], "@multiversx/sdk-core");
    assert_eq!(record["metadata"]["no_of_downloads"], 140);
    assert_eq!(record["downloads"][0], json!({"date": "2024-05-01", "downloads": 10}));

    let repo = &org["records"][1];
    assert_eq!(repo["downloads"][0]["uniques"], 4);
    assert_eq!(repo["views"][0]["downloads"], 40);
}

#[test]
fn stored_totals_are_recomputed_on_load() {
    let doc = json!({"Near": {
        "metadata": {"organization": "Near", "start_date": "2024-05-01", "end_date": "2024-05-14"},
        "records": [{
            "metadata": {"section_name": "crates.io", "package_name": "near-sdk", "language": "Rust", "no_of_downloads": 999},
            "downloads": [{"date": "2024-05-02", "downloads": 4}, {"date": "2024-05-03", "downloads": 6}]
        }]
    }});
    let fetcher = Fetcher::from_json(&doc, Some("near")).unwrap();
    let package = fetcher.package("near-sdk").unwrap();
    assert_eq!(package.total_count(), 10);
    assert_eq!(package.source, Source::Registry(Registry::Cargo));
}

#[test]
fn missing_optional_fields_default() {
    let doc = json!({"Near": {
        "metadata": {"start_date": "2024-05-01", "end_date": "2024-05-14"},
        "records": [{"metadata": {"package_name": "near-api-js"}, "downloads": [{"downloads": 3}]}]
    }});
    let fetcher = Fetcher::from_json(&doc, None).unwrap();
    assert_eq!(fetcher.organization, "Near");
    let package = fetcher.package("near-api-js").unwrap();
    assert_eq!(package.activity()[0].date.to_string(), "1980-01-01");
    assert_eq!(package.total_count(), 3);
}

#[test]
fn organization_without_metadata_still_loads() {
    let doc = json!({"Near": {
        "records": [{"metadata": {"package_name": "near-api-js"}, "downloads": [{"date": "2024-05-02", "downloads": 3}]}]
    }});
    let fetcher = Fetcher::from_json(&doc, None).unwrap();
    assert_eq!(fetcher.organization, "Near");
    assert_eq!(fetcher.start_date(), date("1980-01-01"));
    assert_eq!(fetcher.end_date(), date("1980-01-01"));
    let package = fetcher.package("near-api-js").unwrap();
    assert_eq!(package.activity()[0].date, date("2024-05-02"));
    assert_eq!(package.total_count(), 3);
}

#[test]
fn null_statistics_from_older_files_load() {
    let doc = json!({"Multiversx": {
        "metadata": {"organization": "Multiversx", "start_date": "2024-05-01", "end_date": "2024-05-14"},
        "records": [{
            "metadata": {
                "section_name": "github",
                "package_name": "multiversx/mx-chain-scripts",
                "language": "Unknown",
                "site_score": {"final": 0.5, "detail": {"has_readme": 1, "updated_at": null}},
                "main_page_statistics": {"language": null, "stargazers_count": 4, "has_wiki": 0}
            },
            "downloads": [{"date": "2024-05-03", "downloads": 2, "uniques": 1}]
        }]
    }});
    let fetcher = Fetcher::from_json(&doc, None).unwrap();
    let package = fetcher.package("multiversx/mx-chain-scripts").unwrap();
    let stats = package.extra.main_page_statistics.as_ref().unwrap();
    assert_eq!(stats.get("language"), Some(&ScoreValue::Null));
    assert_eq!(stats.get("stargazers_count"), Some(&ScoreValue::Int(4)));
    assert_eq!(package.score.to_string(), "has_readme = 1.00, updated_at = None");
    assert!(!package.score.negatives().contains("updated_at"));

    let reloaded = Fetcher::from_json(&fetcher.to_json().unwrap(), None).unwrap();
    assert_eq!(reloaded, fetcher);
}

#[test]
fn malformed_documents_are_format_errors() {
    let bad_date = json!({"Near": {"metadata": {"start_date": "2024-13-40", "end_date": "2024-05-14"}, "records": []}});
    assert!(matches!(Fetcher::from_json(&bad_date, None), Err(UsageError::Format(_))));

    let inverted = json!({"Near": {"metadata": {"start_date": "2024-05-14", "end_date": "2024-05-01"}, "records": []}});
    assert!(matches!(Fetcher::from_json(&inverted, None), Err(UsageError::Format(_))));

    assert!(matches!(Fetcher::from_json(&json!([1, 2]), None), Err(UsageError::Format(_))));
}

#[test]
fn organization_must_be_named_when_ambiguous() {
    let mut other = sample_fetcher();
    other.organization = "Solana".to_string();
    let doc = usage_analytics::fetcher::to_document_json(&[sample_fetcher(), other]).unwrap();

    assert!(matches!(Fetcher::from_json(&doc, None), Err(UsageError::InvalidArgument(_))));
    assert_eq!(Fetcher::from_json(&doc, Some("solana")).unwrap().organization, "Solana");
    assert!(matches!(Fetcher::from_json(&doc, Some("Near")), Err(UsageError::NotFound(_))));
}

// ---------------------------------------------------------------------------
// Fetcher behaviour
// ---------------------------------------------------------------------------

#[test]
fn add_package_drops_out_of_range_activity() {
    let mut fetcher = Fetcher::for_window("Multiversx", date("2024-05-14"), 14);
    let mut package = usage_analytics::Package::new("p", "Rust", Registry::Cargo);
    package
        .set_activity(vec![
            usage_analytics::ActivityRecord::new(date("2024-04-30"), 100),
            usage_analytics::ActivityRecord::new(date("2024-05-01"), 1),
        ])
        .unwrap();
    fetcher.add_package(package).unwrap();
    assert_eq!(fetcher.package("p").unwrap().total_count(), 1);
}

#[test]
fn summaries_sort_by_total() {
    let fetcher = sample_fetcher();
    let names: Vec<String> = fetcher.summaries().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["@multiversx/sdk-core", "multiversx/mx-sdk-rs", "Axios"]);
    assert_eq!(fetcher.total_count(), 140 + 20 + 3);
    assert_eq!(fetcher.sources().len(), 3);
}

#[test]
fn daily_series_covers_the_requested_days() {
    let fetcher = sample_fetcher();
    let series = fetcher.daily_series(date("2024-05-13"), date("2024-05-14")).unwrap();
    let repo = series.iter().find(|(name, _)| name == "multiversx/mx-sdk-rs").unwrap();
    assert_eq!(repo.1, vec![(date("2024-05-13"), 12), (date("2024-05-14"), 8)]);
    assert!(fetcher.daily_series(date("2024-05-14"), date("2024-05-13")).is_err());
}

#[test]
fn display_lists_every_package() {
    let text = sample_fetcher().to_string();
    assert!(text.starts_with("ORGANIZATION = Multiversx - 2024-05-01 to 2024-05-14 - 3 packages"));
    assert!(text.contains("PACKAGE = multiversx/mx-sdk-rs - language = Rust - site = github - downloads = 20"));
    assert!(text.contains("2024-05-14 - 8 downloads, 3 uniques"));
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

#[test]
fn store_writes_and_loads_by_report_and_date() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(tmp.path()).unwrap();
    let end = date("2024-05-14");

    let path = store.write(ReportKind::Green, end, &[sample_fetcher()]).unwrap();
    assert_eq!(path.file_name().unwrap(), "green2024-05-14.json");

    let loaded = store.load(ReportKind::Green, end, "multiversx").unwrap();
    assert_eq!(loaded, sample_fetcher());

    let all = store.load_file(&path).unwrap();
    assert_eq!(all.len(), 1);
}

#[test]
fn write_leaves_no_temporary_files() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(tmp.path()).unwrap();
    store.write(ReportKind::Blue, date("2024-05-14"), &[sample_fetcher()]).unwrap();
    store.write(ReportKind::Blue, date("2024-05-14"), &[sample_fetcher()]).unwrap();

    let names: Vec<String> = std::fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["blue2024-05-14.json".to_string()]);
}

#[test]
fn gzipped_snapshots_load_transparently() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(tmp.path()).unwrap();
    let end = date("2024-05-14");

    let text = serde_json::to_string(&sample_fetcher().to_json().unwrap()).unwrap();
    let file = std::fs::File::create(tmp.path().join("yellow2024-05-14.json.gz")).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap();

    let loaded = store.load(ReportKind::Yellow, end, "Multiversx").unwrap();
    assert_eq!(loaded.packages.len(), 3);
}

#[test]
fn missing_or_malformed_snapshots_yield_an_empty_fetcher() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(tmp.path()).unwrap();
    let end = date("2024-05-14");

    assert!(matches!(store.load(ReportKind::Blue, end, "Multiversx"), Err(UsageError::NotFound(_))));
    let empty = store.load_or_empty(ReportKind::Blue, end, "Multiversx");
    assert!(empty.packages.is_empty());
    assert_eq!(empty.organization, "Multiversx");

    std::fs::write(store.path_for(ReportKind::Blue, end), "{ not json").unwrap();
    assert!(matches!(store.load(ReportKind::Blue, end, "Multiversx"), Err(UsageError::Format(_))));
    assert!(store.load_or_empty(ReportKind::Blue, end, "Multiversx").packages.is_empty());

    let table = ReportTable::build(&store.load_or_empty(ReportKind::Blue, end, "Multiversx"), None);
    assert!(table.rows.is_empty());
    assert!(table.totals.is_empty());
}

#[test]
fn list_is_newest_first_per_report() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(tmp.path()).unwrap();
    for day in ["2024-05-07", "2024-05-14", "2024-04-30"] {
        store.write(ReportKind::Blue, date(day), &[sample_fetcher()]).unwrap();
    }
    store.write(ReportKind::Green, date("2024-06-01"), &[sample_fetcher()]).unwrap();
    std::fs::write(tmp.path().join("blue-notes.txt"), "x").unwrap();

    let dates: Vec<String> = store.list(ReportKind::Blue).unwrap().into_iter().map(|(d, _)| d.to_string()).collect();
    assert_eq!(dates, vec!["2024-05-14", "2024-05-07", "2024-04-30"]);
    assert_eq!(store.latest(ReportKind::Green).unwrap(), Some(date("2024-06-01")));
    assert_eq!(store.latest(ReportKind::Yellow).unwrap(), None);
}

// ---------------------------------------------------------------------------
// Report kinds and tables
// ---------------------------------------------------------------------------

#[test]
fn report_kinds_parse_and_name_files() {
    assert_eq!("Yellow".parse::<ReportKind>().unwrap(), ReportKind::Yellow);
    assert!("purple".parse::<ReportKind>().is_err());
    assert_eq!(ReportKind::Blue.window_days(), 30);
    assert_eq!(ReportKind::Green.window_days(), 14);
    assert_eq!(ReportKind::Blue.parse_filename("blue2024-05-14.json.gz"), Some(date("2024-05-14")));
    assert_eq!(ReportKind::Blue.parse_filename("green2024-05-14.json"), None);
}

#[test]
fn table_filters_by_source_and_sums_totals() {
    let fetcher = sample_fetcher();
    let table = ReportTable::build(&fetcher, None);
    assert_eq!(table.rows.len(), 3);
    assert_eq!(table.window_days, 14);

    let downloads = table.totals.iter().find(|(l, _)| *l == SeriesLabel::Downloads).unwrap();
    assert_eq!(downloads.1.total, 163);
    let visits = table.totals.iter().find(|(l, _)| *l == SeriesLabel::Visits).unwrap();
    assert_eq!(visits.1.total, 40);

    let github = Source::Registry(Registry::Github);
    let only_repos = ReportTable::build(&fetcher, Some(&github));
    assert_eq!(only_repos.rows.len(), 1);
    assert_eq!(only_repos.rows[0].name, "multiversx/mx-sdk-rs");
}

#[test]
fn warnings_list_rows_with_negatives() {
    let mut fetcher = sample_fetcher();
    fetcher.packages[1].score =
        usage_analytics::Score::from_community_profile(&json!({"health_percentage": 50, "files": {"license": null}}));
    let table = ReportTable::build(&fetcher, None);
    let warned: Vec<&str> = table.warnings().map(|r| r.name.as_str()).collect();
    assert_eq!(warned, vec!["multiversx/mx-sdk-rs"]);
}
