//! The Gatherer facade: builder, report runs and snapshot writing.

mod common;

use common::{date, log_line, write_ndjson, ScriptedTransport};
use serde_json::json;
use usage_analytics::organization::{MULTIVERSX, NEAR};
use usage_analytics::{Gatherer, LocalLogSource, LogSource, ReportKind, RetryPolicy, UsageError};

fn gatherer(dir: &std::path::Path, transport: &ScriptedTransport) -> Gatherer {
    Gatherer::builder()
        .snapshot_dir(dir)
        .transport(Box::new(transport.clone()))
        .retry(RetryPolicy::immediate(1))
        .build()
        .unwrap()
}

#[test]
fn build_creates_the_snapshot_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("nested").join("snapshots");
    let g = gatherer(&dir, &ScriptedTransport::new());
    assert!(dir.is_dir());
    assert_eq!(g.store().dir, dir);
    assert!(g.to_string().contains("github_token=false"));
}

#[test]
fn green_report_writes_one_file_for_every_organization() {
    let tmp = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    transport
        .route_json("user:multiversx", json!({"items": [{"full_name": "multiversx/mx-sdk-rs", "fork": false}]}))
        .route_json("user:near", json!({"items": [{"full_name": "near/near-sdk-rs", "fork": false}]}))
        .route_json("/traffic/", json!({}))
        .route_json("/community/profile", json!({"health_percentage": 100}));
    let g = gatherer(tmp.path(), &transport);

    let end = date("2024-05-14");
    let (path, outcomes) = g.gather_report(ReportKind::Green, &[MULTIVERSX, NEAR], end, None).unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(path, g.store().path_for(ReportKind::Green, end));

    let near = g.store().load(ReportKind::Green, end, "Near").unwrap();
    assert_eq!(near.packages[0].name, "near/near-sdk-rs");
    assert_eq!(near.start_date(), date("2024-05-01"));
    assert_eq!(transport.count_matching("near-sdk-rs/traffic"), 0);
}

#[test]
fn failed_run_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    transport
        .route_json("user:multiversx", json!({"items": []}))
        .route("user:near", 502, "bad gateway");
    let g = gatherer(tmp.path(), &transport);

    let err = g
        .gather_report(ReportKind::Green, &[MULTIVERSX, NEAR], date("2024-05-14"), None)
        .unwrap_err();
    assert!(matches!(err, UsageError::RetriesExhausted { attempts: 2, .. }));
    assert!(g.store().list(ReportKind::Green).unwrap().is_empty());
}

#[test]
fn yellow_report_covers_only_our_own_organization() {
    let tmp = tempfile::tempdir().unwrap();
    let export = write_ndjson(
        tmp.path(),
        "access.ndjson",
        &[
            log_line("2024-05-14T08:00:00.000Z", Some("python-requests/2.31.0")),
            log_line("2024-05-14T08:30:00.000Z", Some("python-requests/2.31.0")),
            log_line("2024-05-14T09:00:00.000Z", Some("Mozilla/5.0 (Windows NT 10.0) Chrome/124.0")),
        ],
    );
    let g = gatherer(&tmp.path().join("out"), &ScriptedTransport::new());
    let logs = g.log_source(&[export]).unwrap();

    let end = date("2024-05-14");
    let (_, outcomes) = g
        .gather_report(ReportKind::Yellow, &[MULTIVERSX, NEAR], end, Some(logs.as_ref()))
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].fetcher.organization, "Multiversx");

    let stored = g.store().load(ReportKind::Yellow, end, "Multiversx").unwrap();
    let names: Vec<&str> = stored.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Python", "Browser"]);
}

#[test]
fn yellow_report_needs_a_log_source() {
    let tmp = tempfile::tempdir().unwrap();
    let g = gatherer(tmp.path(), &ScriptedTransport::new());
    let err = g.gather_report(ReportKind::Yellow, &[MULTIVERSX], date("2024-05-14"), None).unwrap_err();
    assert!(matches!(err, UsageError::InvalidArgument(_)));
}

#[test]
fn search_engine_source_needs_a_url() {
    let tmp = tempfile::tempdir().unwrap();
    let g = gatherer(tmp.path(), &ScriptedTransport::new());
    assert!(matches!(g.log_source(&[]), Err(UsageError::InvalidArgument(_))));
}

#[test]
fn local_source_is_used_directly() {
    let tmp = tempfile::tempdir().unwrap();
    let export = write_ndjson(tmp.path(), "a.ndjson", &[log_line("2024-05-14T08:00:00.000Z", Some("curl/8.4.0"))]);
    let logs = LocalLogSource::open("ingress-logs", &[export]).unwrap();
    let range = usage_analytics::DateRange::ending_on(date("2024-05-14"), 14);
    assert_eq!(logs.count("ingress-logs", &range).unwrap(), 1);
}

#[test]
fn cancelled_gatherer_refuses_to_run() {
    let tmp = tempfile::tempdir().unwrap();
    let g = gatherer(tmp.path(), &ScriptedTransport::new());
    g.cancellation().cancel();
    let err = g.gather_report(ReportKind::Blue, &[MULTIVERSX], date("2024-05-14"), None).unwrap_err();
    assert!(matches!(err, UsageError::Cancelled));
}
