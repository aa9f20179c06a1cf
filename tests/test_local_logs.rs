//! Local NDJSON access-log exports aggregated through DuckDB.

mod common;

use common::{date, log_line, write_ndjson};
use usage_analytics::connection::quote_identifier;
use usage_analytics::organization::MULTIVERSX;
use usage_analytics::sources::gather_user_agents;
use usage_analytics::{
    ActivityRecord, CancellationToken, Connection, DateRange, GroupingLevel, LocalLogSource, LogSource, SqlBuilder,
    UsageError,
};

/// Two exports covering mid-May plus one stale record and two unusable ones.
fn sample_logs(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let first = write_ndjson(
        dir,
        "logs-1.ndjson",
        &[
            log_line("2024-05-13T08:00:00.000Z", Some("axios/1.6.7")),
            log_line("2024-05-13T09:30:00.000Z", Some("axios/1.6.7")),
            log_line("2024-05-13T23:59:59.000Z", Some("axios/1.6.7")),
            log_line("2024-04-20T12:00:00.000Z", Some("axios/1.6.7")),
        ],
    );
    let second = write_ndjson(
        dir,
        "logs-2.ndjson",
        &[
            log_line("2024-05-14T00:00:01.000Z", Some("axios/1.6.7")),
            log_line("2024-05-14T10:00:00.000Z", Some("curl/8.4.0")),
            log_line("2024-05-14T11:00:00.000Z", Some("curl/8.4.0")),
            log_line("2024-05-14T12:00:00.000Z", Some("")),
            log_line("2024-05-14T13:00:00.000Z", None),
        ],
    );
    vec![first, second]
}

fn window() -> DateRange {
    DateRange::ending_on(date("2024-05-14"), 14)
}

// ---------------------------------------------------------------------------
// LocalLogSource
// ---------------------------------------------------------------------------

#[test]
fn count_skips_empty_agents_and_other_days() {
    let tmp = tempfile::tempdir().unwrap();
    let logs = LocalLogSource::open("ingress-logs", &sample_logs(tmp.path())).unwrap();
    assert_eq!(logs.count("ingress-logs", &window()).unwrap(), 6);
}

#[test]
fn aggregate_returns_per_day_buckets_largest_first() {
    let tmp = tempfile::tempdir().unwrap();
    let logs = LocalLogSource::open("ingress-logs", &sample_logs(tmp.path())).unwrap();

    let buckets = logs.aggregate("ingress-logs", &window(), "user_agent").unwrap();
    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0].key, "axios/1.6.7");
    assert_eq!(buckets[0].doc_count, 4);
    assert_eq!(
        buckets[0].days,
        vec![ActivityRecord::new(date("2024-05-13"), 3), ActivityRecord::new(date("2024-05-14"), 1)]
    );
    assert_eq!(buckets[1].key, "curl/8.4.0");
    assert_eq!(buckets[1].doc_count, 2);
}

#[test]
fn unknown_table_or_bad_key_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let logs = LocalLogSource::open("ingress-logs", &sample_logs(tmp.path())).unwrap();
    assert!(matches!(logs.count("other-logs", &window()), Err(UsageError::NotFound(_))));
    assert!(matches!(
        logs.aggregate("ingress-logs", &window(), "user_agent; DROP TABLE x"),
        Err(UsageError::InvalidArgument(_))
    ));
}

#[test]
fn no_files_is_an_error() {
    let none: Vec<std::path::PathBuf> = Vec::new();
    assert!(matches!(LocalLogSource::open("ingress-logs", &none), Err(UsageError::InvalidArgument(_))));
}

#[test]
fn user_agent_gather_over_local_exports() {
    let tmp = tempfile::tempdir().unwrap();
    let logs = LocalLogSource::open("ingress-logs", &sample_logs(tmp.path())).unwrap();

    let outcome = gather_user_agents(
        &MULTIVERSX,
        date("2024-05-14"),
        &logs,
        "ingress-logs",
        GroupingLevel::Key,
        &CancellationToken::new(),
    )
    .unwrap();
    let names: Vec<&str> = outcome.fetcher.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["axios/1", "curl/8"]);
    assert_eq!(outcome.fetcher.total_count(), 6);
    assert_eq!(outcome.fetcher.window_length_days(), 14);
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

#[test]
fn registered_tables_are_queryable_with_params() {
    let tmp = tempfile::tempdir().unwrap();
    let mut conn = Connection::open_in_memory().unwrap();
    conn.register_ndjson_logs("access", &sample_logs(tmp.path())).unwrap();
    assert!(conn.has_table("access"));
    assert!(!conn.has_table("missing"));

    let (sql, params) = SqlBuilder::new("\"access\"")
        .select(&["user_agent", "day"])
        .where_eq("user_agent", "curl/8.4.0")
        .order_by(&["day ASC"])
        .build();
    let rows = conn.execute(&sql, &params).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["day"], "2024-05-14");

    let total = conn.execute_scalar("SELECT COUNT(*) FROM \"access\"", &[]).unwrap();
    assert_eq!(total.and_then(|v| v.as_u64()), Some(9));
}

#[test]
fn identifiers_are_quoted_and_validated() {
    assert_eq!(quote_identifier("ingress-logs").unwrap(), "\"ingress-logs\"");
    assert!(quote_identifier("").is_err());
    assert!(quote_identifier("a\"b").is_err());
    assert!(quote_identifier("x y").is_err());
}
