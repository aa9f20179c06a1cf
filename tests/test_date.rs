//! Calendar arithmetic, ISO weeks and date ranges.

mod common;

use common::date;
use usage_analytics::{days_between, DateRange, FormattedDate, UsageError};

// ---------------------------------------------------------------------------
// Parsing and formatting
// ---------------------------------------------------------------------------

#[test]
fn parse_round_trips_through_display() {
    assert_eq!(date("2024-05-02").to_string(), "2024-05-02");
    assert_eq!(" 2024-05-02 ".parse::<FormattedDate>().unwrap(), date("2024-05-02"));
}

#[test]
fn malformed_date_fails_with_format_error() {
    for bad in ["2024-13-40", "2024-02-30", "02/05/2024", ""] {
        match FormattedDate::parse(bad) {
            Err(UsageError::Format(msg)) => assert!(msg.contains("YYYY-MM-DD")),
            other => panic!("expected a format error for {bad:?}, got {other:?}"),
        }
    }
}

#[test]
fn timestamps_keep_only_the_day() {
    assert_eq!(FormattedDate::from_timestamp("2024-05-02T13:45:00Z").unwrap(), date("2024-05-02"));
}

#[test]
fn sentinel_is_fixed() {
    assert_eq!(FormattedDate::sentinel().to_string(), "1980-01-01");
}

#[test]
fn serde_uses_the_string_form() {
    let json = serde_json::to_string(&date("2024-05-02")).unwrap();
    assert_eq!(json, "\"2024-05-02\"");
    let back: FormattedDate = serde_json::from_str(&json).unwrap();
    assert_eq!(back, date("2024-05-02"));
    assert!(serde_json::from_str::<FormattedDate>("\"2024-99-01\"").is_err());
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

#[test]
fn addition_rolls_over_month_end() {
    assert_eq!(date("2024-01-31") + 1, date("2024-02-01"));
    assert_eq!(date("2023-12-31") + 1, date("2024-01-01"));
}

#[test]
fn subtraction_honours_leap_years() {
    assert_eq!(date("2024-03-01") - 1, date("2024-02-29"));
    assert_eq!(date("2023-03-01") - 1, date("2023-02-28"));
}

#[test]
fn days_between_is_signed() {
    assert_eq!(days_between(date("2024-05-01"), date("2024-05-14")), 13);
    assert_eq!(days_between(date("2024-05-14"), date("2024-05-01")), -13);
    assert_eq!(days_between(date("2024-05-01"), date("2024-05-01")), 0);
}

// ---------------------------------------------------------------------------
// ISO weeks
// ---------------------------------------------------------------------------

#[test]
fn iso_week_of_a_known_date() {
    let d = date("2024-05-14");
    assert_eq!(d.iso_week(), 20);
    assert_eq!(d.iso_weekday(), 2);
    assert_eq!(d.week_and_day(), "week= 20, weekday= 2");
}

#[test]
fn from_iso_week_returns_the_sunday_ending_it() {
    let sunday = FormattedDate::from_iso_week_in(20, 2024).unwrap();
    assert_eq!(sunday, date("2024-05-19"));
    assert_eq!(sunday.iso_weekday(), 7);
    assert_eq!(sunday.iso_week(), 20);
}

#[test]
fn from_iso_week_rejects_missing_weeks() {
    assert!(FormattedDate::from_iso_week_in(53, 2023).is_err());
    assert!(FormattedDate::from_iso_week_in(0, 2024).is_err());
}

// ---------------------------------------------------------------------------
// DateRange
// ---------------------------------------------------------------------------

#[test]
fn window_ending_on_includes_both_ends() {
    let range = DateRange::ending_on(date("2024-05-14"), 14);
    assert_eq!(range.start, date("2024-05-01"));
    assert_eq!(range.len_days(), 14);
    assert!(range.contains(date("2024-05-01")));
    assert!(range.contains(date("2024-05-14")));
    assert!(!range.contains(date("2024-05-15")));
    assert_eq!(range.days().count(), 14);
}

#[test]
fn inverted_range_is_rejected() {
    assert!(DateRange::new(date("2024-05-14"), date("2024-05-01")).is_err());
}
