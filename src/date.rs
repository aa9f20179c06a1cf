//! Calendar-day value type used for every date-range computation.
//!
//! A [`FormattedDate`] always renders as `YYYY-MM-DD` and supports adding or
//! subtracting whole days with month/year rollover handled by chrono.

use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::{DATE_FORMAT, DEFAULT_DATE};
use crate::error::{Result, UsageError};

/// A calendar date whose string form is always `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormattedDate(NaiveDate);

impl FormattedDate {
    /// Parse a `YYYY-MM-DD` string.
    ///
    /// Malformed input (including out-of-range months or days) fails with
    /// [`UsageError::Format`]; no default is substituted here.
    pub fn parse(value: &str) -> Result<Self> {
        NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
            .map(Self)
            .map_err(|_| {
                UsageError::Format(format!(
                    "Date must be in YYYY-MM-DD format: {}",
                    value
                ))
            })
    }

    /// Build a date from year, month and day components.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| {
                UsageError::Format(format!("Invalid calendar date: {year}-{month}-{day}"))
            })
    }

    /// Today in the local timezone.
    pub fn now() -> Self {
        Self(Local::now().date_naive())
    }

    /// The placeholder date used when an upstream record carries no date.
    pub fn sentinel() -> Self {
        Self::parse(DEFAULT_DATE).unwrap_or(Self(NaiveDate::MIN))
    }

    /// Parse the leading date part of an ISO-8601 timestamp such as
    /// `2024-05-02T00:00:00Z`.
    pub fn from_timestamp(value: &str) -> Result<Self> {
        let date_part = value.get(..10).unwrap_or(value);
        Self::parse(date_part)
    }

    /// The Sunday ending ISO week `week` of the current year.
    pub fn from_iso_week(week: u32) -> Result<Self> {
        Self::from_iso_week_in(week, Self::now().year())
    }

    /// The Sunday ending ISO week `week` of `year`.
    pub fn from_iso_week_in(week: u32, year: i32) -> Result<Self> {
        NaiveDate::from_isoywd_opt(year, week, Weekday::Sun)
            .map(Self)
            .ok_or_else(|| {
                UsageError::Format(format!("Week {week} does not exist in {year}"))
            })
    }

    /// ISO week number of this date.
    pub fn iso_week(&self) -> u32 {
        self.0.iso_week().week()
    }

    /// ISO week-numbering year of this date (differs from the calendar year
    /// around New Year).
    pub fn iso_year(&self) -> i32 {
        self.0.iso_week().year()
    }

    /// ISO weekday, Monday = 1 .. Sunday = 7.
    pub fn iso_weekday(&self) -> u32 {
        self.0.weekday().number_from_monday()
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// Signed number of days from `other` to `self`.
    pub fn days_from(&self, other: FormattedDate) -> i64 {
        (self.0 - other.0).num_days()
    }

    /// Human-readable `week= N, weekday= D` string logged at the start of a run.
    pub fn week_and_day(&self) -> String {
        format!("week= {}, weekday= {}", self.iso_week(), self.iso_weekday())
    }

    /// Access the underlying chrono date.
    pub fn naive(&self) -> NaiveDate {
        self.0
    }
}

/// Signed number of days from `a` to `b` (negative when `b` precedes `a`).
pub fn days_between(a: FormattedDate, b: FormattedDate) -> i64 {
    b.days_from(a)
}

impl Add<i64> for FormattedDate {
    type Output = FormattedDate;

    fn add(self, days: i64) -> FormattedDate {
        FormattedDate(self.0 + Duration::days(days))
    }
}

impl Sub<i64> for FormattedDate {
    type Output = FormattedDate;

    fn sub(self, days: i64) -> FormattedDate {
        FormattedDate(self.0 - Duration::days(days))
    }
}

impl fmt::Display for FormattedDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

impl FromStr for FormattedDate {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<NaiveDate> for FormattedDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl Serialize for FormattedDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FormattedDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        FormattedDate::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// DateRange
// ---------------------------------------------------------------------------

/// An inclusive `[start, end]` range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: FormattedDate,
    pub end: FormattedDate,
}

impl DateRange {
    /// Build a range, rejecting `start > end`.
    pub fn new(start: FormattedDate, end: FormattedDate) -> Result<Self> {
        if start > end {
            return Err(UsageError::InvalidArgument(format!(
                "start date {start} is after end date {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The `days`-long window ending on (and including) `end`.
    pub fn ending_on(end: FormattedDate, days: u32) -> Self {
        let span = i64::from(days.max(1)) - 1;
        Self {
            start: end - span,
            end,
        }
    }

    pub fn contains(&self, date: FormattedDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar days covered, both ends included.
    pub fn len_days(&self) -> i64 {
        self.end.days_from(self.start) + 1
    }

    /// Every day of the range in ascending order.
    pub fn days(&self) -> impl Iterator<Item = FormattedDate> + '_ {
        (0..self.len_days()).map(move |offset| self.start + offset)
    }
}
