use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Marker in a detail key identifying a presence flag on registry
/// quality scores (`repository_present`, `readme_present`, ...).
pub const PRESENT_MARKER: &str = "present";
/// Marker in a detail key identifying a presence flag on repository
/// scores and statistics (`has_wiki`, `has_readme`, ...).
pub const HAS_MARKER: &str = "has";

// ---------------------------------------------------------------------------
// ScoreValue
// ---------------------------------------------------------------------------

/// A single named sub-score: a number, a flag, free text, or an explicit
/// `null` the upstream reported (a repository without a language).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreValue {
    Int(i64),
    Float(f64),
    Flag(bool),
    Text(String),
    Null,
}

impl ScoreValue {
    /// Numeric view of the value; flags count as 0/1, text and null have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScoreValue::Int(n) => Some(*n as f64),
            ScoreValue::Float(f) => Some(*f),
            ScoreValue::Flag(b) => Some(if *b { 1.0 } else { 0.0 }),
            ScoreValue::Text(_) | ScoreValue::Null => None,
        }
    }

    /// Convert an arbitrary JSON scalar; arrays, objects and nulls are dropped.
    pub fn from_json(value: &Value) -> Option<ScoreValue> {
        match value {
            Value::Bool(b) => Some(ScoreValue::Flag(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(ScoreValue::Int)
                .or_else(|| n.as_f64().map(ScoreValue::Float)),
            Value::String(s) => Some(ScoreValue::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for ScoreValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreValue::Int(n) => write!(f, "{n}"),
            ScoreValue::Float(v) => write!(f, "{v}"),
            ScoreValue::Flag(b) => write!(f, "{}", u8::from(*b)),
            ScoreValue::Text(s) => f.write_str(s),
            ScoreValue::Null => f.write_str("None"),
        }
    }
}

impl From<i64> for ScoreValue {
    fn from(value: i64) -> Self {
        ScoreValue::Int(value)
    }
}

impl From<f64> for ScoreValue {
    fn from(value: f64) -> Self {
        ScoreValue::Float(value)
    }
}

impl From<&str> for ScoreValue {
    fn from(value: &str) -> Self {
        ScoreValue::Text(value.to_string())
    }
}

/// Named sub-scores keyed by name.
pub type ScoreDetail = BTreeMap<String, ScoreValue>;

/// Convert a JSON object into a [`ScoreDetail`], skipping non-scalar members.
pub fn detail_from_json(value: Option<&Value>) -> ScoreDetail {
    value
        .and_then(Value::as_object)
        .map(|object| {
            object
                .iter()
                .filter_map(|(key, v)| ScoreValue::from_json(v).map(|sv| (key.clone(), sv)))
                .collect()
        })
        .unwrap_or_default()
}

/// Join every `key = value` pair that signals a problem.
///
/// A pair is a problem when the value is negative, or when it is zero and
/// the key contains `flag_marker` (a presence flag that is off). Text values
/// are never reported.
pub fn negatives(detail: &ScoreDetail, flag_marker: &str) -> String {
    detail
        .iter()
        .filter(|(key, value)| match value.as_f64() {
            Some(n) => n < 0.0 || (n == 0.0 && key.contains(flag_marker)),
            None => false,
        })
        .map(|(key, value)| format!("{key} = {value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Score
// ---------------------------------------------------------------------------

/// A normalized health signal: `final` in `0..=1` (or `-1` when the upstream
/// value could not be read) plus the named sub-scores behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Score {
    #[serde(default)]
    pub r#final: f64,
    #[serde(default)]
    pub detail: ScoreDetail,
}

impl Score {
    /// Sentinel for "upstream had a score but it was unreadable".
    pub const UNKNOWN: f64 = -1.0;

    pub fn new(r#final: f64, detail: ScoreDetail) -> Self {
        Self { r#final, detail }
    }

    pub fn is_empty(&self) -> bool {
        self.r#final == 0.0 && self.detail.is_empty()
    }

    /// Registry search score, already `{"final": n, "detail": {...}}` shaped.
    pub fn from_registry(raw: &Value) -> Self {
        Self {
            r#final: raw.get("final").and_then(Value::as_f64).unwrap_or(0.0),
            detail: detail_from_json(raw.get("detail")),
        }
    }

    /// Repository community-profile payload.
    ///
    /// `health_percentage` becomes `final / 100`; each documentation file
    /// becomes a `has_<file>` 0/1 flag. Only an explicit `null` clears a
    /// flag; keys the payload leaves out count as present.
    pub fn from_community_profile(raw: &Value) -> Self {
        let health = raw
            .get("health_percentage")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let mut detail = ScoreDetail::new();

        for field in ["description", "documentation"] {
            let present = raw.get(field).map(|v| !v.is_null()).unwrap_or(true);
            detail.insert(format!("has_{field}"), ScoreValue::Int(i64::from(present)));
        }
        let files = raw.get("files");
        for file in [
            "code_of_conduct",
            "contributing",
            "issue_template",
            "pull_request_template",
            "license",
            "readme",
        ] {
            let present = files
                .and_then(|f| f.get(file))
                .map(|v| !v.is_null())
                .unwrap_or(true);
            detail.insert(format!("has_{file}"), ScoreValue::Int(i64::from(present)));
        }

        let updated_at = raw
            .get("updated_at")
            .and_then(Value::as_str)
            .and_then(|ts| crate::date::FormattedDate::from_timestamp(ts).ok())
            .map(|d| d.to_string())
            .unwrap_or_default();
        detail.insert("updated_at".to_string(), ScoreValue::Text(updated_at));

        let reports_enabled = raw
            .get("content_reports_enabled")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        detail.insert(
            "content_reports_enabled".to_string(),
            ScoreValue::Int(i64::from(reports_enabled)),
        );

        Self {
            r#final: health / 100.0,
            detail,
        }
    }

    /// Problems in the detail mapping (negative values, unset `has_` flags).
    pub fn negatives(&self) -> String {
        negatives(&self.detail, HAS_MARKER)
    }

    /// `final` with two decimals, as shown in report tables.
    pub fn final_display(&self) -> String {
        format!("{:.2}", self.r#final)
    }
}

impl fmt::Display for Score {
    /// Detail pairs, numbers with two decimals.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .detail
            .iter()
            .map(|(key, value)| match value {
                ScoreValue::Text(_) | ScoreValue::Null => format!("{key} = {value}"),
                other => format!("{key} = {:.2}", other.as_f64().unwrap_or(0.0)),
            })
            .collect();
        f.write_str(&parts.join(", "))
    }
}
