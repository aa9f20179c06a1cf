//! User-agent classification and grouping.
//!
//! Raw user-agent strings from access logs are bucketed into a fixed,
//! ordered table of groups. The first group with a matching pattern wins,
//! so overlapping patterns resolve by declaration order rather than by how
//! specific they are: a branded `MultiversX` string that also looks like a
//! browser lands in the branded group, and a `Mozilla/... +https://bot`
//! crawler lands in the bot-URL group before the browser group is tried.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::error::Result;
use crate::models::{ActivityRecord, Package, RecordShape, Source};
use crate::date::DateRange;

// ---------------------------------------------------------------------------
// Group table
// ---------------------------------------------------------------------------

/// How a pattern is matched against a raw user agent (always case-insensitive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Literal substring, escaped before compilation.
    Contains(&'static str),
    /// Regular expression.
    Regex(&'static str),
}

/// How a group turns a raw user agent into its display key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStyle {
    /// Keep the raw string for manual inspection.
    Raw,
    /// `name/major` -- everything up to one character past the first `/`.
    NameMajorVersion,
    /// `URL: <first +http(s):// token>`.
    BotUrl,
    /// The group's display name.
    DisplayName,
}

/// A canonical user-agent category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserAgentGroup {
    /// Identifier stored as the package source in snapshots.
    pub id: &'static str,
    pub display_name: &'static str,
    pub patterns: &'static [Pattern],
    pub key_style: KeyStyle,
}

pub const MULTIVERSX: UserAgentGroup = UserAgentGroup {
    id: "multiversx",
    display_name: "MultiversX",
    patterns: &[Pattern::Contains("multiversx")],
    key_style: KeyStyle::Raw,
};
pub const PYTHON: UserAgentGroup = UserAgentGroup {
    id: "python",
    display_name: "Python",
    patterns: &[Pattern::Regex(r"^python")],
    key_style: KeyStyle::NameMajorVersion,
};
pub const AXIOS: UserAgentGroup = UserAgentGroup {
    id: "axios",
    display_name: "Axios",
    patterns: &[Pattern::Regex(r"^axios/")],
    key_style: KeyStyle::NameMajorVersion,
};
pub const HTTPS_BOT: UserAgentGroup = UserAgentGroup {
    id: "https",
    display_name: "Bots with URL",
    patterns: &[Pattern::Regex(r"^mozilla/.*\+https?://")],
    key_style: KeyStyle::BotUrl,
};
pub const MOBILE_IOS: UserAgentGroup = UserAgentGroup {
    id: "mobile_ios",
    display_name: "Mobile iOS",
    patterns: &[Pattern::Regex(r"^mozilla/.*\((iphone|ipad|ipod)")],
    key_style: KeyStyle::DisplayName,
};
pub const MOBILE_ANDROID: UserAgentGroup = UserAgentGroup {
    id: "mobile_android",
    display_name: "Mobile Android",
    patterns: &[Pattern::Regex(r"^mozilla/.*android")],
    key_style: KeyStyle::DisplayName,
};
pub const BROWSER: UserAgentGroup = UserAgentGroup {
    id: "browser",
    display_name: "Browser",
    patterns: &[
        Pattern::Regex(r"^mozilla/"),
        Pattern::Regex(r"^safari/"),
        Pattern::Regex(r"^opera/"),
    ],
    key_style: KeyStyle::DisplayName,
};
pub const OKHTTP: UserAgentGroup = UserAgentGroup {
    id: "okhttp",
    display_name: "OkHttp",
    patterns: &[Pattern::Regex(r"^okhttp/")],
    key_style: KeyStyle::NameMajorVersion,
};
pub const APACHE: UserAgentGroup = UserAgentGroup {
    id: "apache",
    display_name: "Apache-HttpClient",
    patterns: &[Pattern::Regex(r"^apache-httpclient/")],
    key_style: KeyStyle::NameMajorVersion,
};
pub const CURL: UserAgentGroup = UserAgentGroup {
    id: "curl",
    display_name: "curl",
    patterns: &[Pattern::Regex(r"^curl/")],
    key_style: KeyStyle::NameMajorVersion,
};
pub const POSTMAN: UserAgentGroup = UserAgentGroup {
    id: "postman",
    display_name: "PostmanRuntime",
    patterns: &[Pattern::Regex(r"^postmanruntime/")],
    key_style: KeyStyle::DisplayName,
};
pub const OTHER: UserAgentGroup = UserAgentGroup {
    id: "other",
    display_name: "Other",
    patterns: &[Pattern::Contains("@@")],
    key_style: KeyStyle::DisplayName,
};
pub const UNKNOWN: UserAgentGroup = UserAgentGroup {
    id: "unknown",
    display_name: "Unknown",
    patterns: &[],
    key_style: KeyStyle::Raw,
};

/// Every group in match order. [`UNKNOWN`] is last and matches nothing by
/// pattern; it is the fallback.
pub const GROUPS: [UserAgentGroup; 13] = [
    MULTIVERSX,
    PYTHON,
    AXIOS,
    HTTPS_BOT,
    MOBILE_IOS,
    MOBILE_ANDROID,
    BROWSER,
    OKHTTP,
    APACHE,
    CURL,
    POSTMAN,
    OTHER,
    UNKNOWN,
];

static COMPILED: LazyLock<Vec<(UserAgentGroup, Vec<Regex>)>> = LazyLock::new(|| {
    GROUPS
        .iter()
        .map(|group| {
            let regexes = group
                .patterns
                .iter()
                .filter_map(|pattern| {
                    let source = match pattern {
                        Pattern::Contains(literal) => regex::escape(literal),
                        Pattern::Regex(expr) => (*expr).to_string(),
                    };
                    match RegexBuilder::new(&source).case_insensitive(true).build() {
                        Ok(regex) => Some(regex),
                        Err(e) => {
                            log::error!("Invalid pattern for group {}: {}", group.id, e);
                            None
                        }
                    }
                })
                .collect();
            (*group, regexes)
        })
        .collect()
});

static BOT_URL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\+(https?://[^\s;)]+)").ok());

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// The first group, in table order, with a pattern matching `raw_user_agent`.
pub fn classify(raw_user_agent: &str) -> UserAgentGroup {
    COMPILED
        .iter()
        .find(|(_, regexes)| regexes.iter().any(|r| r.is_match(raw_user_agent)))
        .map(|(group, _)| *group)
        .unwrap_or(UNKNOWN)
}

/// Look a group up by its identifier.
pub fn group_by_id(id: &str) -> Option<UserAgentGroup> {
    GROUPS.iter().copied().find(|g| g.id == id)
}

/// Canonical display key for a raw user agent.
pub fn normalize_key(raw_user_agent: &str) -> String {
    let group = classify(raw_user_agent);
    match group.key_style {
        KeyStyle::Raw => raw_user_agent.to_string(),
        KeyStyle::NameMajorVersion => name_major_version(raw_user_agent)
            .unwrap_or_else(|| group.display_name.to_string()),
        KeyStyle::BotUrl => {
            let url = BOT_URL
                .as_ref()
                .and_then(|re| re.captures(raw_user_agent))
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string());
            // A missing URL renders as the literal `URL: None`.
            format!("URL: {}", url.as_deref().unwrap_or("None"))
        }
        KeyStyle::DisplayName => group.display_name.to_string(),
    }
}

/// `axios/1.6.7` -> `axios/1`.
fn name_major_version(raw: &str) -> Option<String> {
    let slash = raw.find('/')?;
    let after = &raw[slash + 1..];
    let major_len = after.chars().next().map(char::len_utf8).unwrap_or(0);
    Some(raw[..slash + 1 + major_len].to_string())
}

// ---------------------------------------------------------------------------
// Grouping pass
// ---------------------------------------------------------------------------

/// One raw user-agent bucket from the log aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateBucket {
    pub key: String,
    pub doc_count: u64,
    pub days: Vec<ActivityRecord>,
}

impl AggregateBucket {
    /// Build from a terms-aggregation bucket carrying a `docs_per_day`
    /// date histogram; days outside `range` are dropped.
    pub fn from_search_bucket(raw: &Value, range: &DateRange) -> Self {
        Self {
            key: raw
                .get("key")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            doc_count: raw.get("doc_count").and_then(Value::as_u64).unwrap_or(0),
            days: RecordShape::SearchBucket.parse_all(
                raw.get("docs_per_day").and_then(|d| d.get("buckets")),
                range,
            ),
        }
    }
}

/// How coarsely raw buckets are folded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupingLevel {
    /// One package per group, named by the group's display name.
    #[default]
    Group,
    /// One package per canonical key ([`normalize_key`]), so raw-keyed
    /// groups keep their detail and versioned clients split by major version.
    Key,
}

/// Fold raw user-agent buckets into one package per group (or key).
///
/// Packages are returned in first-seen order; each package's activity is the
/// merge-by-date of every bucket folded into it.
pub fn group_user_agents(buckets: &[AggregateBucket], level: GroupingLevel) -> Result<Vec<Package>> {
    let mut packages: Vec<Package> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for bucket in buckets {
        let group = classify(&bucket.key);
        let name = match level {
            GroupingLevel::Group => group.display_name.to_string(),
            GroupingLevel::Key => normalize_key(&bucket.key),
        };

        let position = match index.get(&name) {
            Some(&position) => position,
            None => {
                packages.push(Package::new(
                    name.clone(),
                    "",
                    Source::UserAgent(group.id.to_string()),
                ));
                index.insert(name, packages.len() - 1);
                packages.len() - 1
            }
        };

        packages[position].merge_activity(bucket.days.iter().copied())?;
    }

    Ok(packages)
}
