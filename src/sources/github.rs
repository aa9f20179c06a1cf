use std::collections::HashSet;

use serde_json::Value;

use crate::config::{GITHUB_PAGE_SIZE, GITHUB_REPOS_URL};
use crate::date::DateRange;
use crate::error::Result;
use crate::fetcher::{GatherOutcome, UnavailableReason};
use crate::http::{HttpClient, HttpRequest};
use crate::models::{Language, Package, RecordShape, Registry, Score, ScoreDetail, ScoreValue};
use crate::organization::OrganizationConfig;

/// Integer statistics copied from a search item.
const COUNT_FIELDS: [&str; 3] = ["stargazers_count", "forks_count", "watchers_count"];
/// Feature flags copied from a search item.
const FLAG_FIELDS: [&str; 6] = [
    "has_issues",
    "has_projects",
    "has_downloads",
    "has_wiki",
    "has_pages",
    "has_discussions",
];

/// A repository returned by the search.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryCandidate {
    /// `owner/name`.
    pub full_name: String,
    pub main_page_statistics: ScoreDetail,
    pub is_fork: bool,
}

impl RepositoryCandidate {
    /// Language reported by the search, if any.
    pub fn reported_language(&self) -> Option<&str> {
        match self.main_page_statistics.get("language") {
            Some(ScoreValue::Text(language)) => Some(language.as_str()),
            _ => None,
        }
    }
}

/// Front-page statistics of one search item.
pub fn main_page_statistics(item: &Value) -> ScoreDetail {
    let mut detail = ScoreDetail::new();
    detail.insert(
        "language".to_string(),
        ScoreValue::Text(
            item.get("language")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
    );
    for field in COUNT_FIELDS {
        let count = item.get(field).and_then(Value::as_i64).unwrap_or(0);
        detail.insert(field.to_string(), ScoreValue::Int(count));
    }
    for field in FLAG_FIELDS {
        let flag = item.get(field).and_then(Value::as_bool).unwrap_or(false);
        detail.insert(field.to_string(), ScoreValue::Int(i64::from(flag)));
    }
    let fork = item.get("fork").and_then(Value::as_bool).unwrap_or(false);
    detail.insert("is_forked".to_string(), ScoreValue::Flag(fork));
    detail
}

/// Repositories of one search page, plus the raw page length.
pub fn parse_search_page(payload: &Value) -> (Vec<RepositoryCandidate>, usize) {
    let items = payload
        .get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let candidates = items
        .iter()
        .filter_map(|item| {
            let full_name = item.get("full_name").and_then(Value::as_str)?;
            Some(RepositoryCandidate {
                full_name: full_name.to_string(),
                main_page_statistics: main_page_statistics(item),
                is_fork: item.get("fork").and_then(Value::as_bool).unwrap_or(false),
            })
        })
        .collect();

    (candidates, items.len())
}

/// Build a repository package from its traffic payloads.
///
/// `clones` feeds the primary series (count plus uniques) and `views` the
/// secondary one. Either payload may be `Null` when traffic is unreadable.
pub fn package_from_traffic(
    candidate: &RepositoryCandidate,
    clones: &Value,
    views: &Value,
    range: &DateRange,
) -> Result<Package> {
    let language = Language::infer(&candidate.full_name, candidate.reported_language());
    let mut package = Package::new(candidate.full_name.as_str(), language.name(), Registry::Github);
    package.set_activity(RecordShape::GithubTraffic.parse_all(clones.get("clones"), range))?;

    let mut view_records = Vec::new();
    crate::models::merge_by_date(
        &mut view_records,
        RecordShape::GithubTraffic.parse_all(views.get("views"), range),
    )?;
    package.extra.views = view_records;
    package.extra.main_page_statistics = Some(candidate.main_page_statistics.clone());
    Ok(package)
}

/// Search every account of the organization, dropping repeated repositories.
pub fn search(client: &HttpClient, org: &OrganizationConfig) -> Result<Vec<RepositoryCandidate>> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for account in org.accounts() {
        let mut page = 1;
        loop {
            let request = HttpRequest::get(org.github_search_url_for(account, page))
                .bearer(client.github_token());
            let payload = client.get_json(&request)?;
            let (candidates, page_len) = parse_search_page(&payload);
            found.extend(
                candidates
                    .into_iter()
                    .filter(|c| seen.insert(c.full_name.clone())),
            );
            if page_len < GITHUB_PAGE_SIZE {
                break;
            }
            page += 1;
        }
    }
    Ok(found)
}

/// One traffic series (`clones` or `views`); `None` when access is forbidden.
pub fn fetch_traffic(client: &HttpClient, full_name: &str, kind: &str) -> Result<Option<Value>> {
    let request = HttpRequest::get(format!("{GITHUB_REPOS_URL}/{full_name}/traffic/{kind}"))
        .bearer(client.github_token());
    client.get_json_if_available(&request, &[403])
}

/// Community profile score; `None` when the repository has no profile.
pub fn fetch_community_score(client: &HttpClient, full_name: &str) -> Result<Option<Score>> {
    let request = HttpRequest::get(format!("{GITHUB_REPOS_URL}/{full_name}/community/profile"))
        .bearer(client.github_token());
    Ok(client
        .get_json_if_available(&request, &[404])?
        .map(|payload| Score::from_community_profile(&payload)))
}

pub fn gather(client: &HttpClient, org: &OrganizationConfig, outcome: &mut GatherOutcome) -> Result<()> {
    log::info!("fetching from github ...");
    let range = outcome.fetcher.range();
    let candidates = search(client, org)?;
    log::info!("github: {} repositories for {}", candidates.len(), org.name);

    for candidate in candidates {
        let (clones, views) = if org.own_organization {
            match fetch_traffic(client, &candidate.full_name, "clones")? {
                Some(clones) => {
                    let views = fetch_traffic(client, &candidate.full_name, "views")?.unwrap_or(Value::Null);
                    (clones, views)
                }
                None => {
                    outcome.note(Registry::Github, &candidate.full_name, "traffic", UnavailableReason::Forbidden);
                    (Value::Null, Value::Null)
                }
            }
        } else {
            (Value::Null, Value::Null)
        };

        let mut package = package_from_traffic(&candidate, &clones, &views, &range)?;
        if !candidate.is_fork {
            match fetch_community_score(client, &candidate.full_name)? {
                Some(score) => package.score = score,
                None => outcome.note(
                    Registry::Github,
                    &candidate.full_name,
                    "community profile",
                    UnavailableReason::NotFound,
                ),
            }
        }
        outcome.fetcher.add_package(package)?;
    }
    Ok(())
}
