use serde_json::Value;

use crate::config::{NPM_DOWNLOADS_URL, NPM_PAGE_SIZE};
use crate::date::DateRange;
use crate::error::{Result, UsageError};
use crate::fetcher::{GatherOutcome, UnavailableReason};
use crate::http::{HttpClient, HttpRequest};
use crate::models::{Language, Package, RecordShape, Registry, Score};
use crate::organization::OrganizationConfig;
use crate::sources::libraries_io;

/// A package accepted from the registry search.
#[derive(Debug, Clone, PartialEq)]
pub struct NpmCandidate {
    pub name: String,
    pub score: Score,
}

/// Accepted candidates of one search page, plus the raw page length used
/// to detect the last page.
pub fn parse_search_page(payload: &Value, org: &OrganizationConfig) -> (Vec<NpmCandidate>, usize) {
    let objects = payload
        .get("objects")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let candidates = objects
        .iter()
        .filter_map(|object| {
            let package = object.get("package")?;
            let name = package.get("name").and_then(Value::as_str)?;
            let repository = package
                .get("links")
                .and_then(|links| links.get("repository"))
                .and_then(Value::as_str);
            if !org.accepts(Registry::Npm, name, repository, false) {
                return None;
            }
            Some(NpmCandidate {
                name: name.to_string(),
                score: object.get("score").map(Score::from_registry).unwrap_or_default(),
            })
        })
        .collect();

    (candidates, objects.len())
}

/// Build a package from a downloads-range payload (`downloads[].day/downloads`).
pub fn package_from_downloads(name: &str, payload: &Value, range: &DateRange) -> Result<Package> {
    let mut package = Package::new(
        payload.get("package").and_then(Value::as_str).unwrap_or(name),
        Language::Javascript.name(),
        Registry::Npm,
    );
    package.set_activity(RecordShape::NpmDay.parse_all(payload.get("downloads"), range))?;
    Ok(package)
}

/// Page through the registry search until a short page comes back.
pub fn search(client: &HttpClient, org: &OrganizationConfig) -> Result<Vec<NpmCandidate>> {
    let mut page = 0;
    let mut found = Vec::new();
    loop {
        let url = org.search_url(Registry::Npm, page, NPM_PAGE_SIZE);
        let payload = client.get_json(&HttpRequest::get(url))?;
        let (candidates, page_len) = parse_search_page(&payload, org);
        found.extend(candidates);
        if page_len < NPM_PAGE_SIZE {
            break;
        }
        page += 1;
    }
    Ok(found)
}

/// Daily downloads over `range`; `None` when the registry does not know
/// the package.
pub fn fetch_downloads(client: &HttpClient, name: &str, range: &DateRange) -> Result<Option<Value>> {
    let url = format!("{NPM_DOWNLOADS_URL}/{}:{}/{name}", range.start, range.end);
    let request = HttpRequest::get(url);
    let response = client.send(&request)?;
    if response.body.contains("not found") {
        return Ok(None);
    }
    if !response.is_success() {
        return Err(UsageError::Upstream {
            url: request.url,
            status: response.status,
        });
    }
    response.json().map(Some)
}

pub fn gather(client: &HttpClient, org: &OrganizationConfig, outcome: &mut GatherOutcome) -> Result<()> {
    log::info!("fetching from npm ...");
    let range = outcome.fetcher.range();
    let candidates = search(client, org)?;
    log::info!("npm: {} package(s) for {}", candidates.len(), org.name);

    for candidate in candidates {
        let payload = match fetch_downloads(client, &candidate.name, &range)? {
            Some(payload) => payload,
            None => {
                outcome.note(Registry::Npm, &candidate.name, "downloads", UnavailableReason::NotFound);
                Value::Null
            }
        };
        let mut package = package_from_downloads(&candidate.name, &payload, &range)?.with_score(candidate.score);
        package.extra.libraries_io_score = libraries_io::lookup(client, Registry::Npm, &candidate.name, outcome)?;
        outcome.fetcher.add_package(package)?;
    }
    Ok(())
}
