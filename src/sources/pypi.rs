//! PyPI has no search API, so candidates and health scores are scraped from
//! HTML; downloads come from pypistats.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::config::{PYPISTATS_URL, PYPI_HEALTH_URL};
use crate::date::DateRange;
use crate::error::Result;
use crate::fetcher::{GatherOutcome, UnavailableReason};
use crate::http::{HttpClient, HttpRequest};
use crate::models::{Language, Package, RecordShape, Registry, Score, ScoreDetail, ScoreValue};
use crate::organization::OrganizationConfig;
use crate::sources::libraries_io;

static SNIPPET_NAME: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"<span class="package-snippet__name">\s*([^<]+?)\s*</span>"#).ok()
});
static HEALTH_TITLE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?is)<title>[^<]*package health:\s*([0-9?]+)\s*/\s*100[^<]*</title>").ok()
});
static SCORES_LIST: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?s)<ul class="scores"[^>]*>(.*?)</ul>"#).ok());
static SCORE_ITEM: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?s)<li[^>]*>.*?<span[^>]*>\s*([^<]+?)\s*</span>.*?<span class="vue--pill__body"[^>]*>\s*([^<]+?)\s*</span>.*?</li>"#).ok()
});

/// Package names listed on one search results page.
pub fn parse_search_page(html: &str) -> Vec<String> {
    SNIPPET_NAME
        .as_ref()
        .map(|re| {
            re.captures_iter(html)
                .filter_map(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Health score from an advisor page.
///
/// `Package Health: NN/100` becomes `final = NN / 100` (`?` becomes -1);
/// each category pill of the scores list becomes a text detail. A page
/// without a health title yields a score with `final = 0`.
pub fn parse_health_page(html: &str) -> Score {
    let r#final = HEALTH_TITLE
        .as_ref()
        .and_then(|re| re.captures(html))
        .and_then(|caps| caps.get(1))
        .map(|m| match m.as_str() {
            "?" => Score::UNKNOWN,
            digits => digits.parse::<f64>().map(|n| n / 100.0).unwrap_or(Score::UNKNOWN),
        })
        .unwrap_or(0.0);

    let mut detail = ScoreDetail::new();
    let list = SCORES_LIST
        .as_ref()
        .and_then(|re| re.captures(html))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str());
    if let (Some(list), Some(item)) = (list, SCORE_ITEM.as_ref()) {
        for caps in item.captures_iter(list) {
            if let (Some(category), Some(status)) = (caps.get(1), caps.get(2)) {
                detail.insert(
                    category.as_str().to_string(),
                    ScoreValue::Text(status.as_str().to_string()),
                );
            }
        }
    }

    Score::new(r#final, detail)
}

/// Build a package from a pypistats `overall` payload, keeping only the
/// `with_mirrors` category.
pub fn package_from_downloads(name: &str, payload: &Value, range: &DateRange) -> Result<Package> {
    let with_mirrors: Vec<Value> = payload
        .get("data")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter(|row| row.get("category").and_then(Value::as_str) == Some("with_mirrors"))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let mut package = Package::new(
        payload.get("package").and_then(Value::as_str).unwrap_or(name),
        Language::Python.name(),
        Registry::Pypi,
    );
    package.set_activity(RecordShape::PypiDay.parse_all(Some(&Value::Array(with_mirrors)), range))?;
    Ok(package)
}

/// Walk search pages until one is empty or has no matching name.
pub fn search(client: &HttpClient, org: &OrganizationConfig) -> Result<Vec<String>> {
    let pattern = org.search_include(Registry::Pypi);
    let mut page = 1;
    let mut found = Vec::new();
    loop {
        let url = org.search_url(Registry::Pypi, page, 0);
        let html = client.get_text(&HttpRequest::get(url))?;
        let matching: Vec<String> = parse_search_page(&html)
            .into_iter()
            .filter(|name| name.contains(pattern))
            .collect();
        if matching.is_empty() {
            break;
        }
        found.extend(matching);
        page += 1;
    }
    Ok(found)
}

pub fn fetch_downloads(client: &HttpClient, name: &str) -> Result<Value> {
    client.get_json(&HttpRequest::get(format!("{PYPISTATS_URL}/{name}/overall")))
}

/// Health page score; `None` for any non-2xx answer.
pub fn fetch_health(client: &HttpClient, name: &str) -> Result<Option<Score>> {
    let response = client.send(&HttpRequest::get(format!("{PYPI_HEALTH_URL}/{name}")))?;
    if !response.is_success() {
        log::debug!("health page for {name} answered {}", response.status);
        return Ok(None);
    }
    Ok(Some(parse_health_page(&response.body)))
}

pub fn gather(client: &HttpClient, org: &OrganizationConfig, outcome: &mut GatherOutcome) -> Result<()> {
    log::info!("fetching from pypi ...");
    let range = outcome.fetcher.range();
    let names = search(client, org)?;
    log::info!("pypi: {} package(s) for {}", names.len(), org.name);

    for name in names {
        let payload = fetch_downloads(client, &name)?;
        let mut package = package_from_downloads(&name, &payload, &range)?;
        match fetch_health(client, &name)? {
            Some(score) => package.score = score,
            None => outcome.note(Registry::Pypi, &name, "health score", UnavailableReason::NotFound),
        }
        package.extra.libraries_io_score = libraries_io::lookup(client, Registry::Pypi, &name, outcome)?;
        outcome.fetcher.add_package(package)?;
    }
    Ok(())
}
