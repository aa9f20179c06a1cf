use serde_json::Value;

use crate::config::{CRATES_API_URL, CRATES_PAGE_SIZE};
use crate::date::DateRange;
use crate::error::Result;
use crate::fetcher::GatherOutcome;
use crate::http::{HttpClient, HttpRequest};
use crate::models::{Language, Package, RecordShape, Registry};
use crate::organization::OrganizationConfig;
use crate::sources::libraries_io;

/// Accepted crate names of one search page, plus the raw page length.
///
/// A crate is only accepted when its repository link points into one of the
/// organization's accounts.
pub fn parse_search_page(payload: &Value, org: &OrganizationConfig) -> (Vec<String>, usize) {
    let crates = payload
        .get("crates")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let names = crates
        .iter()
        .filter_map(|item| {
            let name = item.get("name").and_then(Value::as_str)?;
            let repository = item.get("repository").and_then(Value::as_str);
            org.accepts(Registry::Cargo, name, repository, true)
                .then(|| name.to_string())
        })
        .collect();

    (names, crates.len())
}

/// Build a package from a downloads payload.
///
/// Per-version downloads and `meta.extra_downloads` are merged by date, so
/// each day ends up with one record carrying the crate's total.
pub fn package_from_downloads(name: &str, payload: &Value, range: &DateRange) -> Result<Package> {
    let mut package = Package::new(name, Language::Rust.name(), Registry::Cargo);
    package.set_activity(RecordShape::CratesDay.parse_all(payload.get("version_downloads"), range))?;
    package.merge_activity(RecordShape::CratesDay.parse_all(
        payload.get("meta").and_then(|meta| meta.get("extra_downloads")),
        range,
    ))?;
    Ok(package)
}

pub fn search(client: &HttpClient, org: &OrganizationConfig) -> Result<Vec<String>> {
    let mut page = 0;
    let mut found = Vec::new();
    loop {
        let url = org.search_url(Registry::Cargo, page, CRATES_PAGE_SIZE);
        let payload = client.get_json(&HttpRequest::get(url))?;
        let (names, page_len) = parse_search_page(&payload, org);
        found.extend(names);
        if page_len < CRATES_PAGE_SIZE {
            break;
        }
        page += 1;
    }
    Ok(found)
}

pub fn fetch_downloads(client: &HttpClient, name: &str) -> Result<Value> {
    client.get_json(&HttpRequest::get(format!("{CRATES_API_URL}/{name}/downloads")))
}

pub fn gather(client: &HttpClient, org: &OrganizationConfig, outcome: &mut GatherOutcome) -> Result<()> {
    log::info!("fetching from crates ...");
    let range = outcome.fetcher.range();
    let names = search(client, org)?;
    log::info!("crates.io: {} crate(s) for {}", names.len(), org.name);

    for name in names {
        let payload = fetch_downloads(client, &name)?;
        let mut package = package_from_downloads(&name, &payload, &range)?;
        package.extra.libraries_io_score = libraries_io::lookup(client, Registry::Cargo, &name, outcome)?;
        outcome.fetcher.add_package(package)?;
    }
    Ok(())
}
