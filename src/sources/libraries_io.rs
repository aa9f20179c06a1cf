use crate::config::LIBRARIES_IO_URL;
use crate::error::Result;
use crate::fetcher::{GatherOutcome, UnavailableReason};
use crate::http::{HttpClient, HttpRequest};
use crate::models::{detail_from_json, Registry, ScoreDetail};

/// SourceRank endpoint for one package; scoped names are percent-encoded.
pub fn sourcerank_url(registry: Registry, name: &str, api_key: &str) -> String {
    format!(
        "{LIBRARIES_IO_URL}/{}/{}/sourcerank?api_key={api_key}",
        registry.libraries_io_platform(),
        name.replace('/', "%2F")
    )
}

/// SourceRank breakdown of a registry package.
///
/// Without an API key nothing is requested. A 404 is recorded on `outcome`
/// and yields `None`.
pub fn lookup(
    client: &HttpClient,
    registry: Registry,
    name: &str,
    outcome: &mut GatherOutcome,
) -> Result<Option<ScoreDetail>> {
    let Some(api_key) = client.libraries_io_api_key() else {
        log::debug!("no libraries.io key, skipping sourcerank for {name}");
        return Ok(None);
    };
    let request = HttpRequest::get(sourcerank_url(registry, name, api_key));
    match client.get_json_if_available(&request, &[404])? {
        Some(payload) => Ok(Some(detail_from_json(Some(&payload)))),
        None => {
            outcome.note(registry, name, "libraries.io score", UnavailableReason::NotFound);
            Ok(None)
        }
    }
}
