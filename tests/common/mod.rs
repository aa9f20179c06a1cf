//! Shared test fixtures for the usage-analytics integration tests.
//!
//! Provides a scripted in-memory [`Transport`] so sources can be driven
//! without a network, sample packages and fetchers, and an NDJSON writer
//! for the local log source.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use usage_analytics::{
    ActivityRecord, CancellationToken, Fetcher, FormattedDate, HttpClient, HttpRequest, HttpResponse,
    Package, Registry, RetryPolicy, Settings, Transport,
};

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

pub fn date(value: &str) -> FormattedDate {
    FormattedDate::parse(value).unwrap()
}

// ---------------------------------------------------------------------------
// Scripted transport
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Script {
    routes: Vec<(String, VecDeque<HttpResponse>)>,
    requests: Vec<HttpRequest>,
}

/// Answers requests from a script of `url fragment -> responses`.
///
/// The first route whose fragment the URL contains answers. A route with
/// several queued responses hands them out in order and keeps repeating the
/// last one. Unscripted URLs get a 404 with body `unscripted`. Clones share
/// the script, so a test can keep one clone to inspect the requests sent.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, fragment: &str, status: u16, body: impl Into<String>) -> &Self {
        let response = HttpResponse::new(status, body);
        let mut script = self.script.lock().unwrap();
        match script.routes.iter_mut().find(|(f, _)| f == fragment) {
            Some((_, queue)) => queue.push_back(response),
            None => script.routes.push((fragment.to_string(), VecDeque::from([response]))),
        }
        self
    }

    pub fn route_json(&self, fragment: &str, body: Value) -> &Self {
        self.route(fragment, 200, body.to_string())
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }

    pub fn count_matching(&self, fragment: &str) -> usize {
        self.urls().iter().filter(|u| u.contains(fragment)).count()
    }

    /// A client over this script with no retry delay.
    pub fn client(&self) -> HttpClient {
        self.client_with(Settings::default(), CancellationToken::new())
    }

    pub fn client_with(&self, settings: Settings, cancel: CancellationToken) -> HttpClient {
        HttpClient::new(Box::new(self.clone()), RetryPolicy::immediate(3), cancel).with_credentials(&settings)
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> usage_analytics::Result<HttpResponse> {
        let mut script = self.script.lock().unwrap();
        script.requests.push(request.clone());
        let answer = script
            .routes
            .iter_mut()
            .find(|(fragment, _)| request.url.contains(fragment.as_str()))
            .and_then(|(_, queue)| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            });
        Ok(answer.unwrap_or_else(|| HttpResponse::new(404, "unscripted")))
    }
}

// ---------------------------------------------------------------------------
// Sample data
// ---------------------------------------------------------------------------

/// `days` consecutive records ending on `end`, each with `count` downloads.
pub fn daily_records(end: FormattedDate, days: i64, count: u64) -> Vec<ActivityRecord> {
    (0..days).map(|offset| ActivityRecord::new(end - (days - 1 - offset), count)).collect()
}

/// A fetcher with one package per registry plus a user-agent group.
pub fn sample_fetcher() -> Fetcher {
    let end = date("2024-05-14");
    let mut fetcher = Fetcher::for_window("Multiversx", end, 14);

    let mut npm = Package::new("@multiversx/sdk-core", "Javascript", Registry::Npm);
    npm.set_activity(daily_records(end, 14, 10)).unwrap();
    npm.score = usage_analytics::Score::from_registry(&json!({
        "final": 0.61,
        "detail": {"quality": 0.8, "popularity": 0.2, "maintenance": 0.9}
    }));
    fetcher.add_package(npm).unwrap();

    let mut repo = Package::new("multiversx/mx-sdk-rs", "Rust", Registry::Github);
    repo.set_activity(vec![
        ActivityRecord::with_secondary(date("2024-05-13"), 12, 4),
        ActivityRecord::with_secondary(date("2024-05-14"), 8, 3),
    ])
    .unwrap();
    repo.extra.views = vec![ActivityRecord::with_secondary(date("2024-05-14"), 40, 9)];
    fetcher.add_package(repo).unwrap();

    let mut agents = Package::new("Axios", "", usage_analytics::Source::UserAgent("axios".to_string()));
    agents.set_activity(vec![ActivityRecord::new(date("2024-05-10"), 3)]).unwrap();
    fetcher.add_package(agents).unwrap();

    fetcher
}

// ---------------------------------------------------------------------------
// Access-log exports
// ---------------------------------------------------------------------------

/// One NDJSON access-log record.
pub fn log_line(timestamp: &str, user_agent: Option<&str>) -> Value {
    match user_agent {
        Some(ua) => json!({"@timestamp": timestamp, "user_agent": ua}),
        None => json!({"@timestamp": timestamp}),
    }
}

/// Write `rows` as NDJSON into `dir/name`.
pub fn write_ndjson(dir: &Path, name: &str, rows: &[Value]) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    for row in rows {
        writeln!(file, "{}", serde_json::to_string(row).unwrap()).unwrap();
    }
    file.flush().unwrap();
    path
}
