use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_DATE: &str = "1980-01-01";

pub const DAYS_IN_MONTHLY_REPORT: u32 = 30;
pub const DAYS_IN_TWO_WEEKS_REPORT: u32 = 14;
pub const DAYS_IN_WEEK: u32 = 7;

pub const NPM_PAGE_SIZE: usize = 20;
pub const CRATES_PAGE_SIZE: usize = 20;
pub const GITHUB_PAGE_SIZE: usize = 100;
pub const LOG_AGGREGATION_SIZE: usize = 10_000;

pub const NO_OF_RETRIES: u32 = 10;
pub const SECONDS_BEFORE_RETRY: u64 = 10;

pub const NPM_SEARCH_URL: &str = "https://registry.npmjs.org/-/v1/search";
pub const NPM_DOWNLOADS_URL: &str = "https://api.npmjs.org/downloads/range";
pub const CRATES_API_URL: &str = "https://crates.io/api/v1/crates";
pub const PYPI_SEARCH_URL: &str = "https://pypi.org/search/";
pub const PYPISTATS_URL: &str = "https://pypistats.org/api/packages";
pub const PYPI_HEALTH_URL: &str = "https://snyk.io/advisor/python";
pub const LIBRARIES_IO_URL: &str = "https://libraries.io/api";
pub const GITHUB_SEARCH_URL: &str = "https://api.github.com/search/repositories";
pub const GITHUB_REPOS_URL: &str = "https://api.github.com/repos";

pub const DEFAULT_LOG_INDEX: &str = "ingress-logs";

/// crates.io rejects anonymous clients without a descriptive user agent.
pub const USER_AGENT: &str = concat!("usage-analytics/", env!("CARGO_PKG_VERSION"));

pub fn default_snapshot_dir() -> PathBuf {
    if let Some(data) = dirs::data_dir() {
        data.join("usage-analytics")
    } else {
        PathBuf::from(".usage-analytics")
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Process-wide settings, resolved once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory snapshots are written to and read from.
    pub snapshot_dir: PathBuf,
    pub github_token: Option<String>,
    pub libraries_io_api_key: Option<String>,
    /// Base URL of the search engine holding access logs.
    pub log_url: Option<String>,
    pub log_index: String,
    pub log_user: Option<String>,
    pub log_password: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            snapshot_dir: default_snapshot_dir(),
            github_token: None,
            libraries_io_api_key: None,
            log_url: None,
            log_index: DEFAULT_LOG_INDEX.to_string(),
            log_user: None,
            log_password: None,
            timeout: Duration::from_secs(120),
            max_retries: NO_OF_RETRIES,
            retry_delay: Duration::from_secs(SECONDS_BEFORE_RETRY),
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// Recognized variables: `JSON_FOLDER`, `MX_GITHUB_TOKEN`,
    /// `LIBRARIES_IO_API_KEY`, `LOG_URL`, `INDEX_NAME`,
    /// `ELASTIC_SEARCH_USER`, `ELASTIC_SEARCH_PASSWORD`. Unset or empty
    /// variables fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            snapshot_dir: non_empty_var("JSON_FOLDER")
                .map(PathBuf::from)
                .unwrap_or(defaults.snapshot_dir),
            github_token: non_empty_var("MX_GITHUB_TOKEN"),
            libraries_io_api_key: non_empty_var("LIBRARIES_IO_API_KEY"),
            log_url: non_empty_var("LOG_URL"),
            log_index: non_empty_var("INDEX_NAME").unwrap_or(defaults.log_index),
            log_user: non_empty_var("ELASTIC_SEARCH_USER"),
            log_password: non_empty_var("ELASTIC_SEARCH_PASSWORD"),
            ..defaults
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
