//! Usage analytics for software ecosystems.
//!
//! Gathers daily usage of an ecosystem's packages (npm, crates.io, PyPI),
//! repositories (GitHub traffic and community health) and API clients
//! (access-log user agents), normalizes everything into one package /
//! activity model, and stores it as dated JSON snapshots that the
//! dashboards read back.
//!
//! # Quick start
//!
//! ```no_run
//! use usage_analytics::{organization, FormattedDate, Gatherer, ReportKind};
//!
//! let gatherer = Gatherer::builder().build().unwrap();
//! let end = FormattedDate::parse("2024-05-14").unwrap();
//!
//! // Gather one organization's repositories and write the green snapshot
//! let org = organization::lookup("multiversx").unwrap();
//! let outcome = gatherer.github(&org, end).unwrap();
//! gatherer.store().write(ReportKind::Green, end, &[outcome.fetcher]).unwrap();
//!
//! // Read it back for a dashboard
//! let fetcher = gatherer.store().load_or_empty(ReportKind::Green, end, "Multiversx");
//! ```

#[cfg(feature = "async")]
pub mod async_client;
pub mod config;
pub mod connection;
pub mod date;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod models;
pub mod organization;
pub mod report;
pub mod sources;
pub mod sql_builder;
pub mod user_agent;

#[cfg(feature = "async")]
pub use async_client::AsyncGatherer;
pub use config::Settings;
pub use connection::Connection;
pub use date::{days_between, DateRange, FormattedDate};
pub use error::{Result, UsageError};
pub use fetcher::{Fetcher, GatherOutcome, UnavailableData, UnavailableReason};
pub use http::{CancellationToken, HttpClient, HttpRequest, HttpResponse, RetryPolicy, Transport};
pub use models::{ActivityRecord, ActivityStats, Language, Package, PackageSummary, Registry, Score, Source};
pub use organization::OrganizationConfig;
pub use report::{ReportKind, ReportTable, SnapshotStore};
pub use sources::{ElasticLogSource, LocalLogSource, LogSource};
pub use sql_builder::SqlBuilder;
pub use user_agent::{classify, normalize_key, GroupingLevel, UserAgentGroup};

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// GathererBuilder
// ---------------------------------------------------------------------------

/// Builder for configuring and constructing a [`Gatherer`].
///
/// Starts from [`Settings::default`]; use [`settings`](Self::settings) to
/// pass values resolved from the environment at the process boundary.
pub struct GathererBuilder {
    settings: Settings,
    cancel: CancellationToken,
    transport: Option<Box<dyn Transport>>,
    retry: Option<RetryPolicy>,
}

impl Default for GathererBuilder {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            cancel: CancellationToken::new(),
            transport: None,
            retry: None,
        }
    }
}

impl GathererBuilder {
    /// Replace all settings at once.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Directory snapshots are written to and read from.
    pub fn snapshot_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.settings.snapshot_dir = path.as_ref().to_path_buf();
        self
    }

    /// HTTP request timeout. Defaults to 120 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = timeout;
        self
    }

    /// Abort every request once `deadline` has elapsed from now.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.cancel = CancellationToken::with_timeout(deadline);
        self
    }

    /// Share an existing cancellation token.
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Send requests through `transport` instead of `reqwest`.
    pub fn transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Override the retry budget and delay from the settings.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Build the gatherer, creating the snapshot directory if needed.
    pub fn build(self) -> Result<Gatherer> {
        let store = SnapshotStore::new(&self.settings.snapshot_dir)?;
        let retry = self.retry.unwrap_or(RetryPolicy {
            max_retries: self.settings.max_retries,
            delay: self.settings.retry_delay,
        });
        let transport: Box<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Box::new(http::ReqwestTransport::new(self.settings.timeout)?),
        };
        let client = HttpClient::new(transport, retry, self.cancel.clone()).with_credentials(&self.settings);
        Ok(Gatherer {
            settings: self.settings,
            cancel: self.cancel,
            client,
            store,
        })
    }
}

// ---------------------------------------------------------------------------
// Gatherer
// ---------------------------------------------------------------------------

/// The main entry point: runs gathers and owns the snapshot store.
///
/// Created via [`Gatherer::builder()`].
pub struct Gatherer {
    settings: Settings,
    cancel: CancellationToken,
    client: HttpClient,
    store: SnapshotStore,
}

impl Gatherer {
    /// Create a new builder for configuring the gatherer.
    pub fn builder() -> GathererBuilder {
        GathererBuilder::default()
    }

    /// npm, crates.io and PyPI packages of `org` (blue report).
    pub fn package_managers(&self, org: &OrganizationConfig, end_date: FormattedDate) -> Result<GatherOutcome> {
        sources::gather_package_managers(org, end_date, &self.client)
    }

    /// Repositories of `org` (green report).
    pub fn github(&self, org: &OrganizationConfig, end_date: FormattedDate) -> Result<GatherOutcome> {
        sources::gather_github(org, end_date, &self.client)
    }

    /// User-agent groups from `logs` (yellow report), using the configured index.
    pub fn user_agents(
        &self,
        org: &OrganizationConfig,
        end_date: FormattedDate,
        logs: &dyn LogSource,
        level: GroupingLevel,
    ) -> Result<GatherOutcome> {
        sources::gather_user_agents(org, end_date, logs, &self.settings.log_index, level, &self.cancel)
    }

    /// A log source over local NDJSON exports, or the configured search
    /// engine when no files are given.
    pub fn log_source(&self, log_files: &[PathBuf]) -> Result<Box<dyn LogSource>> {
        if log_files.is_empty() {
            let http = HttpClient::from_settings(&self.settings, self.cancel.clone())?;
            Ok(Box::new(ElasticLogSource::from_settings(&self.settings, http)?))
        } else {
            Ok(Box::new(LocalLogSource::open(&self.settings.log_index, log_files)?))
        }
    }

    /// Gather one report for every organization in `orgs` and write its
    /// snapshot. The file is only written once every organization succeeded.
    ///
    /// The yellow report needs `logs` and only covers our own organization.
    pub fn gather_report(
        &self,
        kind: ReportKind,
        orgs: &[OrganizationConfig],
        end_date: FormattedDate,
        logs: Option<&dyn LogSource>,
    ) -> Result<(PathBuf, Vec<GatherOutcome>)> {
        let mut outcomes = Vec::with_capacity(orgs.len());
        for org in orgs {
            self.cancel.check()?;
            let outcome = match kind {
                ReportKind::Blue => self.package_managers(org, end_date)?,
                ReportKind::Green => self.github(org, end_date)?,
                ReportKind::Yellow => {
                    if !org.own_organization {
                        continue;
                    }
                    let logs = logs.ok_or_else(|| {
                        UsageError::InvalidArgument("the yellow report needs a log source".to_string())
                    })?;
                    self.user_agents(org, end_date, logs, GroupingLevel::Group)?
                }
            };
            outcomes.push(outcome);
        }

        let fetchers: Vec<Fetcher> = outcomes.iter().map(|o| o.fetcher.clone()).collect();
        let path = self.store.write(kind, end_date, &fetchers)?;
        Ok((path, outcomes))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Token shared by every request of this gatherer.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for Gatherer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Gatherer(snapshot_dir={}, log_index={}, github_token={}, cancelled={})",
            self.store.dir.display(),
            self.settings.log_index,
            self.settings.github_token.is_some(),
            self.cancel.is_cancelled()
        )
    }
}
