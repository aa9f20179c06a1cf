//! Per-upstream acquisition and the gather runs built on top of them.
//!
//! Every source module exposes pure payload-to-package mappings alongside
//! its request loop, so the mappings can be checked without a network.

pub mod crates;
pub mod github;
pub mod libraries_io;
pub mod logs;
pub mod npm;
pub mod pypi;

pub use logs::{ElasticLogSource, LocalLogSource, LogSource, USER_AGENT_FIELD};

use crate::date::{DateRange, FormattedDate};
use crate::error::Result;
use crate::fetcher::{Fetcher, GatherOutcome};
use crate::http::{CancellationToken, HttpClient};
use crate::organization::OrganizationConfig;
use crate::report::ReportKind;
use crate::user_agent::{group_user_agents, GroupingLevel};

/// npm, crates.io and PyPI packages over the 30 days ending on `end_date`.
pub fn gather_package_managers(
    org: &OrganizationConfig,
    end_date: FormattedDate,
    client: &HttpClient,
) -> Result<GatherOutcome> {
    let fetcher = Fetcher::for_window(org.name, end_date, ReportKind::Blue.window_days());
    log::info!(
        "{}: package managers {} - {}",
        org.name,
        fetcher.start_date(),
        fetcher.end_date()
    );
    let mut outcome = GatherOutcome::new(fetcher);
    npm::gather(client, org, &mut outcome)?;
    crates::gather(client, org, &mut outcome)?;
    pypi::gather(client, org, &mut outcome)?;
    outcome.log_summary();
    Ok(outcome)
}

/// Repositories over the 14 days ending on `end_date`.
pub fn gather_github(
    org: &OrganizationConfig,
    end_date: FormattedDate,
    client: &HttpClient,
) -> Result<GatherOutcome> {
    let fetcher = Fetcher::for_window(org.name, end_date, ReportKind::Green.window_days());
    log::info!(
        "{}: repositories {} - {}",
        org.name,
        fetcher.start_date(),
        fetcher.end_date()
    );
    let mut outcome = GatherOutcome::new(fetcher);
    github::gather(client, org, &mut outcome)?;
    outcome.log_summary();
    Ok(outcome)
}

/// User-agent groups over the 14 days ending on `end_date`, aggregated from
/// the access logs in `index`.
pub fn gather_user_agents(
    org: &OrganizationConfig,
    end_date: FormattedDate,
    logs: &dyn LogSource,
    index: &str,
    level: GroupingLevel,
    cancel: &CancellationToken,
) -> Result<GatherOutcome> {
    let range = DateRange::ending_on(end_date, ReportKind::Yellow.window_days());
    let mut outcome = GatherOutcome::new(Fetcher::for_window(
        org.name,
        end_date,
        ReportKind::Yellow.window_days(),
    ));

    cancel.check()?;
    let count = logs.count(index, &range)?;
    log::info!("Processing {} records from {} ({} - {})", count, index, range.start, range.end);

    cancel.check()?;
    let buckets = logs.aggregate(index, &range, USER_AGENT_FIELD)?;
    log::info!("{} distinct user agents", buckets.len());

    for package in group_user_agents(&buckets, level)? {
        outcome.fetcher.add_package(package)?;
    }
    Ok(outcome)
}
