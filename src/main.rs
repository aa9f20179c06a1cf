//! `usage-gather`: gathers one or more usage reports and writes their snapshots.
//!
//! ```bash
//! usage-gather                          # every report, ending yesterday
//! usage-gather --date 2024-05-14 --report blue
//! usage-gather --week 19 --organization solana
//! usage-gather --report yellow --log-file access-2024-05.ndjson
//! ```
//!
//! Credentials and the snapshot directory come from the environment
//! (`JSON_FOLDER`, `MX_GITHUB_TOKEN`, `LIBRARIES_IO_API_KEY`, `LOG_URL`,
//! `INDEX_NAME`, `ELASTIC_SEARCH_USER`, `ELASTIC_SEARCH_PASSWORD`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, ValueEnum};

use usage_analytics::{organization, FormattedDate, Gatherer, LogSource, OrganizationConfig, ReportKind, Settings, UsageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportChoice {
    Blue,
    Green,
    Yellow,
    All,
}

impl ReportChoice {
    fn kinds(self) -> Vec<ReportKind> {
        match self {
            ReportChoice::Blue => vec![ReportKind::Blue],
            ReportChoice::Green => vec![ReportKind::Green],
            ReportChoice::Yellow => vec![ReportKind::Yellow],
            ReportChoice::All => ReportKind::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "usage-gather", version, about = "Gather package usage statistics into dated snapshots")]
struct Args {
    /// Last day of the gathered window (YYYY-MM-DD)
    #[arg(long, value_name = "YYYY-MM-DD")]
    date: Option<String>,

    /// ISO week of the current year; the window ends on its Sunday
    #[arg(long, value_name = "N")]
    week: Option<u32>,

    /// Which report to gather
    #[arg(long, value_enum, default_value = "all")]
    report: ReportChoice,

    /// Gather only this organization
    #[arg(long, value_name = "NAME")]
    organization: Option<String>,

    /// Local NDJSON access-log export for the yellow report (repeatable)
    #[arg(long = "log-file", value_name = "PATH")]
    log_files: Vec<PathBuf>,

    /// Abort the run after this many seconds
    #[arg(long, value_name = "S")]
    deadline_secs: Option<u64>,
}

/// Failure of one named stage of the run.
struct StageError {
    stage: String,
    error: UsageError,
}

trait Stage<T> {
    fn stage(self, stage: impl Into<String>) -> Result<T, StageError>;
}

impl<T> Stage<T> for usage_analytics::Result<T> {
    fn stage(self, stage: impl Into<String>) -> Result<T, StageError> {
        self.map_err(|error| StageError {
            stage: stage.into(),
            error,
        })
    }
}

fn main() -> ExitCode {
    let env = env_logger::Env::default().filter_or("RUST_LOG", "info");
    env_logger::Builder::from_env(env).format_module_path(false).init();

    let matches = Args::command().get_matches();
    let args = match Args::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(e) => e.exit(),
    };

    match run(&args, &matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(StageError { stage, error }) => {
            eprintln!("{stage} failed: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args, matches: &ArgMatches) -> Result<(), StageError> {
    let today = FormattedDate::now();
    let end_date = resolve_end_date(args, matches, today).stage("date validation")?;
    log::info!("Gathering up to {end_date} ({})", end_date.week_and_day());

    let orgs = selected_organizations(args).stage("organization lookup")?;

    let mut builder = Gatherer::builder().settings(Settings::from_env());
    if let Some(secs) = args.deadline_secs {
        builder = builder.deadline(Duration::from_secs(secs));
    }
    let gatherer = builder.build().stage("setup")?;
    log::debug!("{gatherer}");

    for kind in args.report.kinds() {
        let logs: Option<Box<dyn LogSource>> = if kind == ReportKind::Yellow && orgs.iter().any(|o| o.own_organization) {
            Some(gatherer.log_source(&args.log_files).stage("log source")?)
        } else {
            None
        };

        let (path, outcomes) = gatherer
            .gather_report(kind, &orgs, end_date, logs.as_deref())
            .stage(format!("{} report", kind.title()))?;
        for outcome in &outcomes {
            log::info!("{}", outcome.fetcher);
        }
        log::info!("{} report written to {}", kind.title(), path.display());
    }
    Ok(())
}

/// The later of `--date` / `--week` on the command line wins; without
/// either the window ends yesterday. Today and later are rejected.
fn resolve_end_date(args: &Args, matches: &ArgMatches, today: FormattedDate) -> usage_analytics::Result<FormattedDate> {
    let from_date = || args.date.as_deref().map(FormattedDate::parse).transpose();
    let from_week = || args.week.map(FormattedDate::from_iso_week).transpose();

    let chosen = match (matches.index_of("date"), matches.index_of("week")) {
        (Some(d), Some(w)) if w > d => from_week()?,
        (Some(_), _) => from_date()?,
        (None, Some(_)) => from_week()?,
        (None, None) => None,
    };

    match chosen {
        Some(date) if date >= today => Err(UsageError::InvalidArgument(format!(
            "{date} is not in the past (today is {today})"
        ))),
        Some(date) => Ok(date),
        None => Ok(today - 1),
    }
}

fn selected_organizations(args: &Args) -> usage_analytics::Result<Vec<OrganizationConfig>> {
    match &args.organization {
        Some(name) => Ok(vec![organization::lookup(name)?]),
        None => Ok(organization::gathered().collect()),
    }
}
