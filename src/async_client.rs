//! Async wrapper around [`Gatherer`] for use in async runtimes (Tokio, etc.).
//!
//! Gathers are long chains of blocking requests, so every operation runs on
//! the blocking thread pool via [`tokio::task::spawn_blocking`], keeping the
//! async event loop free. Cancelling the shared token aborts the running
//! gather at its next request or back-off.
//!
//! # Example
//!
//! ```no_run
//! use usage_analytics::{organization, AsyncGatherer, FormattedDate};
//!
//! #[tokio::main]
//! async fn main() {
//!     let gatherer = AsyncGatherer::builder().build().await.unwrap();
//!     let end = FormattedDate::parse("2024-05-14").unwrap();
//!
//!     let outcome = gatherer.github(organization::MULTIVERSX, end).await.unwrap();
//!     println!("{}", outcome.fetcher);
//! }
//! ```

use std::sync::{Arc, Mutex};

use crate::error::{Result, UsageError};
use crate::{CancellationToken, FormattedDate, GatherOutcome, Gatherer, GathererBuilder, OrganizationConfig};

// ---------------------------------------------------------------------------
// AsyncGathererBuilder
// ---------------------------------------------------------------------------

/// Builder for an [`AsyncGatherer`]; wraps a [`GathererBuilder`].
pub struct AsyncGathererBuilder {
    inner: GathererBuilder,
}

impl AsyncGathererBuilder {
    /// Configure the underlying synchronous builder.
    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: FnOnce(GathererBuilder) -> GathererBuilder,
    {
        self.inner = f(self.inner);
        self
    }

    /// Build on the blocking thread pool (creating the HTTP client and the
    /// snapshot directory may block).
    pub async fn build(self) -> Result<AsyncGatherer> {
        let inner = self.inner;
        tokio::task::spawn_blocking(move || {
            let gatherer = inner.build()?;
            let cancel = gatherer.cancellation().clone();
            Ok(AsyncGatherer {
                inner: Arc::new(Mutex::new(gatherer)),
                cancel,
            })
        })
        .await
        .map_err(|e| UsageError::InvalidArgument(format!("Task join error: {e}")))?
    }
}

// ---------------------------------------------------------------------------
// AsyncGatherer
// ---------------------------------------------------------------------------

/// Async wrapper around [`Gatherer`].
///
/// The gatherer is protected by a [`Mutex`], so gathers on one instance run
/// one after another, keeping requests to each upstream sequential.
pub struct AsyncGatherer {
    inner: Arc<Mutex<Gatherer>>,
    cancel: CancellationToken,
}

impl AsyncGatherer {
    pub fn builder() -> AsyncGathererBuilder {
        AsyncGathererBuilder {
            inner: Gatherer::builder(),
        }
    }

    /// Run a sync gatherer operation on the blocking thread pool.
    pub async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Gatherer) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let gatherer = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = gatherer
                .lock()
                .map_err(|_| UsageError::InvalidArgument("gatherer lock poisoned".into()))?;
            f(&guard)
        })
        .await
        .map_err(|e| UsageError::InvalidArgument(format!("Task join error: {e}")))?
    }

    pub async fn package_managers(&self, org: OrganizationConfig, end_date: FormattedDate) -> Result<GatherOutcome> {
        self.run(move |g| g.package_managers(&org, end_date)).await
    }

    pub async fn github(&self, org: OrganizationConfig, end_date: FormattedDate) -> Result<GatherOutcome> {
        self.run(move |g| g.github(&org, end_date)).await
    }

    /// Abort the running gather, if any, and every later one.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
