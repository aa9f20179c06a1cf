//! Blocking HTTP glue shared by every upstream source.
//!
//! Requests go through a [`Transport`] so sources can be exercised against
//! scripted responses. [`HttpClient`] adds the retry policy (429 and 502 are
//! retried with a fixed delay) and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde_json::Value;

use crate::config::{Settings, NO_OF_RETRIES, SECONDS_BEFORE_RETRY, USER_AGENT};
use crate::error::{Result, UsageError};

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub basic_auth: Option<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            basic_auth: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            body: Some(body),
            ..Self::get(url)
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add `Authorization: Bearer <token>` when a token is configured.
    pub fn bearer(self, token: Option<&str>) -> Self {
        match token {
            Some(token) => self.header("Authorization", format!("Bearer {token}")),
            None => self,
        }
    }

    pub fn basic_auth(mut self, user: Option<&str>, password: Option<&str>) -> Self {
        if let Some(user) = user {
            self.basic_auth = Some((user.to_string(), password.unwrap_or_default().to_string()));
        }
        self
    }
}

/// Status and body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Sends one request and returns whatever the server answered.
///
/// Non-2xx statuses are responses, not errors; only I/O-level failures
/// are reported as `Err`.
pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// [`Transport`] over a blocking `reqwest` client.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some((user, password)) = &request.basic_auth {
            builder = builder.basic_auth(user, Some(password));
        }

        let response = builder.send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(HttpResponse { status, body })
    }
}

// ---------------------------------------------------------------------------
// Retry policy and cancellation
// ---------------------------------------------------------------------------

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: NO_OF_RETRIES,
            delay: Duration::from_secs(SECONDS_BEFORE_RETRY),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts; used by tests and the local log source.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            delay: Duration::ZERO,
        }
    }
}

/// Shared abort signal: a manual flag plus an optional deadline.
///
/// Clones observe the same flag, so an orchestrator can hand one clone to a
/// gather run and cancel it from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that trips once `timeout` has elapsed from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.map(|d| Instant::now() >= d).unwrap_or(false)
    }

    /// `Err(Cancelled)` once the token has tripped.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(UsageError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, waking early (with `Err(Cancelled)`) if the
    /// token trips meanwhile.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        const SLICE: Duration = Duration::from_millis(100);
        let until = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= until {
                return Ok(());
            }
            thread::sleep(SLICE.min(until - now));
        }
    }
}

// ---------------------------------------------------------------------------
// HttpClient
// ---------------------------------------------------------------------------

/// Transport plus retry policy plus cancellation, as used by every source.
pub struct HttpClient {
    transport: Box<dyn Transport>,
    retry: RetryPolicy,
    cancel: CancellationToken,
    github_token: Option<String>,
    libraries_io_api_key: Option<String>,
}

impl HttpClient {
    pub fn new(transport: Box<dyn Transport>, retry: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            transport,
            retry,
            cancel,
            github_token: None,
            libraries_io_api_key: None,
        }
    }

    /// A `reqwest`-backed client configured from `settings`.
    pub fn from_settings(settings: &Settings, cancel: CancellationToken) -> Result<Self> {
        let transport = ReqwestTransport::new(settings.timeout)?;
        let retry = RetryPolicy {
            max_retries: settings.max_retries,
            delay: settings.retry_delay,
        };
        Ok(Self::new(Box::new(transport), retry, cancel).with_credentials(settings))
    }

    /// Copy the upstream credentials out of `settings`.
    pub fn with_credentials(mut self, settings: &Settings) -> Self {
        self.github_token = settings.github_token.clone();
        self.libraries_io_api_key = settings.libraries_io_api_key.clone();
        self
    }

    pub fn github_token(&self) -> Option<&str> {
        self.github_token.as_deref()
    }

    pub fn libraries_io_api_key(&self) -> Option<&str> {
        self.libraries_io_api_key.as_deref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Send `request`, retrying 429 and 502 answers.
    ///
    /// Returns the first non-transient response whatever its status. Once
    /// the retry budget is spent the last transient status escalates to
    /// [`UsageError::RetriesExhausted`].
    pub fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut attempt: u32 = 0;
        loop {
            self.cancel.check()?;
            attempt += 1;
            log::debug!("{:?} {} (attempt {})", request.method, request.url, attempt);

            let response = self.transport.send(request)?;
            if !UsageError::is_transient_status(response.status) {
                return Ok(response);
            }
            if attempt > self.retry.max_retries {
                return Err(UsageError::RetriesExhausted {
                    url: request.url.clone(),
                    status: response.status,
                    attempts: attempt,
                });
            }
            log::debug!(
                "{} answered {}, retrying in {:?}",
                request.url,
                response.status,
                self.retry.delay
            );
            self.cancel.sleep(self.retry.delay)?;
        }
    }

    /// Send and parse a 2xx JSON body; any other status is an error.
    pub fn get_json(&self, request: &HttpRequest) -> Result<Value> {
        let response = self.send(request)?;
        if !response.is_success() {
            return Err(UsageError::Upstream {
                url: request.url.clone(),
                status: response.status,
            });
        }
        response.json()
    }

    /// Like [`get_json`](Self::get_json), but statuses in `benign` yield
    /// `Ok(None)` so the caller can record missing data and move on.
    pub fn get_json_if_available(&self, request: &HttpRequest, benign: &[u16]) -> Result<Option<Value>> {
        let response = self.send(request)?;
        if benign.contains(&response.status) {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(UsageError::Upstream {
                url: request.url.clone(),
                status: response.status,
            });
        }
        response.json().map(Some)
    }

    /// Send and return a 2xx body as text.
    pub fn get_text(&self, request: &HttpRequest) -> Result<String> {
        let response = self.send(request)?;
        if !response.is_success() {
            return Err(UsageError::Upstream {
                url: request.url.clone(),
                status: response.status,
            });
        }
        Ok(response.body)
    }
}
