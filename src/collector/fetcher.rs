//! Fetch engine
//!
//! Issues one GET per target under a bounded-concurrency session and applies a
//! per-failure-class retry policy:
//! - TLS/certificate failure: retry once with verification disabled
//! - Connection failure on an `http` URL: retry once over `https`
//! - Malformed URL, timeout, anything else: no retry, the target is `Failed`
//!
//! Every obtained response passes through the [`ResponseFilter`]. Every input
//! index yields exactly one [`FetchOutcome`].

use async_trait::async_trait;
use indicatif::ProgressBar;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

use super::encoding::decode_body;
use super::filter::ResponseFilter;
use super::types::{FetchOutcome, FetchStatus, FetchTarget, RawResponse};
use crate::config::CollectorConfig;
use crate::util::truncate_for_log;

/// Sent with every request so redirects complete before the response closes
const ACCEPT_HEADER: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.9";

/// Failure classes of a single fetch attempt
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("TLS error: {0}")]
    Tls(String),
    #[error("Connection error: {0}")]
    Connect(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Timeout after {0:?}")]
    Timeout(Duration),
    #[error("Request failed: {0}")]
    Other(String),
}

impl TransportError {
    /// Classify a reqwest error by walking its source chain.
    ///
    /// Only the causes are inspected. The top-level message embeds the
    /// request URL, which may itself contain words like "ssl".
    pub fn classify(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return Self::Timeout(timeout);
        }
        if err.is_builder() {
            return Self::InvalidUrl(err.to_string());
        }

        let causes = source_chain(err);
        let message = if causes.is_empty() {
            err.to_string()
        } else {
            format!("{}: {}", err, causes)
        };
        Self::from_causes(&causes, err.is_connect(), message)
    }

    /// Classify from the text of an error's causes.
    fn from_causes(causes: &str, is_connect: bool, message: String) -> Self {
        let lowered = causes.to_ascii_lowercase();
        if ["certificate", "tls", "ssl", "handshake"]
            .iter()
            .any(|needle| lowered.contains(needle))
        {
            return Self::Tls(message);
        }
        if is_connect || lowered.contains("connection reset") || lowered.contains("connection closed") {
            return Self::Connect(message);
        }
        Self::Other(message)
    }
}

/// The `source()` chain below `err`, joined; excludes `err` itself
fn source_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = Vec::new();
    let mut source = err.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

/// One GET attempt against the network
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch `url`. With `verify_tls == false` certificate validation is skipped.
    async fn get(&self, url: &Url, verify_tls: bool) -> Result<RawResponse, TransportError>;
}

/// The remediation applied after a failed first attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Remediation {
    /// Same URL, certificate verification disabled
    DisableVerification,
    /// Same URL with the scheme upgraded to `https`
    UpgradeScheme(Url),
}

/// Decide whether a failed attempt gets exactly one retry, and how.
pub fn remediation(error: &TransportError, url: &Url) -> Option<Remediation> {
    match error {
        TransportError::Tls(_) => Some(Remediation::DisableVerification),
        TransportError::Connect(_) if url.scheme() == "http" => {
            let mut upgraded = url.clone();
            upgraded.set_scheme("https").ok()?;
            Some(Remediation::UpgradeScheme(upgraded))
        }
        _ => None,
    }
}

/// `raw` with `https://` prepended unless it already starts with a
/// `scheme://` prefix.
///
/// `httpbin.org/get` has no scheme and becomes `https://httpbin.org/get`;
/// `HTTP://a.example` and `ftp://a.example` are left alone.
pub fn with_default_scheme(raw: &str) -> String {
    let has_scheme = raw.split_once("://").is_some_and(|(scheme, _)| {
        let mut chars = scheme.chars();
        chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    });
    if has_scheme {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    }
}

/// Normalize an input URL before dispatch.
///
/// Prepends `https://` when the URL lacks a scheme and strips a trailing
/// `.json` artifact inherited from upstream data.
pub fn normalize_url(raw: &str) -> Result<Url, TransportError> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix(".json").unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(TransportError::InvalidUrl("empty URL".to_string()));
    }
    let url = Url::parse(&with_default_scheme(trimmed)).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(TransportError::InvalidUrl(raw.to_string())),
    }
}

/// reqwest-backed transport with a verifying and a non-verifying client
pub struct ReqwestTransport {
    secure: reqwest::Client,
    insecure: reqwest::Client,
    user_agents: Vec<String>,
    max_body_bytes: usize,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(config: &CollectorConfig) -> Result<Self, TransportError> {
        let build = |verify: bool| {
            reqwest::Client::builder()
                .timeout(config.fetch_timeout())
                .connect_timeout(Duration::from_secs(30))
                .redirect(reqwest::redirect::Policy::limited(10))
                .pool_max_idle_per_host(config.concurrency)
                .danger_accept_invalid_certs(!verify)
                .gzip(true)
                .brotli(true)
                .build()
                .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {}", e)))
        };

        Ok(Self {
            secure: build(true)?,
            insecure: build(false)?,
            user_agents: config.user_agents.clone(),
            max_body_bytes: config.max_body_bytes,
            timeout: config.fetch_timeout(),
        })
    }

    fn user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(crate::config::DEFAULT_USER_AGENTS[0])
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &Url, verify_tls: bool) -> Result<RawResponse, TransportError> {
        let client = if verify_tls { &self.secure } else { &self.insecure };
        let mut response = client
            .get(url.as_str())
            .header(reqwest::header::USER_AGENT, self.user_agent())
            .header(reqwest::header::ACCEPT, ACCEPT_HEADER)
            .send()
            .await
            .map_err(|e| TransportError::classify(&e, self.timeout))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let declared_length = response.content_length();

        // Oversized by declaration: never read the body
        if declared_length.is_some_and(|len| len > self.max_body_bytes as u64) {
            return Ok(RawResponse {
                status,
                content_type,
                declared_length,
                body: None,
            });
        }

        // Stop reading one chunk past the cap; the filter discards what remains
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| TransportError::classify(&e, self.timeout))?
        {
            body.extend_from_slice(&chunk);
            if body.len() > self.max_body_bytes {
                break;
            }
        }

        Ok(RawResponse {
            status,
            content_type,
            declared_length,
            body: Some(body.into()),
        })
    }
}

/// Fetch counters, updated lock-free from concurrent tasks
#[derive(Debug, Default)]
pub struct FetchStats {
    pub ok: AtomicU64,
    pub discarded: AtomicU64,
    pub failed: AtomicU64,
    pub tls_retries: AtomicU64,
    pub scheme_retries: AtomicU64,
}

impl FetchStats {
    fn record(&self, status: FetchStatus) {
        let counter = match status {
            FetchStatus::Ok => &self.ok,
            FetchStatus::Discarded => &self.discarded,
            FetchStatus::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// (ok, discarded, failed)
    pub fn totals(&self) -> (u64, u64, u64) {
        (
            self.ok.load(Ordering::Relaxed),
            self.discarded.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
        )
    }
}

/// Bounded-concurrency fetch engine
pub struct FetchEngine {
    transport: Arc<dyn Transport>,
    filter: ResponseFilter,
    concurrency: usize,
    timeout: Duration,
    stats: FetchStats,
}

impl FetchEngine {
    pub fn new(transport: Arc<dyn Transport>, config: &CollectorConfig) -> Self {
        Self {
            transport,
            filter: ResponseFilter::new(config.max_body_bytes),
            concurrency: config.concurrency.max(1),
            timeout: config.fetch_timeout(),
            stats: FetchStats::default(),
        }
    }

    pub fn stats(&self) -> &FetchStats {
        &self.stats
    }

    /// Fetch every target with at most `concurrency` requests in flight.
    ///
    /// Outcomes arrive in completion order, each tagged with its index. If a
    /// fetch task dies, its index is filled in as `Failed`.
    pub async fn fetch_all(
        self: &Arc<Self>,
        targets: &[FetchTarget],
        progress: &ProgressBar,
    ) -> Vec<FetchOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for target in targets.iter().cloned() {
            let engine = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                engine.fetch_one(&target).await
            });
        }

        let mut outcomes = Vec::with_capacity(targets.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!("Fetch task failed: {}", e),
            }
            progress.inc(1);
        }

        if outcomes.len() < targets.len() {
            let seen: HashSet<usize> = outcomes.iter().map(|o| o.index).collect();
            for target in targets.iter().filter(|t| !seen.contains(&t.index)) {
                tracing::warn!("No fetch outcome for index {}, marking failed", target.index);
                self.stats.record(FetchStatus::Failed);
                outcomes.push(FetchOutcome::failed(target, normalize_url(&target.url).ok()));
            }
        }

        outcomes
    }

    /// Fetch one target, applying the retry policy and the response filter.
    pub async fn fetch_one(&self, target: &FetchTarget) -> FetchOutcome {
        let url = match normalize_url(&target.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("{}", e);
                self.stats.record(FetchStatus::Failed);
                return FetchOutcome::failed(target, None);
            }
        };

        let response = match self.attempt(&url, true).await {
            Ok(response) => Some(response),
            Err(err) => self.retry(&url, err).await,
        };

        let outcome = self.build_outcome(target, url, self.filter.apply(response));
        self.stats.record(outcome.status);
        outcome
    }

    async fn retry(&self, url: &Url, err: TransportError) -> Option<RawResponse> {
        let result = match remediation(&err, url) {
            Some(Remediation::DisableVerification) => {
                tracing::debug!("{} for {}, retrying without certificate verification", err, url);
                self.stats.tls_retries.fetch_add(1, Ordering::Relaxed);
                self.attempt(url, false).await
            }
            Some(Remediation::UpgradeScheme(upgraded)) => {
                tracing::debug!("{} for {}, retrying as {}", err, url, upgraded);
                self.stats.scheme_retries.fetch_add(1, Ordering::Relaxed);
                self.attempt(&upgraded, true).await
            }
            None => Err(err),
        };

        result
            .map_err(|e| tracing::debug!("Fetch failed for {}: {}", url, truncate_for_log(&e.to_string(), 200)))
            .ok()
    }

    /// One attempt, bounded by the per-attempt timeout regardless of transport
    async fn attempt(&self, url: &Url, verify_tls: bool) -> Result<RawResponse, TransportError> {
        match tokio::time::timeout(self.timeout, self.transport.get(url, verify_tls)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        }
    }

    fn build_outcome(
        &self,
        target: &FetchTarget,
        url: Url,
        response: Option<RawResponse>,
    ) -> FetchOutcome {
        let Some(response) = response else {
            return FetchOutcome::failed(target, Some(url));
        };

        let (status, body) = match &response.body {
            Some(bytes) => (
                FetchStatus::Ok,
                Some(decode_body(response.content_type.as_deref(), bytes)),
            ),
            None => (FetchStatus::Discarded, None),
        };

        FetchOutcome {
            index: target.index,
            url: target.url.clone(),
            resolved_url: Some(url),
            status,
            http_status: i32::from(response.status),
            content_type: response.content_type,
            body,
            rendered_html: None,
        }
    }
}
