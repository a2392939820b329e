//! Fetch collaborator
//!
//! [`Fetcher`] is the only way the pipeline talks to the network. Its errors
//! are already classified into [`IndexerError`] so the failure classifier works
//! on variants, never on error text. [`HttpFetcher`] is the production
//! implementation: a reqwest client paced by a governor rate limiter.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::{
    Client,
    header::{self, HeaderMap},
};
use tracing::debug;

use super::ResponseParser;
use super::classify::Classification;
use super::error::IndexerError;
use super::request::IndexerRequest;
use super::types::{ReleaseInfo, RequestDiagnostic, RequestOutcome};

/// A fetched page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerResponse {
    pub request: IndexerRequest,
    pub status: u16,
    pub content: String,
}

impl IndexerResponse {
    pub fn new(request: IndexerRequest, status: u16, content: impl Into<String>) -> Self {
        Self {
            request,
            status,
            content: content.into(),
        }
    }
}

/// Issues one request and returns the raw page or a classified error
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &IndexerRequest) -> Result<IndexerResponse, IndexerError>;
}

/// Settings for [`HttpFetcher`]
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout: Duration,
    /// Maximum requests per second
    pub requests_per_second: u32,
    /// Burst capacity (allows short bursts above the rate)
    pub burst_size: u32,
}

impl Default for FetchConfig {
    // Be conservative with indexers
    fn default() -> Self {
        Self {
            user_agent: "Librarian/1.0".to_string(),
            timeout: Duration::from_secs(30),
            requests_per_second: 1,
            burst_size: 3,
        }
    }
}

/// Rate-limited HTTP fetcher for one indexer
pub struct HttpFetcher {
    client: Client,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    name: String,
}

impl HttpFetcher {
    pub fn new(name: &str, config: &FetchConfig) -> Result<Self> {
        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN),
        )
        .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .cookie_store(true)
            .gzip(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            limiter: Arc::new(RateLimiter::direct(quota)),
            name: name.to_string(),
        })
    }

    /// Wait for a rate limit permit
    async fn wait_for_permit(&self) {
        self.limiter.until_ready().await;
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &IndexerRequest) -> Result<IndexerResponse, IndexerError> {
        self.wait_for_permit().await;
        debug!(client = %self.name, url = %request.url, page = request.page, "Making rate-limited GET request");

        let response = self
            .client
            .get(&request.url)
            .header(header::ACCEPT, request.accept.header_value())
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let content = response.text().await.map_err(classify_transport_error)?;

        if let Some(err) = classify_response(status, &headers, &content, Utc::now()) {
            return Err(err);
        }

        Ok(IndexerResponse::new(request.clone(), status, content))
    }
}

/// One page fetched and parsed, or the error that stopped it
#[derive(Debug)]
pub struct PageFetch {
    pub request: IndexerRequest,
    /// HTTP status, when a response (or a status-bearing error) was received
    pub status: Option<u16>,
    pub elapsed_ms: u64,
    pub result: Result<Vec<ReleaseInfo>, IndexerError>,
}

impl PageFetch {
    /// Diagnostic entry for this fetch; `classification` is set for failures
    pub fn diagnostic(
        &self,
        secondary: bool,
        classification: Option<&Classification>,
    ) -> RequestDiagnostic {
        let outcome = match &self.result {
            Ok(records) => RequestOutcome::Parsed {
                records: records.len(),
            },
            Err(e) => RequestOutcome::Failed {
                kind: e.kind().to_string(),
                message: e.to_string(),
                requires_solver: classification.is_some_and(|c| c.requires_solver),
            },
        };
        RequestDiagnostic {
            url: self.request.url.clone(),
            status: self.status,
            secondary,
            outcome,
            elapsed_ms: self.elapsed_ms,
        }
    }
}

/// Fetch `request` and run the page through `parser`
pub async fn fetch_and_parse(
    fetcher: &dyn Fetcher,
    parser: &dyn ResponseParser,
    request: IndexerRequest,
) -> PageFetch {
    let started = Instant::now();
    let (status, result) = match fetcher.fetch(&request).await {
        Ok(response) => (Some(response.status), parser.parse(&response)),
        Err(e) => (e.http_status(), Err(e)),
    };
    PageFetch {
        request,
        status,
        elapsed_ms: started.elapsed().as_millis() as u64,
        result,
    }
}

fn classify_transport_error(err: reqwest::Error) -> IndexerError {
    if err.is_timeout() {
        IndexerError::ServerUnavailable { status: None }
    } else if err.is_connect() {
        IndexerError::Connection(err.to_string())
    } else if let Some(status) = err.status() {
        IndexerError::UnexpectedStatus {
            status: status.as_u16(),
        }
    } else if err.is_decode() || err.is_body() {
        IndexerError::Malformed(err.to_string())
    } else {
        IndexerError::Internal(err.to_string())
    }
}

const CHALLENGE_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "challenge-platform",
    "cf_chl_opt",
    "<title>Just a moment...</title>",
    "Attention Required! | Cloudflare",
    "DDoS-Guard",
];

/// Whether a page body is an anti-bot challenge
pub fn is_challenge_page(body: &str) -> bool {
    CHALLENGE_MARKERS.iter().any(|m| body.contains(m))
}

/// Classify a response from its status, headers and body; `None` means success
pub fn classify_response(
    status: u16,
    headers: &HeaderMap,
    body: &str,
    now: DateTime<Utc>,
) -> Option<IndexerError> {
    let retry_after = headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_retry_after(v, now));
    let server = headers
        .get(header::SERVER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let err = classify_status(status, retry_after, body)?;
    if matches!(err, IndexerError::BotProtection { .. }) {
        debug!(status = status, server = %server, "Challenge page detected");
    }
    Some(err)
}

/// Map an HTTP status to a classified error; `None` means success
///
/// A 403 or 503 only counts as bot protection when the body is a challenge
/// page. Sites fronted by Cloudflare send `Server: cloudflare` on every
/// response, so the header alone proves nothing.
pub fn classify_status(
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
) -> Option<IndexerError> {
    match status {
        200..=299 => None,
        429 => Some(IndexerError::RateLimited { retry_after }),
        403 | 503 if is_challenge_page(body) => Some(IndexerError::BotProtection {
            status: Some(status),
        }),
        401 | 403 => Some(IndexerError::AuthRejected {
            status: Some(status),
        }),
        408 => Some(IndexerError::ServerUnavailable { status: None }),
        500..=599 => Some(IndexerError::ServerUnavailable {
            status: Some(status),
        }),
        _ => Some(IndexerError::UnexpectedStatus { status }),
    }
}

/// Parse a `Retry-After` header value (delta seconds or an HTTP date)
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
