//! Application configuration management

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::indexer::definitions::divxtotal;
use crate::indexer::fetch::FetchConfig;
use crate::indexer::health::InMemoryStatusStore;
use crate::indexer::pipeline::PipelineConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP user agent sent to indexers
    pub user_agent: String,

    /// Fetch-boundary timeout
    pub request_timeout: Duration,

    /// Maximum requests per second per indexer
    pub requests_per_second: u32,

    /// Burst capacity per indexer
    pub burst_size: u32,

    /// Floor for rate-limit backoff
    pub min_backoff: Duration,

    /// Failure score at which an indexer should be disabled
    pub disable_threshold: u32,

    /// Hard cap on pages per paged sequence
    pub max_pages: u32,

    /// Concurrent secondary fetches per listing page
    pub detail_concurrency: usize,

    /// DivxTotal base URL (mirrors move often)
    pub divxtotal_base_url: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let min_backoff_secs: u64 = parse_or(&lookup, "INDEXER_MIN_BACKOFF_SECS", 3600)?;
        if min_backoff_secs == 0 {
            bail!("INDEXER_MIN_BACKOFF_SECS must be greater than zero");
        }

        Ok(Self {
            user_agent: lookup("INDEXER_USER_AGENT").unwrap_or_else(|| "Librarian/1.0".to_string()),

            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "INDEXER_REQUEST_TIMEOUT_SECS",
                30,
            )?),

            requests_per_second: parse_or(&lookup, "INDEXER_REQUESTS_PER_SECOND", 1)?,

            burst_size: parse_or(&lookup, "INDEXER_BURST_SIZE", 3)?,

            min_backoff: Duration::from_secs(min_backoff_secs),

            disable_threshold: parse_or(&lookup, "INDEXER_DISABLE_THRESHOLD", 10)?,

            max_pages: parse_or(&lookup, "INDEXER_MAX_PAGES", 100)?,

            detail_concurrency: parse_or(&lookup, "INDEXER_DETAIL_CONCURRENCY", 8)?,

            divxtotal_base_url: lookup("DIVXTOTAL_BASE_URL")
                .unwrap_or_else(|| divxtotal::DEFAULT_BASE_URL.to_string()),
        })
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            user_agent: self.user_agent.clone(),
            timeout: self.request_timeout,
            requests_per_second: self.requests_per_second,
            burst_size: self.burst_size,
        }
    }

    /// Status store that signals "should disable" at the configured threshold
    pub fn status_store(&self) -> InMemoryStatusStore {
        InMemoryStatusStore::new(self.disable_threshold)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            min_backoff: self.min_backoff,
            max_pages: self.max_pages,
            detail_concurrency: self.detail_concurrency,
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
