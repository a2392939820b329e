//! Per-indexer health tracking
//!
//! The pipeline reads and writes indexer health only through the
//! [`IndexerStatusStore`] trait, which is injected per pipeline. The
//! [`InMemoryStatusStore`] is the default implementation; a persistent store
//! can implement the same trait.
//!
//! State machine:
//!
//! ```text
//! Healthy --failure with backoff--> Backoff(until) --until passes--> Healthy
//! any state --disable()--> Disabled --enable()--> Healthy
//! ```

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Externally visible status of an indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexerStatus {
    Healthy,
    Backoff { until: DateTime<Utc> },
    Disabled,
}

/// Mutable health record of one indexer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerHealthState {
    pub indexer_id: String,
    pub backoff_until: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    /// Weighted failure count; connection failures weigh double
    pub failure_score: u32,
    pub last_failure: Option<DateTime<Utc>>,
    /// Set only by an administrative `disable`
    pub disabled: bool,
}

impl IndexerHealthState {
    pub fn new(indexer_id: &str) -> Self {
        Self {
            indexer_id: indexer_id.to_string(),
            backoff_until: None,
            consecutive_failures: 0,
            failure_score: 0,
            last_failure: None,
            disabled: false,
        }
    }

    /// Status as of `now`
    pub fn status_at(&self, now: DateTime<Utc>) -> IndexerStatus {
        if self.disabled {
            return IndexerStatus::Disabled;
        }
        match self.backoff_until {
            Some(until) if now < until => IndexerStatus::Backoff { until },
            _ => IndexerStatus::Healthy,
        }
    }

    fn reset(&mut self) {
        self.backoff_until = None;
        self.consecutive_failures = 0;
        self.failure_score = 0;
    }

    fn register_failure(&mut self, weight: u32, now: DateTime<Utc>) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.failure_score = self.failure_score.saturating_add(weight);
        self.last_failure = Some(now);
    }

    /// Extend the backoff window; it never moves backwards
    fn extend_backoff(&mut self, backoff: Duration, now: DateTime<Utc>) {
        if backoff.is_zero() {
            return;
        }
        let delta = chrono::Duration::from_std(backoff).unwrap_or(chrono::Duration::MAX);
        let until = now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.backoff_until = Some(match self.backoff_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
    }
}

/// Health/status collaborator
#[async_trait]
pub trait IndexerStatusStore: Send + Sync {
    /// Clear failures and any backoff
    async fn record_success(&self, indexer_id: &str) -> Result<IndexerHealthState>;

    /// Count a DNS/connection failure
    async fn record_connection_failure(&self, indexer_id: &str) -> Result<IndexerHealthState>;

    /// Count a failure, optionally backing the indexer off for `backoff`
    async fn record_failure(
        &self,
        indexer_id: &str,
        backoff: Option<Duration>,
    ) -> Result<IndexerHealthState>;

    async fn get_status(&self, indexer_id: &str) -> Result<IndexerStatus>;

    async fn state(&self, indexer_id: &str) -> Result<IndexerHealthState>;

    /// Whether accumulated failures have crossed the disable threshold
    async fn should_disable(&self, indexer_id: &str) -> Result<bool>;

    /// Administrative re-enable; also resets counters
    async fn enable(&self, indexer_id: &str) -> Result<()>;

    /// Administrative disable
    async fn disable(&self, indexer_id: &str) -> Result<()>;
}

/// Process-local status store keyed by indexer id
pub struct InMemoryStatusStore {
    states: RwLock<HashMap<String, IndexerHealthState>>,
    disable_threshold: u32,
}

impl Default for InMemoryStatusStore {
    fn default() -> Self {
        Self::new(10)
    }
}

impl InMemoryStatusStore {
    pub fn new(disable_threshold: u32) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            disable_threshold: disable_threshold.max(1),
        }
    }

    fn update<F>(&self, indexer_id: &str, f: F) -> IndexerHealthState
    where
        F: FnOnce(&mut IndexerHealthState, DateTime<Utc>),
    {
        let now = Utc::now();
        let mut states = self.states.write();
        let state = states
            .entry(indexer_id.to_string())
            .or_insert_with(|| IndexerHealthState::new(indexer_id));
        f(state, now);
        state.clone()
    }
}

#[async_trait]
impl IndexerStatusStore for InMemoryStatusStore {
    async fn record_success(&self, indexer_id: &str) -> Result<IndexerHealthState> {
        Ok(self.update(indexer_id, |state, _| state.reset()))
    }

    async fn record_connection_failure(&self, indexer_id: &str) -> Result<IndexerHealthState> {
        Ok(self.update(indexer_id, |state, now| state.register_failure(2, now)))
    }

    async fn record_failure(
        &self,
        indexer_id: &str,
        backoff: Option<Duration>,
    ) -> Result<IndexerHealthState> {
        Ok(self.update(indexer_id, |state, now| {
            state.register_failure(1, now);
            if let Some(backoff) = backoff {
                state.extend_backoff(backoff, now);
            }
        }))
    }

    async fn get_status(&self, indexer_id: &str) -> Result<IndexerStatus> {
        Ok(self
            .update(indexer_id, |_, _| {})
            .status_at(Utc::now()))
    }

    async fn state(&self, indexer_id: &str) -> Result<IndexerHealthState> {
        Ok(self.update(indexer_id, |_, _| {}))
    }

    async fn should_disable(&self, indexer_id: &str) -> Result<bool> {
        let states = self.states.read();
        Ok(states
            .get(indexer_id)
            .is_some_and(|s| s.failure_score >= self.disable_threshold))
    }

    async fn enable(&self, indexer_id: &str) -> Result<()> {
        self.update(indexer_id, |state, _| {
            state.disabled = false;
            state.reset();
        });
        Ok(())
    }

    async fn disable(&self, indexer_id: &str) -> Result<()> {
        self.update(indexer_id, |state, _| state.disabled = true);
        Ok(())
    }
}
