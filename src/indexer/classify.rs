//! Failure classifier
//!
//! Maps each [`IndexerError`] to a health-tracker update and to how far the
//! failure reaches: the whole search, or only the request that raised it.

use std::time::Duration;

use anyhow::Result;
use tracing::{error, warn};

use super::error::IndexerError;
use super::health::{IndexerHealthState, IndexerStatusStore};

/// Default rate-limit backoff floor
pub const MIN_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// Health-tracker update implied by a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthAction {
    /// Counts toward the disable threshold faster than a generic failure
    ConnectionFailure,
    Failure { backoff: Option<Duration> },
}

/// How far a failure reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    /// Abort the remaining pages and tiers of this search
    Fatal,
    /// Only the failing request is lost
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub action: HealthAction,
    pub scope: FailureScope,
    /// An external challenge solver is needed before this indexer can work
    pub requires_solver: bool,
}

impl Classification {
    pub fn is_fatal(&self) -> bool {
        self.scope == FailureScope::Fatal
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FailureClassifier {
    min_backoff: Duration,
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new(MIN_BACKOFF)
    }
}

impl FailureClassifier {
    /// `min_backoff` is the rate-limit floor; zero is raised to one second
    pub fn new(min_backoff: Duration) -> Self {
        Self {
            min_backoff: min_backoff.max(Duration::from_secs(1)),
        }
    }

    pub fn min_backoff(&self) -> Duration {
        self.min_backoff
    }

    pub fn classify(&self, err: &IndexerError) -> Classification {
        let (action, scope) = match err {
            IndexerError::Connection(_) => (HealthAction::ConnectionFailure, FailureScope::Fatal),
            // fatal as well: the backoff is already set and further requests would only extend it
            IndexerError::RateLimited { retry_after } => {
                let backoff = retry_after
                    .map(|d| d.max(self.min_backoff))
                    .unwrap_or(self.min_backoff);
                (
                    HealthAction::Failure {
                        backoff: Some(backoff),
                    },
                    FailureScope::Fatal,
                )
            }
            IndexerError::AuthRejected { .. } | IndexerError::BotProtection { .. } => {
                (HealthAction::Failure { backoff: None }, FailureScope::Fatal)
            }
            IndexerError::ServerUnavailable { .. }
            | IndexerError::UnexpectedStatus { .. }
            | IndexerError::Malformed(_)
            | IndexerError::Internal(_) => {
                (HealthAction::Failure { backoff: None }, FailureScope::Local)
            }
        };
        Classification {
            action,
            scope,
            requires_solver: matches!(err, IndexerError::BotProtection { .. }),
        }
    }

    /// Classify, log, and record the failure against the indexer's health state
    pub async fn apply(
        &self,
        store: &dyn IndexerStatusStore,
        indexer_id: &str,
        url: &str,
        err: &IndexerError,
    ) -> (Classification, Result<IndexerHealthState>) {
        let classification = self.classify(err);
        log_failure(indexer_id, url, err, &classification);

        let updated = match classification.action {
            HealthAction::ConnectionFailure => store.record_connection_failure(indexer_id).await,
            HealthAction::Failure { backoff } => store.record_failure(indexer_id, backoff).await,
        };
        (classification, updated)
    }
}

fn log_failure(indexer_id: &str, url: &str, err: &IndexerError, classification: &Classification) {
    match err {
        IndexerError::Connection(e) => warn!(
            indexer_id = %indexer_id, url = %url, error = %e,
            "Unable to connect to indexer, check DNS and that the site is reachable"
        ),
        IndexerError::ServerUnavailable { status: None } => warn!(
            indexer_id = %indexer_id, url = %url,
            "Indexer request timed out, server is currently unavailable"
        ),
        IndexerError::ServerUnavailable { status: Some(status) } => warn!(
            indexer_id = %indexer_id, url = %url, status = status,
            "Indexer server is currently unavailable"
        ),
        IndexerError::RateLimited { .. } => {
            let backoff_secs = match classification.action {
                HealthAction::Failure { backoff: Some(d) } => d.as_secs(),
                _ => 0,
            };
            warn!(
                indexer_id = %indexer_id, url = %url, backoff_secs = backoff_secs,
                "Request limit reached, indexer disabled for the backoff window"
            )
        }
        IndexerError::AuthRejected { status } => warn!(
            indexer_id = %indexer_id, url = %url, status = ?status,
            "Invalid credentials, check the indexer configuration"
        ),
        IndexerError::BotProtection { status } => error!(
            indexer_id = %indexer_id, url = %url, status = ?status,
            "Bot protection challenge detected, an external challenge solver may be required"
        ),
        IndexerError::UnexpectedStatus { status } => warn!(
            indexer_id = %indexer_id, url = %url, status = status,
            "Indexer returned an unexpected HTTP status"
        ),
        IndexerError::Malformed(e) => warn!(
            indexer_id = %indexer_id, url = %url, error = %e,
            "Unable to parse indexer response"
        ),
        IndexerError::Internal(e) => error!(
            indexer_id = %indexer_id, url = %url, error = %e,
            "Unexpected error while searching indexer"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::health::{InMemoryStatusStore, IndexerStatus};
    use assert_matches::assert_matches;

    #[test]
    fn test_rate_limit_floor() {
        let classifier = FailureClassifier::default();

        let zero = classifier.classify(&IndexerError::RateLimited {
            retry_after: Some(Duration::ZERO),
        });
        assert_eq!(zero.action, HealthAction::Failure { backoff: Some(MIN_BACKOFF) });

        let none = classifier.classify(&IndexerError::RateLimited { retry_after: None });
        assert_eq!(none.action, HealthAction::Failure { backoff: Some(MIN_BACKOFF) });

        let long = Duration::from_secs(90 * 60);
        let explicit = classifier.classify(&IndexerError::RateLimited {
            retry_after: Some(long),
        });
        assert_eq!(explicit.action, HealthAction::Failure { backoff: Some(long) });
        assert!(explicit.is_fatal());
    }

    #[test]
    fn test_fatal_vs_local() {
        let classifier = FailureClassifier::default();
        let fatal = [
            IndexerError::Connection("refused".into()),
            IndexerError::AuthRejected { status: Some(401) },
            IndexerError::BotProtection { status: Some(503) },
        ];
        for err in &fatal {
            assert!(classifier.classify(err).is_fatal(), "{err} should be fatal");
        }

        let local = [
            IndexerError::ServerUnavailable { status: Some(503) },
            IndexerError::ServerUnavailable { status: None },
            IndexerError::UnexpectedStatus { status: 404 },
            IndexerError::Malformed("no table".into()),
            IndexerError::Internal("boom".into()),
        ];
        for err in &local {
            let c = classifier.classify(err);
            assert_eq!(c.scope, FailureScope::Local, "{err} should be local");
            assert_eq!(c.action, HealthAction::Failure { backoff: None });
        }
    }

    #[test]
    fn test_auth_and_bot_protection_do_not_back_off() {
        let classifier = FailureClassifier::default();
        let auth = classifier.classify(&IndexerError::AuthRejected { status: Some(403) });
        assert_eq!(auth.action, HealthAction::Failure { backoff: None });
        assert!(!auth.requires_solver);

        let bot = classifier.classify(&IndexerError::BotProtection { status: None });
        assert_eq!(bot.action, HealthAction::Failure { backoff: None });
        assert!(bot.requires_solver);
    }

    #[test]
    fn test_connection_failure_action() {
        let classifier = FailureClassifier::default();
        let c = classifier.classify(&IndexerError::Connection("dns".into()));
        assert_eq!(c.action, HealthAction::ConnectionFailure);
    }

    #[tokio::test]
    async fn test_apply_updates_store() {
        let classifier = FailureClassifier::default();
        let store = InMemoryStatusStore::default();

        let (c, state) = classifier
            .apply(
                &store,
                "idx",
                "https://example.org/",
                &IndexerError::RateLimited {
                    retry_after: Some(Duration::ZERO),
                },
            )
            .await;
        assert!(c.is_fatal());
        let state = state.unwrap();
        assert_eq!(state.consecutive_failures, 1);
        assert_matches!(store.get_status("idx").await.unwrap(), IndexerStatus::Backoff { .. });
    }
}
