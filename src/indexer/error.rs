//! Classified indexer errors
//!
//! Every failure a fetch or parse step can raise is one of these variants, so
//! the failure classifier never has to inspect error text.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexerError {
    /// DNS resolution or TCP/TLS connection failure
    #[error("connection failed: {0}")]
    Connection(String),

    /// HTTP 5xx, or a timeout when `status` is `None`
    #[error("server unavailable{}", fmt_status(.status))]
    ServerUnavailable { status: Option<u16> },

    /// HTTP 429 or an explicit request-limit signal
    #[error("rate limited{}", fmt_retry_after(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// Credentials rejected
    #[error("authentication rejected{}", fmt_status(.status))]
    AuthRejected { status: Option<u16> },

    /// Anti-bot challenge page (e.g. Cloudflare)
    #[error("bot protection challenge detected{}", fmt_status(.status))]
    BotProtection { status: Option<u16> },

    /// Any other non-success HTTP status
    #[error("unexpected HTTP status {status}")]
    UnexpectedStatus { status: u16 },

    /// Response could not be parsed
    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

fn fmt_retry_after(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {}s)", d.as_secs()))
        .unwrap_or_default()
}

impl IndexerError {
    /// HTTP status associated with the failure, if one was received
    pub fn http_status(&self) -> Option<u16> {
        match self {
            IndexerError::ServerUnavailable { status }
            | IndexerError::AuthRejected { status }
            | IndexerError::BotProtection { status } => *status,
            IndexerError::RateLimited { .. } => Some(429),
            IndexerError::UnexpectedStatus { status } => Some(*status),
            IndexerError::Connection(_) | IndexerError::Malformed(_) | IndexerError::Internal(_) => {
                None
            }
        }
    }

    /// Stable short name used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            IndexerError::Connection(_) => "connection",
            IndexerError::ServerUnavailable { status: None } => "timeout",
            IndexerError::ServerUnavailable { .. } => "server_unavailable",
            IndexerError::RateLimited { .. } => "rate_limited",
            IndexerError::AuthRejected { .. } => "auth_rejected",
            IndexerError::BotProtection { .. } => "bot_protection",
            IndexerError::UnexpectedStatus { .. } => "unexpected_status",
            IndexerError::Malformed(_) => "malformed",
            IndexerError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            IndexerError::ServerUnavailable { status: Some(503) }.to_string(),
            "server unavailable (HTTP 503)"
        );
        assert_eq!(
            IndexerError::ServerUnavailable { status: None }.to_string(),
            "server unavailable"
        );
        assert_eq!(
            IndexerError::RateLimited {
                retry_after: Some(Duration::from_secs(90))
            }
            .to_string(),
            "rate limited (retry after 90s)"
        );
    }

    #[test]
    fn test_http_status_and_kind() {
        let err = IndexerError::RateLimited { retry_after: None };
        assert_eq!(err.http_status(), Some(429));
        assert_eq!(err.kind(), "rate_limited");

        let timeout = IndexerError::ServerUnavailable { status: None };
        assert_eq!(timeout.http_status(), None);
        assert_eq!(timeout.kind(), "timeout");

        let conn = IndexerError::Connection("dns".into());
        assert_eq!(conn.http_status(), None);
        assert_eq!(conn.kind(), "connection");
    }
}
