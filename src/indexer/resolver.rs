//! Secondary-fetch resolver
//!
//! Records that come off a listing page without a download reference carry an
//! info URL pointing at a detail page. The resolver fetches each such page once
//! through the detail parser and replaces the partial record with whatever the
//! detail page yields (a series page may list many episodes).

use std::collections::VecDeque;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, warn};

use super::ResponseParser;
use super::classify::FailureClassifier;
use super::fetch::{Fetcher, PageFetch, fetch_and_parse};
use super::health::IndexerStatusStore;
use super::request::{HttpAccept, IndexerRequest};
use super::types::{ReleaseInfo, RequestDiagnostic};

/// Outcome of resolving one listing page
#[derive(Debug, Default)]
pub struct Resolution {
    /// Complete and resolved records, in listing order
    pub records: Vec<ReleaseInfo>,
    pub diagnostics: Vec<RequestDiagnostic>,
    /// Number of detail fetches that failed
    pub failures: usize,
    /// An indexer-fatal failure cut the page short
    pub fatal: bool,
}

pub struct SecondaryFetchResolver<'a> {
    pub fetcher: &'a dyn Fetcher,
    pub detail_parser: &'a dyn ResponseParser,
    pub classifier: &'a FailureClassifier,
    pub status: &'a dyn IndexerStatusStore,
    pub indexer_id: &'a str,
    /// Upper bound on concurrent detail fetches
    pub concurrency: usize,
}

struct DetailJob {
    position: usize,
    partial: ReleaseInfo,
    request: IndexerRequest,
}

impl SecondaryFetchResolver<'_> {
    pub async fn resolve(&self, records: Vec<ReleaseInfo>) -> Resolution {
        let mut slots: Vec<Option<Vec<ReleaseInfo>>> = Vec::with_capacity(records.len());
        let mut pending = VecDeque::new();

        for (position, record) in records.into_iter().enumerate() {
            if !record.is_partial() {
                slots.push(Some(vec![record]));
                continue;
            }
            slots.push(None);
            match record.info_url.clone().filter(|u| !u.trim().is_empty()) {
                Some(url) => pending.push_back(DetailJob {
                    position,
                    request: IndexerRequest::new(url, HttpAccept::Html),
                    partial: record,
                }),
                None => debug!(
                    indexer_id = %self.indexer_id,
                    title = %record.title,
                    "Dropping partial release without a detail URL"
                ),
            }
        }

        let mut resolution = Resolution::default();
        let limit = self.concurrency.max(1).min(pending.len());
        let mut in_flight = FuturesUnordered::new();
        for job in pending.drain(..limit) {
            in_flight.push(self.fetch_detail(job));
        }

        let mut diagnostics: Vec<Option<RequestDiagnostic>> = vec![None; slots.len()];
        while let Some((job, fetch)) = in_flight.next().await {
            let classification = match &fetch.result {
                Ok(_) => None,
                Err(err) => {
                    resolution.failures += 1;
                    let (classification, updated) = self
                        .classifier
                        .apply(self.status, self.indexer_id, &fetch.request.url, err)
                        .await;
                    if let Err(e) = updated {
                        warn!(indexer_id = %self.indexer_id, error = %e, "Failed to update indexer status");
                    }
                    Some(classification)
                }
            };
            diagnostics[job.position] = Some(fetch.diagnostic(true, classification.as_ref()));

            match classification {
                Some(classification) if classification.is_fatal() => {
                    resolution.fatal = true;
                    break;
                }
                Some(_) => {}
                None => {
                    let completed: Vec<ReleaseInfo> = fetch
                        .result
                        .unwrap_or_default()
                        .into_iter()
                        .map(|r| inherit_from_partial(r, &job.partial))
                        .collect();
                    debug!(
                        indexer_id = %self.indexer_id,
                        url = %fetch.request.url,
                        records = completed.len(),
                        "Resolved partial release"
                    );
                    slots[job.position] = Some(completed);
                }
            }
            if let Some(job) = pending.pop_front() {
                in_flight.push(self.fetch_detail(job));
            }
        }
        // dropping the stream cancels anything still in flight
        drop(in_flight);

        resolution.records = slots.into_iter().flatten().flatten().collect();
        resolution.diagnostics = diagnostics.into_iter().flatten().collect();
        resolution
    }

    async fn fetch_detail(&self, job: DetailJob) -> (DetailJob, PageFetch) {
        let fetch = fetch_and_parse(self.fetcher, self.detail_parser, job.request.clone()).await;
        (job, fetch)
    }
}

/// Fill fields the detail page left empty from the listing record
fn inherit_from_partial(mut record: ReleaseInfo, partial: &ReleaseInfo) -> ReleaseInfo {
    if record.categories.is_empty() {
        record.categories = partial.categories.clone();
    }
    if record.info_url.is_none() {
        record.info_url = partial.info_url.clone();
    }
    if record.title.trim().is_empty() {
        record.title = partial.title.clone();
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::error::IndexerError;
    use crate::indexer::fetch::IndexerResponse;
    use crate::indexer::health::InMemoryStatusStore;
    use crate::indexer::types::RequestOutcome;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Serves detail pages by URL; the body is the download link to emit
    struct DetailFetcher {
        pages: HashMap<String, Result<String, IndexerError>>,
    }

    #[async_trait]
    impl Fetcher for DetailFetcher {
        async fn fetch(&self, request: &IndexerRequest) -> Result<IndexerResponse, IndexerError> {
            if request.url.starts_with("slow") {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            match self.pages.get(&request.url) {
                Some(Ok(body)) => Ok(IndexerResponse::new(request.clone(), 200, body.clone())),
                Some(Err(e)) => Err(e.clone()),
                None => Err(IndexerError::UnexpectedStatus { status: 404 }),
            }
        }
    }

    /// One record per whitespace separated link in the body
    struct LinkParser;

    impl ResponseParser for LinkParser {
        fn parse(&self, response: &IndexerResponse) -> Result<Vec<ReleaseInfo>, IndexerError> {
            Ok(response
                .content
                .split_whitespace()
                .map(|link| {
                    let mut r = ReleaseInfo::new(String::new(), link.to_string(), Utc::now());
                    r.download_url = Some(link.to_string());
                    r
                })
                .collect())
        }
    }

    fn partial(title: &str, info: &str) -> ReleaseInfo {
        let mut r = ReleaseInfo::new(title.into(), info.into(), Utc::now());
        r.info_url = Some(info.into());
        r.categories = vec![5030];
        r
    }

    fn complete(title: &str) -> ReleaseInfo {
        let mut r = ReleaseInfo::new(title.into(), title.into(), Utc::now());
        r.download_url = Some(format!("https://example.org/{}.torrent", title));
        r
    }

    async fn run(
        fetcher: &DetailFetcher,
        store: &InMemoryStatusStore,
        records: Vec<ReleaseInfo>,
    ) -> Resolution {
        let classifier = FailureClassifier::default();
        let resolver = SecondaryFetchResolver {
            fetcher,
            detail_parser: &LinkParser,
            classifier: &classifier,
            status: store,
            indexer_id: "idx",
            concurrency: 4,
        };
        resolver.resolve(records).await
    }

    #[tokio::test]
    async fn test_resolves_in_listing_order() {
        let fetcher = DetailFetcher {
            pages: HashMap::from([
                ("d1".to_string(), Ok("e1 e2".to_string())),
                ("d2".to_string(), Ok("e3".to_string())),
            ]),
        };
        let store = InMemoryStatusStore::default();
        let resolution = run(
            &fetcher,
            &store,
            vec![partial("Show", "d1"), complete("movie"), partial("Other", "d2")],
        )
        .await;

        let guids: Vec<_> = resolution.records.iter().map(|r| r.guid.as_str()).collect();
        assert_eq!(guids, vec!["e1", "e2", "movie", "e3"]);
        // inherited from the listing record
        assert_eq!(resolution.records[0].title, "Show");
        assert_eq!(resolution.records[0].categories, vec![5030]);
        assert_eq!(resolution.diagnostics.len(), 2);
        assert!(!resolution.fatal);
    }

    #[tokio::test]
    async fn test_local_failure_drops_only_that_record() {
        let fetcher = DetailFetcher {
            pages: HashMap::from([
                ("d1".to_string(), Err(IndexerError::ServerUnavailable { status: Some(503) })),
                ("d2".to_string(), Ok("e2".to_string())),
            ]),
        };
        let store = InMemoryStatusStore::default();
        let resolution = run(
            &fetcher,
            &store,
            vec![partial("A", "d1"), partial("B", "d2"), complete("c")],
        )
        .await;

        let guids: Vec<_> = resolution.records.iter().map(|r| r.guid.as_str()).collect();
        assert_eq!(guids, vec!["e2", "c"]);
        assert_eq!(resolution.failures, 1);
        assert!(!resolution.fatal);
        assert_eq!(store.state("idx").await.unwrap().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_fatal_failure_stops_resolution() {
        let fetcher = DetailFetcher {
            pages: HashMap::from([(
                "d1".to_string(),
                Err(IndexerError::BotProtection { status: Some(403) }),
            )]),
        };
        let store = InMemoryStatusStore::default();
        let resolution = run(&fetcher, &store, vec![partial("A", "d1"), complete("c")]).await;

        assert!(resolution.fatal);
        assert_eq!(resolution.records.len(), 1);
        assert_eq!(resolution.records[0].guid, "c");
        assert_matches!(
            &resolution.diagnostics[0].outcome,
            RequestOutcome::Failed { kind, requires_solver: true, .. } if kind == "bot_protection"
        );
    }

    #[tokio::test]
    async fn test_diagnostics_follow_listing_order() {
        let fetcher = DetailFetcher {
            pages: HashMap::from([
                ("slow-d1".to_string(), Ok("e1".to_string())),
                ("d2".to_string(), Err(IndexerError::ServerUnavailable { status: Some(503) })),
                ("d3".to_string(), Ok("e3".to_string())),
            ]),
        };
        let store = InMemoryStatusStore::default();
        let resolution = run(
            &fetcher,
            &store,
            vec![partial("A", "slow-d1"), partial("B", "d2"), partial("C", "d3")],
        )
        .await;

        let urls: Vec<_> = resolution.diagnostics.iter().map(|d| d.url.as_str()).collect();
        assert_eq!(urls, vec!["slow-d1", "d2", "d3"]);
        assert_matches!(
            &resolution.diagnostics[1].outcome,
            RequestOutcome::Failed { requires_solver: false, .. }
        );
        let guids: Vec<_> = resolution.records.iter().map(|r| r.guid.as_str()).collect();
        assert_eq!(guids, vec!["e1", "e3"]);
    }

    #[tokio::test]
    async fn test_partial_without_info_url_is_dropped() {
        let fetcher = DetailFetcher {
            pages: HashMap::new(),
        };
        let store = InMemoryStatusStore::default();
        let mut orphan = partial("A", "x");
        orphan.info_url = None;
        let resolution = run(&fetcher, &store, vec![orphan]).await;
        assert!(resolution.records.is_empty());
        assert!(resolution.diagnostics.is_empty());
    }
}
