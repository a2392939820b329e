//! Per-indexer query pipeline
//!
//! [`IndexerPipeline::search`] runs one search against one indexer:
//!
//! - checks the indexer's health first and skips it while backed off or disabled
//! - walks the request chain tier by tier, stopping at the first tier that
//!   yields an accepted record
//! - within a tier walks each paged sequence strictly in order until a page is
//!   not full
//! - completes partial records through the secondary-fetch resolver
//! - hands everything to the result assembler
//!
//! Failures are classified and recorded in the status store; `search` itself
//! never returns an error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::assemble::{ResultAssembler, accepts, listing_category_matches};
use super::classify::{FailureClassifier, MIN_BACKOFF};
use super::fetch::{Fetcher, fetch_and_parse};
use super::health::{IndexerStatus, IndexerStatusStore};
use super::pagination::{PageOutcome, PaginationController, advance_to_next_tier};
use super::request::PagedRequests;
use super::resolver::SecondaryFetchResolver;
use super::types::{QueryResult, ReleaseInfo, RequestDiagnostic, SearchQuery, SkipReason};
use super::IndexerDefinition;

/// Tunables for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Floor applied to every rate-limit backoff
    pub min_backoff: Duration,
    /// Hard cap on pages per sequence
    pub max_pages: u32,
    /// Upper bound on concurrent secondary fetches per page
    pub detail_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_backoff: MIN_BACKOFF,
            max_pages: 100,
            detail_concurrency: 8,
        }
    }
}

/// One indexer's search pipeline with its injected collaborators
#[derive(Clone)]
pub struct IndexerPipeline {
    definition: Arc<dyn IndexerDefinition>,
    fetcher: Arc<dyn Fetcher>,
    status: Arc<dyn IndexerStatusStore>,
    classifier: FailureClassifier,
    config: PipelineConfig,
}

/// Mutable bookkeeping for one `search` call
#[derive(Default)]
struct SearchRun {
    records: Vec<ReleaseInfo>,
    diagnostics: Vec<RequestDiagnostic>,
    failures: usize,
    aborted: bool,
}

impl IndexerPipeline {
    pub fn new(
        definition: Arc<dyn IndexerDefinition>,
        fetcher: Arc<dyn Fetcher>,
        status: Arc<dyn IndexerStatusStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            definition,
            fetcher,
            status,
            classifier: FailureClassifier::new(config.min_backoff),
            config,
        }
    }

    pub fn id(&self) -> &str {
        self.definition.id()
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn definition(&self) -> &Arc<dyn IndexerDefinition> {
        &self.definition
    }

    pub fn status_store(&self) -> &Arc<dyn IndexerStatusStore> {
        &self.status
    }

    /// Run `query` against this indexer and return whatever could be collected
    pub async fn search(&self, query: &SearchQuery) -> QueryResult {
        let indexer_id = self.definition.id();
        let started = Instant::now();

        match self.status.get_status(indexer_id).await {
            Ok(IndexerStatus::Healthy) => {}
            Ok(IndexerStatus::Backoff { until }) => {
                info!(indexer_id = %indexer_id, until = %until, "Indexer is backing off, skipping search");
                return QueryResult::skipped(SkipReason::Backoff { until });
            }
            Ok(IndexerStatus::Disabled) => {
                info!(indexer_id = %indexer_id, "Indexer is disabled, skipping search");
                return QueryResult::skipped(SkipReason::Disabled);
            }
            Err(e) => {
                warn!(indexer_id = %indexer_id, error = %e, "Unable to read indexer status, searching anyway");
            }
        }

        let chain = self.definition.request_generator().generate(query);
        if chain.is_empty() {
            debug!(indexer_id = %indexer_id, mode = %query.mode, "No requests for this search mode");
            return QueryResult::skipped(SkipReason::Unsupported);
        }

        let mut run = SearchRun::default();
        for (tier_index, tier) in chain.into_tiers().into_iter().enumerate() {
            let mut accepted = 0;
            for sequence in tier {
                let outcome = self.drive_sequence(sequence, query, &mut run, &mut accepted).await;
                if outcome == PageOutcome::Abort {
                    run.aborted = true;
                    break;
                }
            }
            debug!(indexer_id = %indexer_id, tier = tier_index, accepted = accepted, "Tier finished");
            if run.aborted || !advance_to_next_tier(accepted) {
                break;
            }
        }

        let assembler = ResultAssembler {
            indexer_id,
            indexer_name: self.definition.name(),
        };
        let mut result = assembler.assemble(run.records, run.diagnostics, query);

        if run.failures == 0 {
            if let Err(e) = self.status.record_success(indexer_id).await {
                warn!(indexer_id = %indexer_id, error = %e, "Failed to record indexer success");
            }
        }
        result.should_disable = match self.status.should_disable(indexer_id).await {
            Ok(flag) => flag,
            Err(e) => {
                warn!(indexer_id = %indexer_id, error = %e, "Unable to read indexer disable signal");
                false
            }
        };
        if result.should_disable {
            warn!(
                indexer_id = %indexer_id,
                failures = run.failures,
                "Indexer keeps failing and should be disabled"
            );
        }

        info!(
            indexer_id = %indexer_id,
            indexer_name = %self.definition.name(),
            records = result.records.len(),
            requests = result.diagnostics.len(),
            failures = run.failures,
            aborted = run.aborted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Indexer search finished"
        );
        result
    }

    /// Fetch one paged sequence until the controller says stop
    async fn drive_sequence(
        &self,
        sequence: PagedRequests,
        query: &SearchQuery,
        run: &mut SearchRun,
        accepted: &mut usize,
    ) -> PageOutcome {
        let indexer_id = self.definition.id();
        let mut controller =
            PaginationController::new(self.definition.page_size(), self.config.max_pages);

        for request in sequence {
            let page = request.page;
            let fetch = fetch_and_parse(
                self.fetcher.as_ref(),
                self.definition.parser(),
                request,
            )
            .await;
            if let Err(err) = &fetch.result {
                run.failures += 1;
                let (classification, updated) = self
                    .classifier
                    .apply(self.status.as_ref(), indexer_id, &fetch.request.url, err)
                    .await;
                if let Err(e) = updated {
                    warn!(indexer_id = %indexer_id, error = %e, "Failed to update indexer status");
                }
                run.diagnostics.push(fetch.diagnostic(false, Some(&classification)));
                return controller.after_failure(&classification);
            }
            run.diagnostics.push(fetch.diagnostic(false, None));
            let records = fetch.result.unwrap_or_default();

            let raw_count = records.len();
            debug!(indexer_id = %indexer_id, url = %fetch.request.url, page = page, records = raw_count, "Parsed page");

            let candidates: Vec<ReleaseInfo> = records
                .into_iter()
                .filter(|r| listing_category_matches(r, query))
                .collect();

            let resolver = SecondaryFetchResolver {
                fetcher: self.fetcher.as_ref(),
                detail_parser: self.definition.detail_parser(),
                classifier: &self.classifier,
                status: self.status.as_ref(),
                indexer_id,
                concurrency: self.config.detail_concurrency,
            };
            let resolution = resolver.resolve(candidates).await;

            run.failures += resolution.failures;
            run.diagnostics.extend(resolution.diagnostics);
            *accepted += resolution.records.iter().filter(|r| accepts(r, query)).count();
            run.records.extend(resolution.records);

            if resolution.fatal {
                return PageOutcome::Abort;
            }
            match controller.after_page(raw_count) {
                PageOutcome::Continue => continue,
                outcome => return outcome,
            }
        }

        PageOutcome::Stop
    }
}
