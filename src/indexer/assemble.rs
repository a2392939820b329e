//! Result assembler
//!
//! Applied once per search to everything the pipeline collected: category
//! filter, validity filter, indexer stamping, then a stable dedup.

use std::collections::HashSet;

use tracing::debug;

use super::categories::matches_filter;
use super::types::{QueryResult, ReleaseInfo, RequestDiagnostic, SearchQuery};

/// Whether the record's categories intersect the query's filter
pub fn category_matches(record: &ReleaseInfo, query: &SearchQuery) -> bool {
    matches_filter(&record.categories, &query.categories)
}

/// Listing-level filter: records whose categories are still unknown are kept
/// so their detail page can settle it
pub fn listing_category_matches(record: &ReleaseInfo, query: &SearchQuery) -> bool {
    record.categories.is_empty() || category_matches(record, query)
}

/// Required fields for a record to be returned
///
/// Automatic searches also need a size and at least one category; an
/// interactive caller confirms releases by hand and tolerates their absence.
pub fn is_valid(record: &ReleaseInfo, query: &SearchQuery) -> bool {
    if record.title.trim().is_empty() || record.is_partial() {
        return false;
    }
    if query.interactive {
        return true;
    }
    record.size.is_some() && !record.categories.is_empty()
}

/// Category and validity filters together
pub fn accepts(record: &ReleaseInfo, query: &SearchQuery) -> bool {
    category_matches(record, query) && is_valid(record, query)
}

pub struct ResultAssembler<'a> {
    pub indexer_id: &'a str,
    pub indexer_name: &'a str,
}

impl ResultAssembler<'_> {
    pub fn assemble(
        &self,
        records: Vec<ReleaseInfo>,
        diagnostics: Vec<RequestDiagnostic>,
        query: &SearchQuery,
    ) -> QueryResult {
        let raw = records.len();
        let mut seen = HashSet::new();
        let records: Vec<ReleaseInfo> = records
            .into_iter()
            .filter(|r| category_matches(r, query))
            .filter(|r| is_valid(r, query))
            .filter(|r| r.dedup_key().is_some_and(|key| seen.insert(key.to_string())))
            .map(|mut r| {
                r.indexer_id = Some(self.indexer_id.to_string());
                r.indexer_name = Some(self.indexer_name.to_string());
                r
            })
            .collect();

        debug!(
            indexer_id = %self.indexer_id,
            raw = raw,
            accepted = records.len(),
            "Assembled search results"
        );

        QueryResult {
            records,
            diagnostics,
            ..Default::default()
        }
    }
}
