//! Per-indexer search pipeline
//!
//! A search against one indexer flows through:
//!
//! 1. [`RequestGenerator`] turns the [`SearchQuery`] into tiers of paged requests
//! 2. the pipeline fetches pages in order through a [`Fetcher`]
//! 3. [`ResponseParser`] turns each page into [`ReleaseInfo`] records
//! 4. the secondary-fetch resolver completes partial records from detail pages
//! 5. the result assembler filters, deduplicates, and returns a [`QueryResult`]
//!
//! Failures at any step are classified and recorded in the indexer's health
//! state; they never fail the search itself.

pub mod assemble;
pub mod categories;
pub mod classify;
pub mod definitions;
pub mod error;
pub mod fetch;
pub mod health;
pub mod manager;
pub mod pagination;
pub mod pipeline;
pub mod request;
pub mod resolver;
pub mod sanitize;
pub mod types;

pub use categories::{CategoryMapping, IndexerCategories, cats};
pub use error::IndexerError;
pub use fetch::{Fetcher, HttpFetcher, IndexerResponse};
pub use health::{InMemoryStatusStore, IndexerHealthState, IndexerStatus, IndexerStatusStore};
pub use manager::{IndexerManager, IndexerSearchResult};
pub use pipeline::{IndexerPipeline, PipelineConfig};
pub use request::{HttpAccept, IndexerRequest, PagedRequests, RequestChain};
pub use types::*;

/// Builds the request chain for a query
pub trait RequestGenerator: Send + Sync {
    /// Must not depend on anything but the query; an unsupported mode yields an empty chain
    fn generate(&self, query: &SearchQuery) -> RequestChain;
}

/// Turns one fetched page into release records
pub trait ResponseParser: Send + Sync {
    fn parse(&self, response: &IndexerResponse) -> Result<Vec<ReleaseInfo>, IndexerError>;
}

/// Site adapter contract
///
/// The pipeline depends only on this trait; concrete sites live in
/// [`definitions`].
pub trait IndexerDefinition: Send + Sync {
    /// Unique instance ID
    fn id(&self) -> &str;

    /// Display name
    fn name(&self) -> &str;

    /// Nominal records per full listing page; `1` means unknown
    fn page_size(&self) -> u32;

    fn capabilities(&self) -> &IndexerCapabilities;

    fn request_generator(&self) -> &dyn RequestGenerator;

    /// Listing page parser (records may be partial)
    fn parser(&self) -> &dyn ResponseParser;

    /// Detail page parser used to complete partial records
    fn detail_parser(&self) -> &dyn ResponseParser;

    /// Check if this indexer can handle a specific query
    fn can_handle_query(&self, query: &SearchQuery) -> bool {
        self.capabilities().supports(query.mode)
    }
}
