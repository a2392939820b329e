//! Indexer definitions
//!
//! Each site adapter implements [`IndexerDefinition`](crate::indexer::IndexerDefinition):
//! a request generator, a listing parser, a detail parser and a capability
//! descriptor. The pipeline never depends on a concrete adapter type.
//!
//! # Adding a new indexer
//!
//! 1. Create a new file in this directory (e.g., `myindexer.rs`)
//! 2. Implement `RequestGenerator`, `ResponseParser` and `IndexerDefinition`
//! 3. Add it to the `AVAILABLE_INDEXERS` list and to [`create_definition`]

pub mod divxtotal;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use once_cell::sync::Lazy;

use super::IndexerDefinition;

/// Information about an available indexer type
#[derive(Debug, Clone)]
pub struct IndexerTypeInfo {
    /// Unique identifier for this indexer type (e.g., "divxtotal")
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    pub description: &'static str,
    /// Type: "private", "public", "semi-private"
    pub tracker_type: &'static str,
    /// Language code
    pub language: &'static str,
    /// Primary site URL
    pub site_link: &'static str,
}

/// List of all available native indexer types
pub static AVAILABLE_INDEXERS: Lazy<Vec<IndexerTypeInfo>> = Lazy::new(|| {
    vec![IndexerTypeInfo {
        id: "divxtotal",
        name: "DivxTotal",
        description: "DivxTotal is a SPANISH site for Movies, TV series and Software",
        tracker_type: "public",
        language: "es-ES",
        site_link: divxtotal::DEFAULT_BASE_URL,
    }]
});

/// Get information about all available indexer types
pub fn get_available_indexers() -> &'static [IndexerTypeInfo] {
    &AVAILABLE_INDEXERS
}

/// Get information about a specific indexer type
pub fn get_indexer_info(id: &str) -> Option<&'static IndexerTypeInfo> {
    AVAILABLE_INDEXERS.iter().find(|i| i.id == id)
}

/// Build an adapter instance of `indexer_type`
pub fn create_definition(
    indexer_type: &str,
    id: &str,
    name: &str,
    settings: &HashMap<String, String>,
) -> Result<Arc<dyn IndexerDefinition>> {
    let info = get_indexer_info(indexer_type)
        .ok_or_else(|| anyhow!("Unknown indexer type: {}", indexer_type))?;
    match info.id {
        "divxtotal" => Ok(Arc::new(divxtotal::DivxTotalIndexer::new(
            id.to_string(),
            name.to_string(),
            settings.get("base_url").cloned(),
        ))),
        // Add more indexer types here
        other => Err(anyhow!("Indexer type {} has no adapter", other)),
    }
}
