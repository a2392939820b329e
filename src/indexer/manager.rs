//! Indexer Manager
//!
//! The IndexerManager is responsible for:
//! - Holding the loaded indexer pipelines
//! - Building pipelines from indexer definitions with shared collaborators
//! - Fanning a search out to every selected indexer concurrently
//!
//! Pipelines share nothing but the status store, and each only touches its
//! own indexer's entry in it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use parking_lot::RwLock;
use serde::Serialize;

use super::definitions;
use super::fetch::Fetcher;
use super::health::IndexerStatusStore;
use super::pipeline::{IndexerPipeline, PipelineConfig};
use super::types::{QueryResult, SearchQuery};

/// Search results from one indexer
#[derive(Debug, Clone, Serialize)]
pub struct IndexerSearchResult {
    pub indexer_id: String,
    pub indexer_name: String,
    pub result: QueryResult,
    /// Time taken for the search (ms)
    pub elapsed_ms: u64,
}

/// Manages all configured indexer pipelines
pub struct IndexerManager {
    /// Loaded pipelines by indexer ID
    pipelines: RwLock<HashMap<String, IndexerPipeline>>,
    /// Health store shared by every pipeline
    status: Arc<dyn IndexerStatusStore>,
    config: PipelineConfig,
}

impl IndexerManager {
    pub fn new(status: Arc<dyn IndexerStatusStore>, config: PipelineConfig) -> Self {
        Self {
            pipelines: RwLock::new(HashMap::new()),
            status,
            config,
        }
    }

    pub fn status_store(&self) -> &Arc<dyn IndexerStatusStore> {
        &self.status
    }

    /// Create and register a pipeline for an indexer of `indexer_type`
    pub fn load_indexer(
        &self,
        indexer_type: &str,
        id: &str,
        name: &str,
        settings: &HashMap<String, String>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<()> {
        let definition = definitions::create_definition(indexer_type, id, name, settings)?;
        let pipeline =
            IndexerPipeline::new(definition, fetcher, self.status.clone(), self.config.clone());
        self.register(pipeline);

        tracing::info!(
            indexer_id = %id,
            indexer_name = %name,
            indexer_type = %indexer_type,
            "Loaded indexer"
        );
        Ok(())
    }

    /// Register a prebuilt pipeline, replacing any with the same ID
    pub fn register(&self, pipeline: IndexerPipeline) {
        self.pipelines
            .write()
            .insert(pipeline.id().to_string(), pipeline);
    }

    /// Unload an indexer
    pub fn unload_indexer(&self, id: &str) {
        self.pipelines.write().remove(id);
    }

    /// Get a loaded pipeline by indexer ID
    pub fn get(&self, id: &str) -> Option<IndexerPipeline> {
        self.pipelines.read().get(id).cloned()
    }

    /// IDs of all loaded indexers, sorted
    pub fn indexer_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.pipelines.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Search across all loaded indexers that can handle the query
    pub async fn search_all(&self, query: &SearchQuery) -> Vec<IndexerSearchResult> {
        self.search_where(query, |_| true).await
    }

    /// Search specific indexers
    pub async fn search_indexers(
        &self,
        indexer_ids: &[String],
        query: &SearchQuery,
    ) -> Vec<IndexerSearchResult> {
        self.search_where(query, |id| indexer_ids.iter().any(|i| i == id))
            .await
    }

    async fn search_where<F>(&self, query: &SearchQuery, selected: F) -> Vec<IndexerSearchResult>
    where
        F: Fn(&str) -> bool,
    {
        let mut pipelines: Vec<IndexerPipeline> = self
            .pipelines
            .read()
            .values()
            .filter(|p| selected(p.id()) && p.definition().can_handle_query(query))
            .cloned()
            .collect();
        pipelines.sort_by(|a, b| a.id().cmp(b.id()));

        // Search all indexers concurrently
        let mut handles = Vec::with_capacity(pipelines.len());
        for pipeline in pipelines {
            let query = query.clone();
            handles.push(tokio::spawn(async move {
                let start = Instant::now();
                let result = pipeline.search(&query).await;
                IndexerSearchResult {
                    indexer_id: pipeline.id().to_string(),
                    indexer_name: pipeline.name().to_string(),
                    result,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                }
            }));
        }

        // Collect results
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!(error = %e, "Indexer search task panicked");
                }
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::error::IndexerError;
    use crate::indexer::fetch::IndexerResponse;
    use crate::indexer::health::InMemoryStatusStore;
    use crate::indexer::request::IndexerRequest;
    use async_trait::async_trait;

    struct EmptyFetcher;

    #[async_trait]
    impl Fetcher for EmptyFetcher {
        async fn fetch(&self, request: &IndexerRequest) -> Result<IndexerResponse, IndexerError> {
            Ok(IndexerResponse::new(request.clone(), 200, "<html></html>"))
        }
    }

    fn manager() -> IndexerManager {
        IndexerManager::new(
            Arc::new(InMemoryStatusStore::default()),
            PipelineConfig::default(),
        )
    }

    #[test]
    fn test_load_and_unload() {
        let manager = manager();
        manager
            .load_indexer("divxtotal", "b", "B", &HashMap::new(), Arc::new(EmptyFetcher))
            .unwrap();
        manager
            .load_indexer("divxtotal", "a", "A", &HashMap::new(), Arc::new(EmptyFetcher))
            .unwrap();
        assert_eq!(manager.indexer_ids(), vec!["a".to_string(), "b".to_string()]);
        assert!(manager.get("a").is_some());

        manager.unload_indexer("a");
        assert_eq!(manager.indexer_ids(), vec!["b".to_string()]);

        assert!(
            manager
                .load_indexer("unknown", "c", "C", &HashMap::new(), Arc::new(EmptyFetcher))
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_search_fans_out_and_filters_by_capability() {
        let manager = manager();
        for id in ["a", "b"] {
            manager
                .load_indexer("divxtotal", id, id, &HashMap::new(), Arc::new(EmptyFetcher))
                .unwrap();
        }

        let results = manager.search_all(&SearchQuery::movie_search("x")).await;
        let ids: Vec<_> = results.iter().map(|r| r.indexer_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(results.iter().all(|r| r.result.records.is_empty()));

        let only_b = manager
            .search_indexers(&["b".to_string()], &SearchQuery::search("x"))
            .await;
        assert_eq!(only_b.len(), 1);
        assert_eq!(only_b[0].indexer_id, "b");

        // music is not supported by divxtotal
        let music = SearchQuery::with_mode(crate::indexer::SearchMode::Music, "x");
        assert!(manager.search_all(&music).await.is_empty());
    }
}
