// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatches a [`SearchQuery`] to semantic, exact or similarity search.
//!
//! Each mode surfaces its own errors. There is no fallback from one mode to
//! another.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::embedding::normalizer::ContentNormalizer;
use crate::embedding::provider::EmbeddingProvider;
use crate::embedding::storage::{EmbeddingStore, ExactQuery, NeighborQuery, ScoredUnit};
use crate::errors::{CodevecError, Result};
use crate::filters::MetadataFilter;
use crate::search::{SearchDefaults, SearchQuery, SearchResponse, SearchType};
use crate::units::UnitKey;

pub struct SearchRouter {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn EmbeddingStore>,
    normalizer: ContentNormalizer,
    defaults: SearchDefaults,
}

impl SearchRouter {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn EmbeddingStore>,
        defaults: SearchDefaults,
    ) -> Self {
        Self {
            provider,
            store,
            normalizer: ContentNormalizer::default(),
            defaults,
        }
    }

    pub fn defaults(&self) -> &SearchDefaults {
        &self.defaults
    }

    /// Validates and runs `query` under its deadline.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        query.validate()?;
        let started = Instant::now();
        let deadline = query.timeout.unwrap_or(self.defaults.timeout);

        let hits = with_deadline(deadline, self.dispatch(query)).await?;

        info!(
            search_type = %query.search_type,
            results = hits.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search finished"
        );
        Ok(SearchResponse::new(query.search_type, hits))
    }

    async fn dispatch(&self, query: &SearchQuery) -> Result<Vec<ScoredUnit>> {
        let limit = query.limit.unwrap_or(self.defaults.limit);
        let threshold = query.threshold.unwrap_or(self.defaults.threshold);
        let filter = query.filters.to_metadata_filter()?;

        match query.search_type {
            SearchType::Semantic => self.semantic(&query.text, limit, threshold, filter).await,
            SearchType::Exact => self.exact(&query.text, limit, filter).await,
            SearchType::Similarity => {
                let reference = query.reference.as_ref().ok_or_else(|| {
                    CodevecError::validation("similarity search requires a reference unit")
                })?;
                self.similarity(reference, limit, threshold, filter).await
            }
        }
    }

    async fn semantic(
        &self,
        text: &str,
        limit: usize,
        threshold: f32,
        filter: MetadataFilter,
    ) -> Result<Vec<ScoredUnit>> {
        let normalized = self.normalizer.normalize(text);
        if normalized.is_empty() {
            return Err(CodevecError::validation("query is empty after normalization"));
        }
        let vector = self.provider.embed(&normalized).await?;
        debug!(dimension = vector.len(), "query embedded");

        let query = NeighborQuery::new(vector, limit)
            .with_threshold(threshold)
            .with_filter(filter);
        self.store.nearest_neighbors(&query).await
    }

    /// Keyword match; never touches the provider. Scores are match tiers,
    /// so no similarity threshold applies.
    async fn exact(
        &self,
        text: &str,
        limit: usize,
        filter: MetadataFilter,
    ) -> Result<Vec<ScoredUnit>> {
        let query = ExactQuery {
            text: text.trim().to_string(),
            limit,
            filter,
        };
        self.store.exact_match(&query).await
    }

    async fn similarity(
        &self,
        reference: &UnitKey,
        limit: usize,
        threshold: f32,
        filter: MetadataFilter,
    ) -> Result<Vec<ScoredUnit>> {
        let base = self
            .store
            .find_one(reference)
            .await?
            .ok_or_else(|| CodevecError::ReferenceNotFound(reference.to_string()))?;
        debug!(reference = %base.label(), id = base.id, "resolved reference unit");

        let query = NeighborQuery::new(base.embedding.clone(), limit + 1)
            .with_threshold(threshold)
            .with_filter(filter)
            .excluding(base.id);
        let mut hits = self.store.nearest_neighbors(&query).await?;
        hits.retain(|hit| hit.unit.id != base.id);
        hits.truncate(limit);
        Ok(hits)
    }

    /// Nearest neighbors of a caller-supplied vector.
    pub async fn vector_search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        threshold: f32,
        filter: MetadataFilter,
        timeout: Option<Duration>,
    ) -> Result<Vec<ScoredUnit>> {
        let query = NeighborQuery::new(vector, limit)
            .with_threshold(threshold)
            .with_filter(filter);
        let deadline = timeout.unwrap_or(self.defaults.timeout);
        with_deadline(deadline, self.store.nearest_neighbors(&query)).await
    }
}

async fn with_deadline<T>(
    deadline: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| CodevecError::Timeout(deadline))?
}
