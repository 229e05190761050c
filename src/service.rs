// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request-level entry points: index, search, similar, vector and stats.
//!
//! [`CodeSearchService`] owns one provider, one store and the two rate
//! governors, and turns wire-shaped requests into core calls. A transport
//! layer (or the CLI) sits on top of it.

use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::embedding::provider::EmbeddingProvider;
use crate::embedding::storage::{EmbeddingStats, EmbeddingStore};
use crate::errors::{CodevecError, Result};
use crate::filters::MetadataFilter;
use crate::governor::{RateGovernor, RateLimit};
use crate::indexer::batch::{BatchIndexer, IndexerConfig, IndexingReport};
use crate::search::{
    validate_limit, validate_threshold, SearchDefaults, SearchHit, SearchQuery, SearchRequest,
    SearchResponse, SearchRouter,
};
use crate::units::{IndexRequest, UnitKey};

/// Largest `limit` accepted by direct vector queries.
pub const MAX_VECTOR_LIMIT: usize = 100;

/// Tunables of a [`CodeSearchService`].
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub indexer: IndexerConfig,
    pub search: SearchDefaults,
    /// Index requests per caller
    pub analysis_limit: RateLimit,
    /// Provider calls, shared by all runs
    pub embedding_limit: RateLimit,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            indexer: IndexerConfig::default(),
            search: SearchDefaults::default(),
            analysis_limit: RateLimit::analysis_default(),
            embedding_limit: RateLimit::embedding_default(),
        }
    }
}

impl From<&Config> for ServiceOptions {
    fn from(config: &Config) -> Self {
        Self {
            indexer: IndexerConfig::from(&config.indexing),
            search: SearchDefaults::from(&config.search),
            analysis_limit: config.limits.analysis(),
            embedding_limit: config.limits.embedding(),
        }
    }
}

/// `{repositoryId, filePath?, functionName?, className?, threshold?, limit?}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceRequest {
    #[serde(default)]
    pub repository_id: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ReferenceRequest {
    fn into_query(self) -> Result<SearchQuery> {
        let repository_id = self
            .repository_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| CodevecError::validation("repositoryId is required"))?;

        let mut key = UnitKey::repository(repository_id);
        key.file_path = self.file_path.filter(|p| !p.is_empty());
        key.function_name = self.function_name.filter(|n| !n.is_empty());
        key.class_name = self.class_name.filter(|n| !n.is_empty());

        let mut query = SearchQuery::similarity(key);
        query.limit = self.limit;
        query.threshold = self.threshold;
        Ok(query)
    }
}

/// `{embedding, limit?, threshold?, filter?}`
///
/// `embedding` stays untyped so a malformed value is reported as a
/// validation error rather than a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorRequest {
    #[serde(default)]
    pub embedding: Option<Value>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default)]
    pub filter: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorResponse {
    pub results: Vec<SearchHit>,
    pub embedding_dimensions: usize,
    pub total_results: usize,
}

pub struct CodeSearchService {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn EmbeddingStore>,
    analysis_governor: RateGovernor,
    embedding_governor: Arc<RateGovernor>,
    indexer_config: IndexerConfig,
    router: SearchRouter,
}

impl CodeSearchService {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn EmbeddingStore>,
        options: ServiceOptions,
    ) -> Self {
        let router = SearchRouter::new(Arc::clone(&provider), Arc::clone(&store), options.search);
        Self {
            provider,
            store,
            analysis_governor: RateGovernor::new("analysis", options.analysis_limit),
            embedding_governor: Arc::new(RateGovernor::new("embedding", options.embedding_limit)),
            indexer_config: options.indexer,
            router,
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn store(&self) -> &Arc<dyn EmbeddingStore> {
        &self.store
    }

    /// Indexes a decomposed repository on behalf of `caller`.
    ///
    /// Fails with [`CodevecError::RateLimited`] once `caller` has used its
    /// analysis budget for the current window.
    pub async fn index(
        &self,
        caller: &str,
        request: IndexRequest,
        cancel: &CancellationToken,
        progress: Option<ProgressBar>,
    ) -> Result<IndexingReport> {
        self.run_index(caller, request, false, cancel, progress).await
    }

    /// Like [`index`](Self::index), but first removes the repository's
    /// existing units.
    ///
    /// The delete happens only once the request has passed the rate check
    /// and validation. A run that fails afterwards (e.g. provider
    /// unavailable) leaves the repository empty.
    pub async fn replace(
        &self,
        caller: &str,
        request: IndexRequest,
        cancel: &CancellationToken,
        progress: Option<ProgressBar>,
    ) -> Result<IndexingReport> {
        self.run_index(caller, request, true, cancel, progress).await
    }

    async fn run_index(
        &self,
        caller: &str,
        request: IndexRequest,
        replace: bool,
        cancel: &CancellationToken,
        progress: Option<ProgressBar>,
    ) -> Result<IndexingReport> {
        self.analysis_governor.check(caller, 1)?;
        request.validate()?;

        let repository_id = request.repository_id.clone();
        if replace {
            let removed = self.store.delete_repository(&repository_id).await?;
            info!(repository_id = %repository_id, removed, "replacing repository units");
        }
        let units = request.into_pending_units();
        debug!(caller, repository_id = %repository_id, units = units.len(), "index request accepted");

        let mut indexer = BatchIndexer::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.store),
            Arc::clone(&self.embedding_governor),
            self.indexer_config.clone(),
        );
        if let Some(progress) = progress {
            progress.set_length(units.len() as u64);
            indexer = indexer.with_progress(progress);
        }
        indexer
            .index_repository(&repository_id, units, None, cancel)
            .await
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let query = SearchQuery::from_request(request)?;
        self.router.search(&query).await
    }

    /// Runs an already-typed query.
    pub async fn search_query(&self, query: &SearchQuery) -> Result<SearchResponse> {
        self.router.search(query).await
    }

    /// Units similar to a stored reference unit.
    pub async fn similar(&self, request: ReferenceRequest) -> Result<SearchResponse> {
        let query = request.into_query()?;
        self.router.search(&query).await
    }

    pub async fn vector_search(&self, request: VectorRequest) -> Result<VectorResponse> {
        let vector = parse_embedding(request.embedding.as_ref())?;
        let limit = request.limit.unwrap_or(self.router.defaults().limit);
        validate_limit(limit, MAX_VECTOR_LIMIT)?;
        let threshold = request.threshold.unwrap_or(self.router.defaults().threshold);
        validate_threshold(threshold)?;
        let filter = match &request.filter {
            Some(value) if !value.is_null() => MetadataFilter::from_json(value)?,
            _ => MetadataFilter::new(),
        };

        let dimensions = vector.len();
        let hits = self
            .router
            .vector_search(vector, limit, threshold, filter, None)
            .await?;
        info!(dimensions, results = hits.len(), "vector search finished");

        let results: Vec<SearchHit> = hits.into_iter().map(SearchHit::from).collect();
        Ok(VectorResponse {
            embedding_dimensions: dimensions,
            total_results: results.len(),
            results,
        })
    }

    pub async fn stats(&self, repository_id: &str) -> Result<EmbeddingStats> {
        if repository_id.trim().is_empty() {
            return Err(CodevecError::validation("repositoryId is required"));
        }
        self.store.aggregate_stats(repository_id).await
    }
}

/// Accepts only a non-empty array of finite numbers.
fn parse_embedding(value: Option<&Value>) -> Result<Vec<f32>> {
    let items = value
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())
        .ok_or_else(|| CodevecError::validation("valid embedding array is required"))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_f64()
                .map(|v| v as f32)
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    CodevecError::validation(format!("embedding[{}] is not a finite number", i))
                })
        })
        .collect()
}
