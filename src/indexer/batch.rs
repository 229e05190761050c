// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch indexing: normalize, embed and store units in paced batches.
//!
//! Units of one batch are processed concurrently and the batch completes when
//! every unit has settled. Batches run strictly one after another with a
//! fixed pause between them. A failing unit is recorded in the report and
//! never blocks its siblings; only an unreachable provider or a dimension
//! mismatch ends the run early.

use futures::future::join_all;
use indicatif::ProgressBar;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::IndexingConfig;
use crate::embedding::normalizer::ContentNormalizer;
use crate::embedding::provider::EmbeddingProvider;
use crate::embedding::storage::EmbeddingStore;
use crate::errors::{CodevecError, ErrorKind, Result};
use crate::governor::RateGovernor;
use crate::units::{CodeUnit, PendingUnit, UnitType};

/// Governor bucket shared by all runs against one provider.
pub const DEFAULT_GOVERNOR_KEY: &str = "embedding-provider";

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub batch_size: usize,
    pub batch_delay: Duration,
    /// Retries of a batch in which every unit found the provider unreachable.
    pub provider_retries: u32,
    /// First retry waits this long, doubling afterwards.
    pub retry_backoff: Duration,
    pub governor_key: String,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_delay: Duration::from_secs(1),
            provider_retries: 3,
            retry_backoff: Duration::from_millis(500),
            governor_key: DEFAULT_GOVERNOR_KEY.to_string(),
        }
    }
}

impl From<&IndexingConfig> for IndexerConfig {
    fn from(config: &IndexingConfig) -> Self {
        Self {
            batch_size: config.batch_size(),
            batch_delay: config.batch_delay(),
            provider_retries: config.provider_retries(),
            retry_backoff: config.retry_backoff(),
            ..Default::default()
        }
    }
}

/// One unit that could not be indexed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitFailure {
    /// `path` or `path::name`
    pub unit: String,
    pub file_path: String,
    pub unit_type: UnitType,
    /// Wire code of the error kind
    pub code: &'static str,
    pub error: String,
}

/// Outcome of an indexing run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingReport {
    pub repository_id: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Units never attempted because the run was cancelled.
    pub skipped: usize,
    pub failures: Vec<UnitFailure>,
    pub batches: usize,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl IndexingReport {
    fn new(repository_id: &str) -> Self {
        Self {
            repository_id: repository_id.to_string(),
            attempted: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            failures: Vec::new(),
            batches: 0,
            cancelled: false,
            elapsed_ms: 0,
        }
    }

    fn record_failure(&mut self, unit: &PendingUnit, err: &CodevecError) {
        self.failed += 1;
        self.failures.push(UnitFailure {
            unit: unit.label(),
            file_path: unit.file_path.clone(),
            unit_type: unit.unit_type,
            code: err.kind().code(),
            error: err.to_string(),
        });
    }
}

/// Drives units through normalize, embed and store.
pub struct BatchIndexer {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn EmbeddingStore>,
    governor: Arc<RateGovernor>,
    normalizer: ContentNormalizer,
    config: IndexerConfig,
    progress: Option<ProgressBar>,
}

impl BatchIndexer {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn EmbeddingStore>,
        governor: Arc<RateGovernor>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            provider,
            store,
            governor,
            normalizer: ContentNormalizer::default(),
            config,
            progress: None,
        }
    }

    /// Ticks `progress` once per settled unit.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_normalizer(mut self, normalizer: ContentNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Indexes `units` for `repository_id`.
    ///
    /// `batch_size` overrides the configured size. Cancellation is observed
    /// between batches and yields a report with `cancelled` set.
    pub async fn index_repository(
        &self,
        repository_id: &str,
        units: Vec<PendingUnit>,
        batch_size: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<IndexingReport> {
        if repository_id.trim().is_empty() {
            return Err(CodevecError::validation("repositoryId is required"));
        }
        let batch_size = batch_size.unwrap_or(self.config.batch_size);
        if batch_size == 0 {
            return Err(CodevecError::validation("batch size must be at least 1"));
        }

        let started = Instant::now();
        let total = units.len();
        let total_batches = total.div_ceil(batch_size);
        let mut report = IndexingReport::new(repository_id);
        let halt = OnceLock::new();

        info!(
            repository_id,
            units = total,
            batch_size,
            batches = total_batches,
            "indexing started"
        );

        let mut remaining = units.into_iter();
        for batch_index in 0..total_batches {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let batch: Vec<PendingUnit> = remaining.by_ref().take(batch_size).collect();
            debug!(repository_id, batch = batch_index + 1, size = batch.len(), "batch started");

            let outcomes = self.run_batch(repository_id, &batch, &halt).await?;
            report.batches += 1;
            report.attempted += batch.len();
            for (unit, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(_) => report.succeeded += 1,
                    Err(err) => {
                        warn!(repository_id, unit = %unit.label(), error = %err, "unit failed");
                        report.record_failure(unit, &err);
                    }
                }
            }

            if let Some(&(expected, actual)) = halt.get() {
                error!(
                    repository_id,
                    expected,
                    actual,
                    succeeded = report.succeeded,
                    "dimension mismatch, halting run"
                );
                return Err(CodevecError::DimensionMismatch { expected, actual });
            }

            let is_last = batch_index + 1 == total_batches;
            if !is_last && !self.config.batch_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        report.cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.config.batch_delay) => {}
                }
            }
        }

        report.skipped = total - report.attempted;
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            repository_id,
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed_ms,
            "indexing finished"
        );
        Ok(report)
    }

    /// Runs one batch, retrying while the provider is wholly unreachable.
    ///
    /// Only units that reached the provider decide reachability and are
    /// retried; units rejected before the call keep their failure.
    async fn run_batch(
        &self,
        repository_id: &str,
        batch: &[PendingUnit],
        halt: &OnceLock<(usize, usize)>,
    ) -> Result<Vec<Result<CodeUnit>>> {
        let mut settled: Vec<Option<Result<CodeUnit>>> = batch.iter().map(|_| None).collect();
        let mut pending: Vec<usize> = (0..batch.len()).collect();
        let mut attempt: u32 = 0;

        loop {
            let attempts = join_all(
                pending
                    .iter()
                    .map(|&i| self.process_unit(repository_id, &batch[i], halt)),
            )
            .await;

            let mut reached = Vec::new();
            for (&i, outcome) in pending.iter().zip(attempts) {
                match outcome {
                    Attempt::Rejected(err) => settled[i] = Some(Err(err)),
                    Attempt::Reached(result) => reached.push((i, result)),
                }
            }

            let unreachable = !reached.is_empty()
                && reached.iter().all(|(_, result)| {
                    matches!(result, Err(err) if err.kind() == ErrorKind::ProviderUnavailable)
                });
            if !unreachable {
                for (i, result) in reached {
                    settled[i] = Some(result);
                }
                break;
            }

            let reason = reached
                .iter()
                .find_map(|(_, result)| result.as_ref().err())
                .map(|err| err.to_string())
                .unwrap_or_default();
            if attempt >= self.config.provider_retries {
                error!(repository_id, attempts = attempt + 1, "embedding provider unreachable");
                return Err(CodevecError::ProviderUnavailable(reason));
            }

            let backoff = self
                .config
                .retry_backoff
                .saturating_mul(2u32.saturating_pow(attempt));
            warn!(
                repository_id,
                attempt = attempt + 1,
                units = reached.len(),
                backoff_ms = backoff.as_millis() as u64,
                "provider unreachable, retrying batch"
            );
            tokio::time::sleep(backoff).await;
            pending = reached.into_iter().map(|(i, _)| i).collect();
            attempt += 1;
        }

        if let Some(progress) = &self.progress {
            progress.inc(batch.len() as u64);
        }
        Ok(settled
            .into_iter()
            .map(|outcome| {
                outcome.unwrap_or_else(|| Err(CodevecError::validation("unit was not processed")))
            })
            .collect())
    }

    async fn process_unit(
        &self,
        repository_id: &str,
        unit: &PendingUnit,
        halt: &OnceLock<(usize, usize)>,
    ) -> Attempt {
        let normalized = self.normalizer.normalize(&unit.content);
        if normalized.is_empty() {
            return Attempt::Rejected(CodevecError::validation(
                "content is empty after normalization",
            ));
        }
        if let Err(err) = self.governor.until_ready(&self.config.governor_key, 1).await {
            return Attempt::Rejected(err);
        }

        let result = match self.provider.embed(&normalized).await {
            Ok(embedding) => self.store_unit(repository_id, unit, embedding, halt).await,
            Err(err) => Err(err),
        };
        Attempt::Reached(result)
    }

    async fn store_unit(
        &self,
        repository_id: &str,
        unit: &PendingUnit,
        embedding: Vec<f32>,
        halt: &OnceLock<(usize, usize)>,
    ) -> Result<CodeUnit> {
        if let Some(&(expected, actual)) = halt.get() {
            return Err(CodevecError::DimensionMismatch { expected, actual });
        }

        let new_unit = unit.clone().into_new_unit(repository_id, embedding);
        match self.store.insert(new_unit).await {
            Err(CodevecError::DimensionMismatch { expected, actual }) => {
                let _ = halt.set((expected, actual));
                Err(CodevecError::DimensionMismatch { expected, actual })
            }
            other => other,
        }
    }
}

/// Outcome of one unit within a batch attempt.
enum Attempt {
    /// Failed before the provider was called.
    Rejected(CodevecError),
    /// The provider was called; holds the embed-and-store result.
    Reached(Result<CodeUnit>),
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::provider::HashEmbedder;
    use crate::embedding::storage::SqliteStore;
    use crate::governor::RateLimit;

    fn pending(path: &str, content: &str) -> PendingUnit {
        PendingUnit {
            file_path: path.into(),
            function_name: None,
            class_name: None,
            unit_type: UnitType::File,
            content: content.into(),
            language: "rust".into(),
            start_line: None,
            end_line: None,
            complexity: Some(1),
        }
    }

    fn indexer(store: Arc<SqliteStore>) -> BatchIndexer {
        BatchIndexer::new(
            Arc::new(HashEmbedder::new(32)),
            store,
            Arc::new(RateGovernor::new("embed", RateLimit::new(1000, Duration::from_secs(60)))),
            IndexerConfig {
                batch_delay: Duration::ZERO,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_empty_normalized_content_is_unit_failure() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let report = indexer(store.clone())
            .index_repository(
                "r1",
                vec![pending("a.rs", "fn a() {}"), pending("b.rs", "// only a comment")],
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].file_path, "b.rs");
        assert_eq!(report.failures[0].code, "VALIDATION_ERROR");
        assert_eq!(store.count(Some("r1")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejects_invalid_input() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let indexer = indexer(store);
        let cancel = CancellationToken::new();
        assert!(matches!(
            indexer.index_repository(" ", vec![], None, &cancel).await,
            Err(CodevecError::Validation(_))
        ));
        assert!(matches!(
            indexer.index_repository("r1", vec![], Some(0), &cancel).await,
            Err(CodevecError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_stores_raw_content_not_normalized_text() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let content = "fn a() {\n    // note\n    1\n}";
        indexer(store.clone())
            .index_repository("r1", vec![pending("a.rs", content)], None, &CancellationToken::new())
            .await
            .unwrap();
        let unit = store
            .find_one(&crate::units::UnitKey::repository("r1").file("a.rs"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unit.content, content);
        assert_eq!(unit.embedding, HashEmbedder::new(32).embed_sync("fn a() { 1 }"));
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_attempts_nothing() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = indexer(store)
            .index_repository("r1", vec![pending("a.rs", "fn a() {}")], None, &cancel)
            .await
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.attempted, 0);
        assert_eq!(report.skipped, 1);
    }
}
