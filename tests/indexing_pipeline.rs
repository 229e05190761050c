// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch indexing behavior: isolation, pacing, retries, halting, cancellation

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use codevec::embedding::{EmbeddingStore, SqliteStore};
use codevec::errors::CodevecError;
use codevec::governor::{RateGovernor, RateLimit};
use codevec::indexer::{BatchIndexer, IndexerConfig};
use codevec::units::UnitKey;
use common::{file_unit, file_units, MemoryStore, ScriptedProvider};

fn governor() -> Arc<RateGovernor> {
    Arc::new(RateGovernor::new(
        "embedding",
        RateLimit::new(10_000, Duration::from_secs(60)),
    ))
}

fn config(batch_size: usize, batch_delay: Duration) -> IndexerConfig {
    IndexerConfig {
        batch_size,
        batch_delay,
        provider_retries: 2,
        retry_backoff: Duration::from_millis(100),
        ..Default::default()
    }
}

#[tokio::test]
async fn failing_units_do_not_block_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("index.sqlite")).unwrap());
    let indexer = BatchIndexer::new(
        Arc::new(ScriptedProvider::new(16)),
        store.clone(),
        governor(),
        config(3, Duration::ZERO),
    );

    let units = vec![
        file_unit("a.go", "package a"),
        file_unit("b.go", "package b FAIL"),
        file_unit("c.go", "package c"),
        file_unit("d.go", "package d FAIL"),
        file_unit("e.go", "package e"),
    ];
    let report = indexer
        .index_repository("r1", units, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.attempted, 5);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 2);
    assert_eq!(report.batches, 2);
    assert!(!report.cancelled);
    let failed: Vec<&str> = report.failures.iter().map(|f| f.file_path.as_str()).collect();
    assert_eq!(failed, vec!["b.go", "d.go"]);
    assert!(report.failures.iter().all(|f| f.code == "PROVIDER_ERROR"));

    for path in ["a.go", "c.go", "e.go"] {
        let unit = store
            .find_one(&UnitKey::repository("r1").file(path))
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("{} should be stored", path));
        assert_eq!(unit.content, format!("package {}", &path[..1]));
    }
    assert!(store
        .find_one(&UnitKey::repository("r1").file("b.go"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn twelve_units_run_as_two_batches_with_one_delay() {
    let store = Arc::new(MemoryStore::default());
    let indexer = BatchIndexer::new(
        Arc::new(ScriptedProvider::new(8)),
        store.clone(),
        governor(),
        config(10, Duration::from_secs(1)),
    );

    let start = tokio::time::Instant::now();
    let report = indexer
        .index_repository("r1", file_units(12), None, &CancellationToken::new())
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(report.batches, 2);
    assert_eq!(report.succeeded, 12);
    assert_eq!(store.len(), 12);
    assert!(elapsed >= Duration::from_secs(1), "delay after batch 1");
    assert!(elapsed < Duration::from_secs(2), "no delay after the last batch");
}

#[tokio::test(start_paused = true)]
async fn batch_size_argument_overrides_config() {
    let store = Arc::new(MemoryStore::default());
    let indexer = BatchIndexer::new(
        Arc::new(ScriptedProvider::new(8)),
        store,
        governor(),
        config(10, Duration::from_millis(10)),
    );
    let report = indexer
        .index_repository("r1", file_units(12), Some(4), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.batches, 3);
}

#[tokio::test(start_paused = true)]
async fn governor_paces_provider_calls() {
    let store = Arc::new(MemoryStore::default());
    let indexer = BatchIndexer::new(
        Arc::new(ScriptedProvider::new(8)),
        store.clone(),
        Arc::new(RateGovernor::new(
            "embedding",
            RateLimit::new(5, Duration::from_secs(60)),
        )),
        config(10, Duration::ZERO),
    );

    let start = tokio::time::Instant::now();
    let report = indexer
        .index_repository("r1", file_units(8), None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.succeeded, 8);
    assert!(start.elapsed() >= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn transient_unavailability_is_retried() {
    let provider = Arc::new(ScriptedProvider::new(8).unavailable_for(3));
    let store = Arc::new(MemoryStore::default());
    let indexer = BatchIndexer::new(provider.clone(), store.clone(), governor(), config(3, Duration::ZERO));

    let report = indexer
        .index_repository("r1", file_units(3), None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(provider.call_count(), 6);
    assert_eq!(store.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn persistent_unavailability_fails_the_run() {
    let provider = Arc::new(ScriptedProvider::new(8).unavailable_for(usize::MAX));
    let store = Arc::new(MemoryStore::default());
    let indexer = BatchIndexer::new(provider.clone(), store.clone(), governor(), config(3, Duration::ZERO));

    let start = tokio::time::Instant::now();
    let err = indexer
        .index_repository("r1", file_units(6), None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CodevecError::ProviderUnavailable(_)));
    // first batch only: one attempt plus two retries
    assert_eq!(provider.call_count(), 9);
    // 100ms + 200ms of backoff
    assert!(start.elapsed() >= Duration::from_millis(300));
    assert_eq!(store.len(), 0);
}

#[tokio::test]
async fn dimension_mismatch_halts_the_run() {
    let store = Arc::new(MemoryStore::default());
    let indexer = BatchIndexer::new(
        Arc::new(ScriptedProvider::new(8)),
        store.clone(),
        governor(),
        config(3, Duration::ZERO),
    );

    let units = vec![
        file_unit("a.go", "package a"),
        file_unit("b.go", "package b WIDE"),
        file_unit("c.go", "package c"),
        file_unit("d.go", "package d"),
        file_unit("e.go", "package e"),
    ];
    let err = indexer
        .index_repository("r1", units, None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CodevecError::DimensionMismatch {
            expected: 8,
            actual: 16
        }
    ));
    // writes stop after the mismatch; the second batch never starts
    assert_eq!(store.paths(), vec!["a.go".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn cancellation_is_observed_between_batches() {
    let store = Arc::new(MemoryStore::default());
    let indexer = BatchIndexer::new(
        Arc::new(ScriptedProvider::new(8)),
        store.clone(),
        governor(),
        config(10, Duration::from_secs(1)),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let report = indexer
        .index_repository("r1", file_units(25), None, &cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.batches, 1);
    assert_eq!(report.attempted, 10);
    assert_eq!(report.skipped, 15);
    assert_eq!(store.len(), 10);
}

#[tokio::test(start_paused = true)]
async fn comment_only_units_do_not_mask_an_unreachable_provider() {
    let provider = Arc::new(ScriptedProvider::new(8).unavailable_for(usize::MAX));
    let store = Arc::new(MemoryStore::default());
    let indexer = BatchIndexer::new(provider.clone(), store.clone(), governor(), config(3, Duration::ZERO));

    let units = vec![
        file_unit("a.go", "package a"),
        file_unit("b.go", "// only a comment"),
        file_unit("c.go", "package c"),
        file_unit("d.go", "/* doc */"),
        file_unit("e.go", "package e"),
        file_unit("f.go", "package f"),
    ];
    let err = indexer
        .index_repository("r1", units, None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CodevecError::ProviderUnavailable(_)));
    // two provider-bound units in batch 1, one attempt plus two retries
    assert_eq!(provider.call_count(), 6);
    assert_eq!(store.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn retry_covers_only_units_that_reached_the_provider() {
    let provider = Arc::new(ScriptedProvider::new(8).unavailable_for(2));
    let store = Arc::new(MemoryStore::default());
    let indexer = BatchIndexer::new(provider.clone(), store.clone(), governor(), config(3, Duration::ZERO));

    let units = vec![
        file_unit("a.go", "package a"),
        file_unit("b.go", "// only a comment"),
        file_unit("c.go", "package c"),
    ];
    let report = indexer
        .index_repository("r1", units, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.attempted, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].file_path, "b.go");
    assert_eq!(report.failures[0].code, "VALIDATION_ERROR");
    assert_eq!(provider.call_count(), 4);
    assert_eq!(store.paths(), vec!["a.go".to_string(), "c.go".to_string()]);
}
