// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use codevec::embedding::storage::{
    similarity_score, EmbeddingStats, EmbeddingStore, ExactQuery, NeighborQuery, ScoredUnit,
};
use codevec::embedding::{EmbeddingProvider, HashEmbedder};
use codevec::errors::{CodevecError, Result};
use codevec::units::{CodeUnit, NewCodeUnit, PendingUnit, UnitKey, UnitType};

/// In-memory store without blocking work, for paused-clock tests.
#[derive(Default)]
pub struct MemoryStore {
    units: Mutex<Vec<CodeUnit>>,
}

impl MemoryStore {
    pub fn len(&self) -> usize {
        self.units.lock().unwrap().len()
    }

    pub fn paths(&self) -> Vec<String> {
        self.units
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.label())
            .collect()
    }
}

#[async_trait]
impl EmbeddingStore for MemoryStore {
    async fn insert(&self, unit: NewCodeUnit) -> Result<CodeUnit> {
        unit.validate()?;
        let mut units = self.units.lock().unwrap();
        if let Some(first) = units.first() {
            if first.embedding.len() != unit.embedding.len() {
                return Err(CodevecError::DimensionMismatch {
                    expected: first.embedding.len(),
                    actual: unit.embedding.len(),
                });
            }
        }
        let stored = CodeUnit {
            id: units.len() as i64 + 1,
            repository_id: unit.repository_id,
            file_path: unit.file_path,
            function_name: unit.function_name,
            class_name: unit.class_name,
            content: unit.content,
            embedding: unit.embedding,
            unit_type: unit.unit_type,
            start_line: unit.start_line,
            end_line: unit.end_line,
            complexity: unit.complexity,
            language: unit.language,
            created_at: 0,
        };
        units.push(stored.clone());
        Ok(stored)
    }

    async fn find_one(&self, key: &UnitKey) -> Result<Option<CodeUnit>> {
        let units = self.units.lock().unwrap();
        Ok(units
            .iter()
            .find(|u| {
                u.repository_id == key.repository_id
                    && key.file_path.as_ref().map_or(true, |p| *p == u.file_path)
                    && key.function_name.is_none() == u.function_name.is_none()
                    && key.class_name.is_none() == u.class_name.is_none()
            })
            .cloned())
    }

    async fn nearest_neighbors(&self, query: &NeighborQuery) -> Result<Vec<ScoredUnit>> {
        let units = self.units.lock().unwrap();
        let mut hits: Vec<ScoredUnit> = units
            .iter()
            .filter(|u| !query.exclude_ids.contains(&u.id))
            .map(|u| ScoredUnit {
                score: similarity_score(&query.vector, &u.embedding),
                unit: u.clone(),
            })
            .filter(|hit| hit.score >= query.threshold)
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        hits.truncate(query.limit);
        Ok(hits)
    }

    async fn exact_match(&self, _query: &ExactQuery) -> Result<Vec<ScoredUnit>> {
        Ok(Vec::new())
    }

    async fn aggregate_stats(&self, repository_id: &str) -> Result<EmbeddingStats> {
        Ok(EmbeddingStats {
            repository_id: repository_id.to_string(),
            total_embeddings: self.len() as u64,
            breakdown: Vec::new(),
        })
    }

    async fn delete_repository(&self, repository_id: &str) -> Result<usize> {
        let mut units = self.units.lock().unwrap();
        let before = units.len();
        units.retain(|u| u.repository_id != repository_id);
        Ok(before - units.len())
    }
}

/// Wraps [`HashEmbedder`] and injects failures by content.
///
/// - content containing `FAIL` fails with a provider error
/// - content containing `WIDE` gets a vector twice as long
/// - the first `unavailable_calls` calls report the provider unreachable
pub struct ScriptedProvider {
    inner: HashEmbedder,
    unavailable_calls: usize,
    pub calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: HashEmbedder::new(dimension),
            unavailable_calls: 0,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable_for(mut self, calls: usize) -> Self {
        self.unavailable_calls = calls;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedProvider {
    fn model_id(&self) -> &str {
        "scripted"
    }

    fn dimension(&self) -> Option<usize> {
        self.inner.dimension()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.unavailable_calls {
            return Err(CodevecError::ProviderUnavailable("connection refused".into()));
        }
        if text.contains("FAIL") {
            return Err(CodevecError::Provider("token limit exceeded".into()));
        }
        let mut vector = self.inner.embed_sync(text);
        if text.contains("WIDE") {
            vector.extend(vector.clone());
        }
        Ok(vector)
    }
}

/// Provider returning the same vector for every text.
pub struct FixedProvider(pub Vec<f32>);

#[async_trait]
impl EmbeddingProvider for FixedProvider {
    fn model_id(&self) -> &str {
        "fixed"
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.0.len())
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

pub fn file_unit(path: &str, content: &str) -> PendingUnit {
    PendingUnit {
        file_path: path.to_string(),
        function_name: None,
        class_name: None,
        unit_type: UnitType::File,
        content: content.to_string(),
        language: "go".to_string(),
        start_line: None,
        end_line: None,
        complexity: Some(1),
    }
}

/// `count` file units with distinct paths and contents.
pub fn file_units(count: usize) -> Vec<PendingUnit> {
    (0..count)
        .map(|i| file_unit(&format!("pkg/file{:02}.go", i), &format!("package pkg{}", i)))
        .collect()
}
