// SPDX-License-Identifier: MIT OR Apache-2.0

//! Search queries, dispatch modes and result shapes.
//!
//! A [`SearchRequest`] is the loose wire form; [`SearchQuery`] is the typed,
//! validated form the [`SearchRouter`] executes.

pub mod router;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::SearchConfig;
use crate::embedding::storage::ScoredUnit;
use crate::errors::{CodevecError, Result};
use crate::filters::SearchFilters;
use crate::units::{UnitKey, UnitType};

pub use router::SearchRouter;

/// Longest accepted query text, in characters.
pub const MAX_QUERY_CHARS: usize = 500;

/// Largest `limit` for routed searches.
pub const MAX_LIMIT: usize = 50;

/// Search dispatch mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    /// Embed the query and rank by vector similarity
    Semantic,
    /// Keyword match over names, paths and content
    Exact,
    /// Rank against a stored reference unit's embedding
    Similarity,
}

impl SearchType {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchType::Semantic => "semantic",
            SearchType::Exact => "exact",
            SearchType::Similarity => "similarity",
        }
    }
}

impl std::fmt::Display for SearchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SearchType {
    type Err = CodevecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "semantic" => Ok(SearchType::Semantic),
            "exact" => Ok(SearchType::Exact),
            "similarity" => Ok(SearchType::Similarity),
            _ => Err(CodevecError::InvalidSearchType(s.to_string())),
        }
    }
}

fn default_search_type() -> String {
    SearchType::Semantic.as_str().to_string()
}

/// Wire form of a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(rename = "type", default = "default_search_type")]
    pub search_type: String,
    #[serde(default)]
    pub filters: Option<SearchFilters>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub threshold: Option<f32>,
    /// Reference unit for `similarity`
    #[serde(default)]
    pub reference: Option<UnitKey>,
}

/// Defaults applied when a query leaves a knob unset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchDefaults {
    pub limit: usize,
    pub threshold: f32,
    pub timeout: Duration,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            limit: 10,
            threshold: 0.7,
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&SearchConfig> for SearchDefaults {
    fn from(config: &SearchConfig) -> Self {
        Self {
            limit: config.default_limit(),
            threshold: config.default_threshold(),
            timeout: config.timeout(),
        }
    }
}

/// A typed search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    pub search_type: SearchType,
    pub filters: SearchFilters,
    pub limit: Option<usize>,
    pub threshold: Option<f32>,
    pub reference: Option<UnitKey>,
    pub timeout: Option<Duration>,
}

impl SearchQuery {
    fn with_type(search_type: SearchType, text: String) -> Self {
        Self {
            text,
            search_type,
            filters: SearchFilters::default(),
            limit: None,
            threshold: None,
            reference: None,
            timeout: None,
        }
    }

    pub fn semantic(text: impl Into<String>) -> Self {
        Self::with_type(SearchType::Semantic, text.into())
    }

    pub fn exact(text: impl Into<String>) -> Self {
        Self::with_type(SearchType::Exact, text.into())
    }

    pub fn similarity(reference: UnitKey) -> Self {
        let mut query = Self::with_type(SearchType::Similarity, String::new());
        query.reference = Some(reference);
        query
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Parses the dispatch type and validates every bound.
    pub fn from_request(request: SearchRequest) -> Result<Self> {
        let search_type: SearchType = request.search_type.parse()?;
        let query = Self {
            text: request.query,
            search_type,
            filters: request.filters.unwrap_or_default(),
            limit: request.limit,
            threshold: request.threshold,
            reference: request.reference,
            timeout: None,
        };
        query.validate()?;
        Ok(query)
    }

    pub fn validate(&self) -> Result<()> {
        match self.search_type {
            SearchType::Semantic | SearchType::Exact => validate_query_text(&self.text)?,
            SearchType::Similarity => match &self.reference {
                Some(reference) => reference.validate()?,
                None => {
                    return Err(CodevecError::validation(
                        "similarity search requires a reference unit",
                    ))
                }
            },
        }
        if let Some(limit) = self.limit {
            validate_limit(limit, MAX_LIMIT)?;
        }
        if let Some(threshold) = self.threshold {
            validate_threshold(threshold)?;
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(CodevecError::validation("timeout must be positive"));
        }
        // Rejects unknown unit types early.
        self.filters.to_metadata_filter()?;
        Ok(())
    }
}

pub(crate) fn validate_query_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(CodevecError::validation("query is required"));
    }
    let chars = text.chars().count();
    if chars > MAX_QUERY_CHARS {
        return Err(CodevecError::validation(format!(
            "query is {} characters, maximum is {}",
            chars, MAX_QUERY_CHARS
        )));
    }
    Ok(())
}

pub(crate) fn validate_limit(limit: usize, max: usize) -> Result<()> {
    if !(1..=max).contains(&limit) {
        return Err(CodevecError::validation(format!(
            "limit must be between 1 and {}, got {}",
            max, limit
        )));
    }
    Ok(())
}

pub(crate) fn validate_threshold(threshold: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(CodevecError::validation(format!(
            "threshold must be between 0 and 1, got {}",
            threshold
        )));
    }
    Ok(())
}

/// Metadata block of a [`SearchHit`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HitMetadata {
    pub language: String,
    #[serde(rename = "type")]
    pub unit_type: UnitType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<u32>,
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: i64,
    pub repository_id: String,
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub content: String,
    pub metadata: HitMetadata,
    pub score: f32,
}

impl SearchHit {
    /// `path` or `path::name`
    pub fn label(&self) -> String {
        match self.function_name.as_ref().or(self.class_name.as_ref()) {
            Some(name) => format!("{}::{}", self.file_path, name),
            None => self.file_path.clone(),
        }
    }
}

impl From<ScoredUnit> for SearchHit {
    fn from(hit: ScoredUnit) -> Self {
        let unit = hit.unit;
        Self {
            id: unit.id,
            repository_id: unit.repository_id,
            file_path: unit.file_path,
            function_name: unit.function_name,
            class_name: unit.class_name,
            content: unit.content,
            metadata: HitMetadata {
                language: unit.language,
                unit_type: unit.unit_type,
                start_line: unit.start_line,
                end_line: unit.end_line,
                complexity: unit.complexity,
            },
            score: hit.score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub search_type: SearchType,
    pub results: Vec<SearchHit>,
    pub total_results: usize,
}

impl SearchResponse {
    pub fn new(search_type: SearchType, hits: Vec<ScoredUnit>) -> Self {
        let results: Vec<SearchHit> = hits.into_iter().map(SearchHit::from).collect();
        Self {
            search_type,
            total_results: results.len(),
            results,
        }
    }
}
