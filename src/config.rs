// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for codevec
//!
//! Loads configuration from .codevecrc.toml in current directory or ~/.config/codevec/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::governor::RateLimit;

/// Output format for results (mirrored from cli for library use)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOutputFormat {
    #[default]
    Text,
    Json,
}

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    /// Deterministic feature hashing, no model required
    #[default]
    #[serde(alias = "dummy")]
    Hash,
    /// External process speaking JSON over stdin/stdout
    Command,
    /// Local fastembed model
    Builtin,
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (hash, command, builtin)
    pub provider: Option<EmbeddingProviderType>,
    /// Model identifier for the embedding provider
    pub model: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Vector size produced by the hash provider
    pub dimension: Option<usize>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Hash)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier (defaults to "local-model-id")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("local-model-id")
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    /// Get hash provider dimension (defaults to 384)
    pub fn dimension(&self) -> usize {
        self.dimension.filter(|d| *d > 0).unwrap_or(384)
    }
}

/// Indexing configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Units embedded concurrently per batch
    pub batch_size: Option<usize>,
    /// Pause between batches in milliseconds
    pub batch_delay_ms: Option<u64>,
    /// Retries of a batch whose every unit hit an unreachable provider
    pub provider_retries: Option<u32>,
    /// Initial backoff between those retries in milliseconds
    pub retry_backoff_ms: Option<u64>,
    /// Paths/patterns to exclude from indexing
    pub exclude_paths: Vec<String>,
    /// Maximum file size in bytes to index (default: 1MB)
    pub max_file_size: Option<u64>,
}

impl IndexingConfig {
    /// Get batch size (defaults to 10)
    pub fn batch_size(&self) -> usize {
        self.batch_size.filter(|n| *n > 0).unwrap_or(10)
    }

    /// Get inter-batch delay (defaults to 1s)
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms.unwrap_or(1000))
    }

    /// Get provider retries (defaults to 3)
    pub fn provider_retries(&self) -> u32 {
        self.provider_retries.unwrap_or(3)
    }

    /// Get initial retry backoff (defaults to 500ms)
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.unwrap_or(500))
    }

    /// Get exclude paths
    pub fn exclude_paths(&self) -> &[String] {
        &self.exclude_paths
    }

    /// Get max file size (default: 1MB)
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size.unwrap_or(1024 * 1024)
    }
}

/// Rate limit configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub embedding_points: Option<u32>,
    pub embedding_window_secs: Option<u64>,
    pub analysis_points: Option<u32>,
    pub analysis_window_secs: Option<u64>,
}

impl LimitsConfig {
    /// Provider call budget (defaults to 100 per 60s)
    pub fn embedding(&self) -> RateLimit {
        let default = RateLimit::embedding_default();
        RateLimit::new(
            self.embedding_points.filter(|p| *p > 0).unwrap_or(default.points),
            self.embedding_window_secs
                .map(Duration::from_secs)
                .unwrap_or(default.window),
        )
    }

    /// Index request budget per caller (defaults to 5 per 300s)
    pub fn analysis(&self) -> RateLimit {
        let default = RateLimit::analysis_default();
        RateLimit::new(
            self.analysis_points.filter(|p| *p > 0).unwrap_or(default.points),
            self.analysis_window_secs
                .map(Duration::from_secs)
                .unwrap_or(default.window),
        )
    }
}

/// Search configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: Option<usize>,
    pub default_threshold: Option<f32>,
    pub timeout_ms: Option<u64>,
}

impl SearchConfig {
    /// Get default result limit (defaults to 10)
    pub fn default_limit(&self) -> usize {
        self.default_limit.unwrap_or(10)
    }

    /// Get default score threshold (defaults to 0.7)
    pub fn default_threshold(&self) -> f32 {
        self.default_threshold.unwrap_or(0.7)
    }

    /// Get search deadline (defaults to 30s)
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(30_000))
    }
}

/// Store configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Explicit database path
    pub path: Option<PathBuf>,
}

/// Configuration loaded from .codevecrc.toml or ~/.config/codevec/config.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default output format (text or json)
    pub default_format: Option<String>,

    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    /// Load configuration from files
    ///
    /// Precedence (highest to lowest):
    /// 1. .codevecrc.toml in current directory
    /// 2. ~/.config/codevec/config.toml
    pub fn load() -> Self {
        if let Some(config) = Self::load_from_path(Path::new(".codevecrc.toml")) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("codevec").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    /// Parse a config file, warning and returning `None` on malformed TOML.
    pub fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match Self::parse(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                eprintln!("Warning: Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Get output format from config, parsing the string to ConfigOutputFormat
    pub fn output_format(&self) -> Option<ConfigOutputFormat> {
        self.default_format.as_ref().and_then(|s| match s.to_lowercase().as_str() {
            "json" => Some(ConfigOutputFormat::Json),
            "text" => Some(ConfigOutputFormat::Text),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.embeddings.provider(), EmbeddingProviderType::Hash);
        assert_eq!(config.embeddings.dimension(), 384);
        assert_eq!(config.indexing.batch_size(), 10);
        assert_eq!(config.indexing.batch_delay(), Duration::from_secs(1));
        assert_eq!(config.indexing.provider_retries(), 3);
        assert_eq!(config.limits.embedding(), RateLimit::embedding_default());
        assert_eq!(config.limits.analysis().points, 5);
        assert_eq!(config.search.default_limit(), 10);
        assert!((config.search.default_threshold() - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.search.timeout(), Duration::from_secs(30));
        assert!(config.store.path.is_none());
    }

    #[test]
    fn test_parse_sections() {
        let config = Config::parse(
            r#"
            default_format = "json"

            [embeddings]
            provider = "dummy"
            dimension = 64

            [indexing]
            batch_size = 4
            batch_delay_ms = 0
            exclude_paths = ["vendor/**"]

            [limits]
            embedding_points = 20
            embedding_window_secs = 10

            [search]
            default_threshold = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.output_format(), Some(ConfigOutputFormat::Json));
        assert_eq!(config.embeddings.provider(), EmbeddingProviderType::Hash);
        assert_eq!(config.embeddings.dimension(), 64);
        assert_eq!(config.indexing.batch_size(), 4);
        assert_eq!(config.indexing.batch_delay(), Duration::ZERO);
        assert_eq!(config.indexing.exclude_paths(), ["vendor/**".to_string()]);
        assert_eq!(
            config.limits.embedding(),
            RateLimit::new(20, Duration::from_secs(10))
        );
        assert_eq!(config.limits.analysis(), RateLimit::analysis_default());
        assert!((config.search.default_threshold() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_zero_batch_size_falls_back() {
        let config = Config::parse("[indexing]\nbatch_size = 0\n").unwrap();
        assert_eq!(config.indexing.batch_size(), 10);
    }

    #[test]
    fn test_malformed_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[indexing\nbatch_size = ").unwrap();
        assert!(Config::load_from_path(&path).is_none());
    }
}
