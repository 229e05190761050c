// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! Providers map normalized text to a fixed-size vector. Three are shipped:
//! a deterministic feature-hashing embedder (default, no model needed), an
//! external command speaking JSON over stdin/stdout, and a local fastembed
//! MiniLM model where the platform supports it.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::{EmbeddingConfig, EmbeddingProviderType};
use crate::errors::{CodevecError, Result};

/// Default embedding dimension for sentence-transformers/all-MiniLM-L6-v2.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Maps text to vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Vector size, when known before the first call.
    fn dimension(&self) -> Option<usize>;

    /// Embeds one text.
    ///
    /// Fails with [`CodevecError::ProviderUnavailable`] when the provider
    /// cannot be reached and [`CodevecError::Provider`] when this call failed.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds several texts, one call per text unless overridden.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9_]+").expect("token regex"));

/// Deterministic bag-of-tokens embedder using signed feature hashing.
///
/// Texts sharing identifiers land close together, which is enough for local
/// use and tests. Output is L2-normalized.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    model: String,
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            model: format!("blake3-hash-{}", dimension),
            dimension: dimension.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in TOKEN.find_iter(text) {
            let token = token.as_str().to_lowercase();
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let mut index_bytes = [0u8; 8];
            index_bytes.copy_from_slice(&bytes[..8]);
            let index = (u64::from_le_bytes(index_bytes) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}

/// Command provider that shells out to an external process.
///
/// The process receives `{"model": ..., "texts": [...]}` on stdin and answers
/// with a JSON array of vectors, or an object holding one under
/// `embeddings`, `vectors` or `data`.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    command: String,
    model: String,
}

impl CommandProvider {
    pub fn new(command: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            model: model.into(),
        }
    }

    async fn run_command(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let payload = serde_json::json!({
            "model": self.model,
            "texts": texts,
        });

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CodevecError::ProviderUnavailable(format!(
                    "failed to spawn embedding command '{}': {}",
                    self.command, e
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(payload.to_string().as_bytes()).await {
                Ok(()) => {}
                // the exit status below says why the process stopped reading
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => {
                    return Err(CodevecError::Provider(format!(
                        "failed to write embeddings payload: {}",
                        e
                    )))
                }
            }
        }

        let output = child.wait_with_output().await.map_err(|e| {
            CodevecError::Provider(format!("failed to read embeddings command output: {}", e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // sh reports a missing executable as 127
            let message = format!(
                "embedding command failed (status {}): {}",
                output.status,
                stderr.trim()
            );
            return Err(match output.status.code() {
                Some(126) | Some(127) => CodevecError::ProviderUnavailable(message),
                _ => CodevecError::Provider(message),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let vectors = parse_command_output(stdout.trim())?;
        if vectors.len() != texts.len() {
            return Err(CodevecError::Provider(format!(
                "embedding command returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        debug!(command = %self.command, count = vectors.len(), "command embeddings received");
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for CommandProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> Option<usize> {
        None
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.run_command(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| CodevecError::Provider("no embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run_command(texts).await
    }
}

fn parse_command_output(stdout: &str) -> Result<Vec<Vec<f32>>> {
    let provider_err = |msg: &str| CodevecError::Provider(msg.to_string());

    let parsed: Value = serde_json::from_str(stdout)
        .map_err(|e| CodevecError::Provider(format!("embeddings output is not JSON: {}", e)))?;

    let embeddings_value = match parsed {
        Value::Array(arr) => Value::Array(arr),
        Value::Object(mut obj) => ["embeddings", "vectors", "data"]
            .iter()
            .find_map(|key| obj.remove(*key))
            .ok_or_else(|| provider_err("embeddings output missing 'embeddings' field"))?,
        _ => return Err(provider_err("embeddings output must be a JSON array or object")),
    };

    embeddings_value
        .as_array()
        .ok_or_else(|| provider_err("embeddings output must be a JSON array"))?
        .iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| provider_err("embedding row must be an array"))?
                .iter()
                .map(|value| {
                    value
                        .as_f64()
                        .map(|v| v as f32)
                        .ok_or_else(|| provider_err("embedding value must be a number"))
                })
                .collect::<Result<Vec<f32>>>()
        })
        .collect()
}

/// FastEmbed provider using sentence-transformers/all-MiniLM-L6-v2.
#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
pub struct FastEmbedder {
    embedder: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
    model_id: String,
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
impl FastEmbedder {
    pub fn new() -> Result<Self> {
        let model = fastembed::EmbeddingModel::AllMiniLML6V2;
        let model_id = model.to_string();
        let embedder = fastembed::TextEmbedding::try_new(fastembed::InitOptions::new(model))
            .map_err(|e| {
                CodevecError::ProviderUnavailable(format!(
                    "failed to initialize fastembed model: {}",
                    e
                ))
            })?;
        Ok(Self {
            embedder: Arc::new(std::sync::Mutex::new(embedder)),
            model_id,
        })
    }
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
#[async_trait]
impl EmbeddingProvider for FastEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> Option<usize> {
        Some(DEFAULT_EMBEDDING_DIM)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| CodevecError::Provider("no embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embedder = Arc::clone(&self.embedder);
        let texts = texts.to_vec();
        let mut vectors = tokio::task::spawn_blocking(move || {
            let mut embedder = embedder
                .lock()
                .map_err(|_| CodevecError::Provider("fastembed model lock poisoned".into()))?;
            embedder
                .embed(texts, None)
                .map_err(|e| CodevecError::Provider(e.to_string()))
        })
        .await
        .map_err(|e| CodevecError::Provider(format!("embedding task failed: {}", e)))??;

        for vector in vectors.iter_mut() {
            l2_normalize(vector);
        }
        Ok(vectors)
    }
}

/// Builds the configured provider.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider() {
        EmbeddingProviderType::Hash => Ok(Arc::new(HashEmbedder::new(config.dimension()))),
        EmbeddingProviderType::Command => Ok(Arc::new(CommandProvider::new(
            config.command(),
            config.model(),
        ))),
        EmbeddingProviderType::Builtin => builtin_provider(),
    }
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
fn builtin_provider() -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(FastEmbedder::new()?))
}

#[cfg(all(target_os = "macos", target_arch = "x86_64"))]
fn builtin_provider() -> Result<Arc<dyn EmbeddingProvider>> {
    Err(CodevecError::ProviderUnavailable(
        "builtin embeddings are not available on this platform".to_string(),
    ))
}

pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic_and_normalized() {
        let provider = HashEmbedder::new(64);
        let a = provider.embed("fn parse_json(input: &str)").await.unwrap();
        let b = provider.embed("fn parse_json(input: &str)").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hash_embedder_similarity_tracks_shared_tokens() {
        let provider = HashEmbedder::new(256);
        let base = provider.embed("parse json string into value").await.unwrap();
        let near = provider.embed("parse json string").await.unwrap();
        let far = provider.embed("render html template").await.unwrap();
        let dot = |x: &[f32], y: &[f32]| x.iter().zip(y).map(|(a, b)| a * b).sum::<f32>();
        assert!(dot(&base, &near) > dot(&base, &far));
    }

    #[tokio::test]
    async fn test_default_batch_embeds_each_text() {
        let provider = HashEmbedder::new(16);
        let vectors = provider
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|v| v.len() == 16));
    }

    #[test]
    fn test_parse_command_output_shapes() {
        assert_eq!(
            parse_command_output("[[1.0, 2.0]]").unwrap(),
            vec![vec![1.0, 2.0]]
        );
        assert_eq!(
            parse_command_output(r#"{"vectors": [[0.5]]}"#).unwrap(),
            vec![vec![0.5]]
        );
        assert!(matches!(
            parse_command_output(r#"{"result": []}"#),
            Err(CodevecError::Provider(_))
        ));
        assert!(matches!(
            parse_command_output(r#"[["x"]]"#),
            Err(CodevecError::Provider(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_provider_round_trip() {
        let provider = CommandProvider::new(r#"cat > /dev/null; echo '{"embeddings": [[0.1, 0.2, 0.3]]}'"#, "m");
        let vector = provider.embed("hello").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_command_is_unavailable() {
        let provider = CommandProvider::new("codevec-no-such-embedder-binary", "m");
        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(err, CodevecError::ProviderUnavailable(_)), "{err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_is_provider_error() {
        let provider = CommandProvider::new("cat > /dev/null; echo boom >&2; exit 3", "m");
        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(err, CodevecError::Provider(_)), "{err:?}");
    }
}
