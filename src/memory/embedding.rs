//! Text embedding backends
//!
//! The engine treats embeddings as a black box: any `Embedder` that maps text
//! to a fixed-dimension vector will do. Two backends ship:
//!
//! - `HashingEmbedder`: deterministic feature hashing, needs no model or network.
//! - `OllamaEmbedder`: calls a local Ollama server (`/api/embed`, falling back
//!   to the legacy `/api/embeddings`).
//!
//! Empty input always embeds to the zero vector.

use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::memory::vector::normalize;
use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Pluggable text → vector function.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a text. Implementations must return `dimension()` values.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Output dimension
    fn dimension(&self) -> usize;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Construct the configured embedder
pub fn build_embedder(config: &EmbeddingConfig) -> Arc<dyn Embedder> {
    match config.provider {
        EmbeddingProvider::Hashing => Arc::new(HashingEmbedder::new(config.dimension)),
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbedder::new(
            &config.base_url,
            &config.model,
            config.dimension,
        )),
    }
}

// =============================================================================
// Feature hashing
// =============================================================================

/// Deterministic bag-of-features embedder.
///
/// Every lower-cased word and every character trigram of a word is hashed with
/// SHA-256 into a signed bucket; the result is L2-normalized. Texts sharing
/// vocabulary (including inflections, via trigrams) land close together.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Synchronous embedding, shared by the async trait method
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();

        for word in &words {
            self.accumulate(&mut vector, word.as_bytes(), 1.0);
            let chars: Vec<char> = format!("#{}#", word).chars().collect();
            if chars.len() > 4 {
                for gram in chars.windows(3) {
                    let gram: String = gram.iter().collect();
                    self.accumulate(&mut vector, gram.as_bytes(), 0.5);
                }
            }
        }

        normalize(&mut vector);
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let digest = Sha256::digest(feature);
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

// =============================================================================
// Ollama
// =============================================================================

/// Embedder backed by an Ollama server
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, dimension: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
        }
    }

    /// POST /api/embed { model, input } → { embeddings: [[f32...]] }
    async fn embed_current(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let resp = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&json!({ "model": self.model, "input": text }))
            .timeout(Duration::from_secs(60))
            .send()
            .await?;

        if !resp.status().is_success() {
            tracing::debug!(status = %resp.status(), "Ollama /api/embed failed, trying legacy endpoint");
            return Ok(None);
        }

        let body: Value = resp.json().await?;
        let first = body["embeddings"]
            .as_array()
            .and_then(|all| all.first())
            .or_else(|| body.get("embedding"));
        Ok(first.and_then(parse_vector))
    }

    /// POST /api/embeddings { model, prompt } → { embedding: [f32...] }
    async fn embed_legacy(&self, text: &str) -> Result<Vec<f32>> {
        let resp = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&json!({ "model": self.model, "prompt": text }))
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| {
                Error::Embedding(format!("Ollama not reachable at {}: {}", self.base_url, e))
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!("Ollama embed {}: {}", status, text)));
        }

        let body: Value = resp.json().await?;
        body.get("embedding")
            .and_then(parse_vector)
            .ok_or_else(|| Error::Embedding("no 'embedding' array in Ollama response".to_string()))
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let vector = match self.embed_current(text).await? {
            Some(v) => v,
            None => self.embed_legacy(text).await?,
        };

        if vector.len() != self.dimension {
            return Err(Error::Embedding(format!(
                "model '{}' returned {} dimensions, expected {}",
                self.model,
                vector.len(),
                self.dimension
            )));
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

fn parse_vector(value: &Value) -> Option<Vec<f32>> {
    let vector: Vec<f32> = value
        .as_array()?
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect();
    (!vector.is_empty()).then_some(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::vector::cosine_similarity;

    #[test]
    fn test_hashing_dimension_and_norm() {
        let embedder = HashingEmbedder::new(384);
        let v = embedder.embed_sync("JWT token refresh logic");
        assert_eq!(v.len(), 384);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_hashing_empty_is_zero_vector() {
        let embedder = HashingEmbedder::new(16);
        let v = tokio_test::block_on(embedder.embed("")).unwrap();
        assert_eq!(v, vec![0.0; 16]);
    }

    #[test]
    fn test_hashing_is_deterministic() {
        let embedder = HashingEmbedder::new(128);
        assert_eq!(
            embedder.embed_sync("refresh the token"),
            embedder.embed_sync("refresh the token")
        );
    }

    #[test]
    fn test_hashing_similar_texts_are_closer() {
        let embedder = HashingEmbedder::new(384);
        let query = embedder.embed_sync("stuck on a bug in the JWT token refresh logic");
        let related = embedder.embed_sync("JWT refresh tokens expire after 15 minutes");
        let unrelated = embedder.embed_sync("Grateful for the kind words about the garden");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_parse_vector() {
        assert_eq!(parse_vector(&json!([0.5, 1])), Some(vec![0.5, 1.0]));
        assert_eq!(parse_vector(&json!([])), None);
        assert_eq!(parse_vector(&json!("nope")), None);
    }

    #[test]
    fn test_build_embedder_from_config() {
        let embedder = build_embedder(&EmbeddingConfig::default());
        assert_eq!(embedder.name(), "hashing");
        assert_eq!(embedder.dimension(), 384);
    }

    #[tokio::test]
    async fn test_ollama_empty_text_short_circuits() {
        let embedder = OllamaEmbedder::new("http://127.0.0.1:9", "all-minilm", 8);
        assert_eq!(embedder.embed("  ").await.unwrap(), vec![0.0; 8]);
    }
}
