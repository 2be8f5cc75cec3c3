use crate::error::EmbeddingServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Converts text into a vector of the model's native dimensionality.
///
/// The engine applies [`fit_dimension`] to every result, so implementations
/// never pad or truncate themselves.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingServiceError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingServiceError> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }
}

/// Adjusts a model-native vector to the store's configured dimensionality.
///
/// Shorter vectors are zero-padded, longer ones truncated. Ingestion and
/// query time must go through this one function; applying different
/// adjustments on the two paths silently corrupts similarity scores.
pub fn fit_dimension(mut vector: Vec<f32>, target: usize) -> Vec<f32> {
    if vector.len() > target {
        vector.truncate(target);
    } else {
        vector.resize(target, 0.0);
    }
    vector
}

#[derive(Debug, Clone, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaEmbedResponse {
    embedding: Vec<f32>,
}

/// Embedding client for an Ollama-compatible `/api/embeddings` endpoint.
pub struct OllamaEmbedder {
    endpoint: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingServiceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            model: model.into(),
            client,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingServiceError> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.endpoint))
            .json(&OllamaEmbedRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EmbeddingServiceError::BackendResponse {
                backend: "ollama".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: OllamaEmbedResponse = response.json().await?;
        if parsed.embedding.is_empty() {
            return Err(EmbeddingServiceError::BackendResponse {
                backend: "ollama".to_string(),
                details: "empty embedding in response".to_string(),
            });
        }

        Ok(parsed.embedding)
    }
}

/// Deterministic offline embedder hashing character trigrams into a
/// fixed-size bucket vector, L2-normalized. Used by tests and as a
/// no-network fallback; not a substitute for a semantic model.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    pub dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dimensions: 128 }
    }
}

impl HashingEmbedder {
    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingServiceError> {
        Ok(self.embed_sync(text))
    }
}
