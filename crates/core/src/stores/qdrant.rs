use crate::error::VectorStoreError;
use crate::models::{Chunk, ContextFragment, FragmentOrigin};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantStore {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        }
    }

    /// Creates the collection with cosine distance if it does not exist.
    /// The index dimensionality is fixed here; every later upsert and query
    /// must match it exactly.
    pub async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        let response = self
            .client
            .get(format!("{}/collections/{}", self.endpoint, self.collection))
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }

        if !response.status().is_client_error() {
            return Err(VectorStoreError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let response = self
            .client
            .put(format!("{}/collections/{}", self.endpoint, self.collection))
            .json(&json!({
                "vectors": {
                    "size": self.vector_size,
                    "distance": "Cosine",
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VectorStoreError::Request(format!(
                "qdrant collection setup failed with {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Qdrant point ids must be u64 or UUID; deriving a UUID from the chunk id
/// keeps upserts idempotent by chunk identity.
fn point_id(chunk_id: &str) -> Uuid {
    let digest = Sha256::digest(chunk_id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn upsert_vectors(
        &self,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<(), VectorStoreError> {
        if chunks.len() != vectors.len() {
            return Err(VectorStoreError::Request(format!(
                "vector count {} doesn't match chunk count {}",
                vectors.len(),
                chunks.len()
            )));
        }

        let points = chunks
            .iter()
            .zip(vectors.iter())
            .map(|(chunk, vector)| {
                if vector.len() != self.vector_size {
                    return Err(VectorStoreError::Request(format!(
                        "vector dimension {} != {}",
                        vector.len(),
                        self.vector_size
                    )));
                }

                let payload = json!({
                    "chunk_id": chunk.chunk_id,
                    "document_id": chunk.document_id,
                    "source_file": chunk.source_file,
                    "chunk_index": chunk.chunk_index,
                    "page_numbers": chunk.page_numbers,
                    "text": chunk.text,
                });

                Ok(json!({
                    "id": point_id(&chunk.chunk_id).to_string(),
                    "vector": vector,
                    "payload": payload,
                }))
            })
            .collect::<Result<Vec<_>, VectorStoreError>>()?;

        if points.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VectorStoreError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ContextFragment>, VectorStoreError> {
        if query_vector.len() != self.vector_size {
            return Err(VectorStoreError::Request(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.vector_size
            )));
        }

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, self.collection
            ))
            .json(&json!({
                "vector": query_vector,
                "limit": top_k,
                "with_payload": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VectorStoreError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut fragments = Vec::new();
        for hit in hits {
            let chunk_id = hit
                .pointer("/payload/chunk_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let document_id = hit
                .pointer("/payload/document_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let source_file = hit
                .pointer("/payload/source_file")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let text = hit
                .pointer("/payload/text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let page_numbers = hit
                .pointer("/payload/page_numbers")
                .and_then(Value::as_array)
                .map(|pages| {
                    pages
                        .iter()
                        .filter_map(Value::as_u64)
                        .map(|page| page as u32)
                        .collect()
                })
                .unwrap_or_default();
            let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);

            fragments.push(ContextFragment {
                chunk_id,
                document_id,
                source_file,
                page_numbers,
                text,
                origin: FragmentOrigin::Vector,
                score: Some(score),
            });
        }

        Ok(fragments)
    }

    async fn vector_count(&self) -> Result<usize, VectorStoreError> {
        let response = self
            .client
            .get(format!("{}/collections/{}", self.endpoint, self.collection))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VectorStoreError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        Ok(parsed
            .pointer("/result/points_count")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_stable_per_chunk() {
        let first = point_id("chunk-abc");
        let second = point_id("chunk-abc");
        let other = point_id("chunk-def");
        assert_eq!(first, second);
        assert_ne!(first, other);
    }
}
