use crate::config::EntityMatching;
use crate::error::{GraphStoreError, VectorStoreError};
use crate::models::{Chunk, ContextFragment, Entity, Relationship};
use async_trait::async_trait;

/// Narrow interface to the vector store.
#[async_trait]
pub trait VectorIndex {
    /// Upserts one vector per chunk, keyed by the chunk identifier, so
    /// re-ingestion overwrites instead of duplicating.
    async fn upsert_vectors(
        &self,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<(), VectorStoreError>;

    /// Returns the `top_k` nearest records by cosine similarity, ranked by
    /// descending score, as vector-tagged context fragments.
    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ContextFragment>, VectorStoreError>;

    async fn vector_count(&self) -> Result<usize, VectorStoreError>;
}

/// Narrow interface to the graph store.
#[async_trait]
pub trait GraphIndex {
    /// Upserts the chunk's entities (by identity) and relation triples, plus
    /// the chunk back-reference that lets traversal reach chunk text.
    async fn upsert_graph(
        &self,
        chunk: &Chunk,
        entities: &[Entity],
        relationships: &[Relationship],
    ) -> Result<(), GraphStoreError>;

    /// Traverses up to `hops` relationship hops from entities whose names
    /// match the seed terms, returning graph-tagged fragments for chunks
    /// that mention the reached entities, in traversal order.
    async fn neighborhood(
        &self,
        seed_terms: &[String],
        hops: usize,
        matching: EntityMatching,
    ) -> Result<Vec<ContextFragment>, GraphStoreError>;

    /// (entity node count, relationship edge count).
    async fn graph_counts(&self) -> Result<(usize, usize), GraphStoreError>;
}
