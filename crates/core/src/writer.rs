use crate::models::{Chunk, Entity, Relationship};
use crate::traits::{GraphIndex, VectorIndex};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

/// Per-entity-identity locks. Concurrent chunks mentioning the same entity
/// serialize their graph upserts; distinct identities proceed in parallel.
#[derive(Default)]
pub struct IdentityLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IdentityLocks {
    /// Acquires locks for all given identities in sorted order, so two
    /// writers locking overlapping sets cannot deadlock.
    pub async fn lock_all(&self, identities: &[String]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted: Vec<&String> = identities.iter().collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for identity in sorted {
            let lock = {
                let mut locks = self.locks.lock().await;
                locks
                    .entry(identity.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone()
            };
            guards.push(lock.lock_owned().await);
        }
        guards
    }
}

/// Which side of a dual write succeeded. The two stores are not
/// transactional with each other; a partial write is logged with enough
/// identifying data for a later re-ingestion pass, never rolled back.
#[derive(Debug, Default)]
pub struct WriteOutcome {
    pub vector_error: Option<String>,
    pub graph_error: Option<String>,
}

impl WriteOutcome {
    pub fn vector_ok(&self) -> bool {
        self.vector_error.is_none()
    }

    pub fn graph_ok(&self) -> bool {
        self.graph_error.is_none()
    }

    pub fn fully_ok(&self) -> bool {
        self.vector_ok() && self.graph_ok()
    }
}

/// Correlated, best-effort writer across the vector and graph stores.
pub struct DualStoreWriter<'a, V, G> {
    vector: &'a V,
    graph: &'a G,
    locks: &'a IdentityLocks,
}

impl<'a, V, G> DualStoreWriter<'a, V, G>
where
    V: VectorIndex + Send + Sync,
    G: GraphIndex + Send + Sync,
{
    pub fn new(vector: &'a V, graph: &'a G, locks: &'a IdentityLocks) -> Self {
        Self {
            vector,
            graph,
            locks,
        }
    }

    pub async fn write(
        &self,
        chunk: &Chunk,
        vector: &[f32],
        entities: &[Entity],
        relationships: &[Relationship],
    ) -> WriteOutcome {
        let mut outcome = WriteOutcome::default();

        if let Err(error) = self
            .vector
            .upsert_vectors(std::slice::from_ref(chunk), &[vector.to_vec()])
            .await
        {
            warn!(
                document_id = %chunk.document_id,
                chunk_id = %chunk.chunk_id,
                %error,
                "vector store write failed"
            );
            outcome.vector_error = Some(error.to_string());
        }

        let identities: Vec<String> = entities.iter().map(Entity::identity).collect();
        let _guards = self.locks.lock_all(&identities).await;

        if let Err(error) = self.graph.upsert_graph(chunk, entities, relationships).await {
            warn!(
                document_id = %chunk.document_id,
                chunk_id = %chunk.chunk_id,
                %error,
                "graph store write failed"
            );
            outcome.graph_error = Some(error.to_string());
        }

        if outcome.vector_ok() != outcome.graph_ok() {
            warn!(
                document_id = %chunk.document_id,
                chunk_id = %chunk.chunk_id,
                vector_ok = outcome.vector_ok(),
                graph_ok = outcome.graph_ok(),
                "partial dual-store write, re-ingest this document to reconcile"
            );
        }

        outcome
    }
}
