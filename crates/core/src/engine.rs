use crate::chunking::chunk_pages;
use crate::config::EngineConfig;
use crate::embeddings::{fit_dimension, Embedder};
use crate::entities::extract_entities;
use crate::error::{EmbeddingServiceError, IngestError, QueryError};
use crate::extractor::{discover_source_files, extract_page_texts, PageText};
use crate::generation::TextGenerator;
use crate::models::{Answer, ContextBundle, DocumentFingerprint, IngestReport, StoreStats};
use crate::retrieval::HybridRetriever;
use crate::synthesis::synthesize;
use crate::traits::{GraphIndex, VectorIndex};
use crate::writer::{DualStoreWriter, IdentityLocks};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{info, warn};

/// Embedding is the dominant ingestion cost; chunks are independent, so a
/// few requests run in flight at once.
const EMBED_CONCURRENCY: usize = 4;

/// The Hybrid-RAG engine: owns the store clients and model adapters, and is
/// passed by reference into callers. Safe for concurrent use across
/// requests; no ambient global state.
pub struct RagEngine<E, V, G, T> {
    embedder: E,
    vector: V,
    graph: G,
    generator: T,
    config: EngineConfig,
    entity_locks: IdentityLocks,
}

impl<E, V, G, T> RagEngine<E, V, G, T>
where
    E: Embedder,
    V: VectorIndex + Send + Sync,
    G: GraphIndex + Send + Sync,
    T: TextGenerator,
{
    /// Validates the configuration up front; bad chunk sizes or a zero
    /// vector dimension are fatal here, not at first use.
    pub fn new(
        embedder: E,
        vector: V,
        graph: G,
        generator: T,
        config: EngineConfig,
    ) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self {
            embedder,
            vector,
            graph,
            generator,
            config,
            entity_locks: IdentityLocks::default(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The one embedding path: model-native vector adjusted to the store's
    /// dimensionality. Both ingestion and querying go through here.
    async fn embed_fitted(&self, text: &str) -> Result<Vec<f32>, EmbeddingServiceError> {
        let native = self.embedder.embed(text).await?;
        Ok(fit_dimension(native, self.config.vector_dimensions))
    }

    /// Ingests a file, or every supported file under a folder. File-level
    /// failures inside a folder are logged and skipped.
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestReport, IngestError> {
        if !path.is_dir() {
            return self.ingest_file(path).await;
        }

        let files = discover_source_files(path);
        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no ingestable files found in {}",
                path.display()
            )));
        }

        let mut report = IngestReport::default();
        for file in files {
            match self.ingest_file(&file).await {
                Ok(file_report) => {
                    report.chunks_written += file_report.chunks_written;
                    report.entities_written += file_report.entities_written;
                    report.relationships_written += file_report.relationships_written;
                    report.chunks_failed += file_report.chunks_failed;
                }
                Err(error) => {
                    warn!(path = %file.display(), %error, "skipped unreadable source file");
                }
            }
        }
        Ok(report)
    }

    async fn ingest_file(&self, path: &Path) -> Result<IngestReport, IngestError> {
        let source_file = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
            })?
            .to_string();

        let pages = extract_page_texts(path)?;
        self.ingest_pages(&source_file, &pages).await
    }

    /// Ingests an already-loaded page sequence: chunk, embed, extract
    /// entities, dual-store write. A failed external call skips that chunk
    /// and counts it; the batch always runs to completion.
    pub async fn ingest_pages(
        &self,
        source_file: &str,
        pages: &[PageText],
    ) -> Result<IngestReport, IngestError> {
        let fingerprint = fingerprint_pages(source_file, pages);
        let chunks = chunk_pages(&fingerprint, pages, &self.config.chunking)?;

        if chunks.is_empty() {
            return Ok(IngestReport::default());
        }
        info!(
            source_file,
            document_id = %fingerprint.document_id,
            chunk_count = chunks.len(),
            "ingesting document"
        );

        let embeddings: Vec<Result<Vec<f32>, EmbeddingServiceError>> =
            stream::iter(chunks.iter().map(|chunk| self.embed_fitted(&chunk.text)))
                .buffered(EMBED_CONCURRENCY)
                .collect()
                .await;

        let writer = DualStoreWriter::new(&self.vector, &self.graph, &self.entity_locks);
        let mut report = IngestReport::default();

        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let embedding = match embedding {
                Ok(embedding) => embedding,
                Err(error) => {
                    warn!(
                        document_id = %chunk.document_id,
                        chunk_id = %chunk.chunk_id,
                        %error,
                        "embedding failed, skipping chunk"
                    );
                    report.chunks_failed += 1;
                    continue;
                }
            };

            let (entities, relationships) =
                match extract_entities(&self.generator, &chunk.text).await {
                    Ok(extracted) => extracted,
                    Err(error) => {
                        warn!(
                            chunk_id = %chunk.chunk_id,
                            %error,
                            "entity extraction failed, indexing chunk without graph entries"
                        );
                        (Vec::new(), Vec::new())
                    }
                };

            let outcome = writer.write(chunk, &embedding, &entities, &relationships).await;
            if outcome.vector_ok() {
                report.chunks_written += 1;
            } else {
                report.chunks_failed += 1;
            }
            if outcome.graph_ok() {
                report.entities_written += entities.len();
                report.relationships_written += relationships.len();
            }
        }

        info!(
            source_file,
            chunks_written = report.chunks_written,
            entities_written = report.entities_written,
            relationships_written = report.relationships_written,
            chunks_failed = report.chunks_failed,
            "ingestion finished"
        );
        Ok(report)
    }

    /// Embeds the question and runs hybrid retrieval. Performs no writes.
    pub async fn retrieve(&self, question: &str) -> Result<ContextBundle, QueryError> {
        if question.trim().is_empty() {
            return Err(QueryError::EmptyQuestion);
        }

        let query_vector = self.embed_fitted(question).await?;
        HybridRetriever::new(&self.vector, &self.graph, &self.config.retrieval)
            .retrieve(question, &query_vector)
            .await
    }

    /// Full query path: retrieve, then synthesize a cited answer.
    pub async fn answer_question(&self, question: &str) -> Result<Answer, QueryError> {
        let bundle = self.retrieve(question).await?;
        synthesize(&self.generator, question, &bundle, &self.config.synthesis).await
    }

    pub async fn stats(&self) -> Result<StoreStats, QueryError> {
        let vectors = self.vector.vector_count().await?;
        let (entity_nodes, relationship_edges) = self.graph.graph_counts().await?;
        Ok(StoreStats {
            vectors,
            entity_nodes,
            relationship_edges,
        })
    }
}

/// Stable document identity from the source name, content checksum over the
/// page texts. Re-ingesting the same file keeps the same document and chunk
/// ids, which is what makes the dual-store upserts idempotent.
fn fingerprint_pages(source_file: &str, pages: &[PageText]) -> DocumentFingerprint {
    let mut hasher = Sha256::new();
    for page in pages {
        hasher.update(page.number.to_le_bytes());
        hasher.update(page.text.as_bytes());
    }
    let checksum = format!("{:x}", hasher.finalize());

    let document_id = format!("{:x}", Sha256::digest(source_file.as_bytes()));

    DocumentFingerprint {
        document_id,
        source_file: source_file.to_string(),
        checksum,
        page_count: pages.len(),
        ingested_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChunkingConfig, EntityMatching};
    use crate::embeddings::HashingEmbedder;
    use crate::error::{GenerationError, GraphStoreError, VectorStoreError};
    use crate::generation::GenerationOptions;
    use crate::models::{Chunk, ContextFragment, Entity, FragmentOrigin, Relationship};
    use crate::synthesis::INSUFFICIENT_INFORMATION;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryVectorStore {
        records: Mutex<HashMap<String, (Chunk, Vec<f32>)>>,
    }

    fn cosine(left: &[f32], right: &[f32]) -> f64 {
        let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
        let left_norm: f32 = left.iter().map(|value| value * value).sum::<f32>().sqrt();
        let right_norm: f32 = right.iter().map(|value| value * value).sum::<f32>().sqrt();
        if left_norm == 0.0 || right_norm == 0.0 {
            0.0
        } else {
            (dot / (left_norm * right_norm)) as f64
        }
    }

    #[async_trait]
    impl VectorIndex for InMemoryVectorStore {
        async fn upsert_vectors(
            &self,
            chunks: &[Chunk],
            vectors: &[Vec<f32>],
        ) -> Result<(), VectorStoreError> {
            let mut records = self.records.lock().unwrap();
            for (chunk, vector) in chunks.iter().zip(vectors) {
                records.insert(chunk.chunk_id.clone(), (chunk.clone(), vector.clone()));
            }
            Ok(())
        }

        async fn search(
            &self,
            query_vector: &[f32],
            top_k: usize,
        ) -> Result<Vec<ContextFragment>, VectorStoreError> {
            let records = self.records.lock().unwrap();
            let mut scored: Vec<(f64, &Chunk)> = records
                .values()
                .map(|(chunk, vector)| (cosine(query_vector, vector), chunk))
                .filter(|(score, _)| *score > 0.0)
                .collect();
            scored.sort_by(|left, right| {
                right
                    .0
                    .total_cmp(&left.0)
                    .then_with(|| left.1.chunk_id.cmp(&right.1.chunk_id))
            });

            Ok(scored
                .into_iter()
                .take(top_k)
                .map(|(score, chunk)| ContextFragment {
                    chunk_id: chunk.chunk_id.clone(),
                    document_id: chunk.document_id.clone(),
                    source_file: chunk.source_file.clone(),
                    page_numbers: chunk.page_numbers.clone(),
                    text: chunk.text.clone(),
                    origin: FragmentOrigin::Vector,
                    score: Some(score),
                })
                .collect())
        }

        async fn vector_count(&self) -> Result<usize, VectorStoreError> {
            Ok(self.records.lock().unwrap().len())
        }
    }

    #[derive(Default)]
    struct GraphData {
        entities: HashMap<String, Entity>,
        edges: HashSet<(String, String, String)>,
        chunks: Vec<(Chunk, HashSet<String>)>,
    }

    #[derive(Default)]
    struct InMemoryGraphStore {
        data: Mutex<GraphData>,
    }

    #[async_trait]
    impl GraphIndex for InMemoryGraphStore {
        async fn upsert_graph(
            &self,
            chunk: &Chunk,
            entities: &[Entity],
            relationships: &[Relationship],
        ) -> Result<(), GraphStoreError> {
            let mut data = self.data.lock().unwrap();
            let mut mentioned = HashSet::new();
            for entity in entities {
                data.entities.insert(entity.identity(), entity.clone());
                mentioned.insert(entity.identity());
            }
            for relationship in relationships {
                data.edges.insert((
                    relationship.from.to_lowercase(),
                    relationship.to.to_lowercase(),
                    relationship.kind.label().to_string(),
                ));
            }
            if let Some(existing) = data
                .chunks
                .iter_mut()
                .find(|(stored, _)| stored.chunk_id == chunk.chunk_id)
            {
                existing.1.extend(mentioned);
            } else {
                data.chunks.push((chunk.clone(), mentioned));
            }
            Ok(())
        }

        async fn neighborhood(
            &self,
            seed_terms: &[String],
            hops: usize,
            matching: EntityMatching,
        ) -> Result<Vec<ContextFragment>, GraphStoreError> {
            let data = self.data.lock().unwrap();

            let mut reached: HashSet<String> = data
                .entities
                .values()
                .filter(|entity| {
                    let name_key = entity.name.to_lowercase();
                    seed_terms.iter().any(|term| match matching {
                        EntityMatching::Exact => name_key == *term,
                        EntityMatching::Contains => name_key.contains(term),
                    })
                })
                .map(Entity::identity)
                .collect();

            for _ in 0..hops {
                let names: HashSet<String> = reached
                    .iter()
                    .filter_map(|identity| data.entities.get(identity))
                    .map(|entity| entity.name.to_lowercase())
                    .collect();
                let expanded: Vec<String> = data
                    .edges
                    .iter()
                    .flat_map(|(from, to, _)| {
                        let mut next = Vec::new();
                        if names.contains(from) {
                            next.push(to.clone());
                        }
                        if names.contains(to) {
                            next.push(from.clone());
                        }
                        next
                    })
                    .collect();
                for name in expanded {
                    if let Some(entity) = data
                        .entities
                        .values()
                        .find(|entity| entity.name.to_lowercase() == name)
                    {
                        reached.insert(entity.identity());
                    }
                }
            }

            Ok(data
                .chunks
                .iter()
                .filter(|(_, mentioned)| !mentioned.is_disjoint(&reached))
                .map(|(chunk, _)| ContextFragment {
                    chunk_id: chunk.chunk_id.clone(),
                    document_id: chunk.document_id.clone(),
                    source_file: chunk.source_file.clone(),
                    page_numbers: chunk.page_numbers.clone(),
                    text: chunk.text.clone(),
                    origin: FragmentOrigin::Graph,
                    score: None,
                })
                .collect())
        }

        async fn graph_counts(&self) -> Result<(usize, usize), GraphStoreError> {
            let data = self.data.lock().unwrap();
            Ok((data.entities.len(), data.edges.len()))
        }
    }

    struct FailingGraphStore;

    #[async_trait]
    impl GraphIndex for FailingGraphStore {
        async fn upsert_graph(
            &self,
            _chunk: &Chunk,
            _entities: &[Entity],
            _relationships: &[Relationship],
        ) -> Result<(), GraphStoreError> {
            Err(GraphStoreError::Request("graph store down".to_string()))
        }

        async fn neighborhood(
            &self,
            _seed_terms: &[String],
            _hops: usize,
            _matching: EntityMatching,
        ) -> Result<Vec<ContextFragment>, GraphStoreError> {
            Err(GraphStoreError::Request("graph store down".to_string()))
        }

        async fn graph_counts(&self) -> Result<(usize, usize), GraphStoreError> {
            Err(GraphStoreError::Request("graph store down".to_string()))
        }
    }

    /// Answers extraction prompts with a fixed entity payload and everything
    /// else with a short canned answer, counting the answer calls.
    #[derive(Default)]
    struct ScriptedGenerator {
        answer_calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(
            &self,
            prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, GenerationError> {
            if prompt.contains("Return ONLY valid JSON") {
                return Ok(r#"{
                    "entities": [
                        {"name": "Wheat", "type": "Crop"},
                        {"name": "Wheat rust", "type": "Disease", "description": "fungal disease"},
                        {"name": "Fungicide", "type": "Chemical"}
                    ],
                    "relationships": [
                        {"from": "Wheat rust", "to": "Wheat", "type": "AFFECTS"},
                        {"from": "Fungicide", "to": "Wheat rust", "type": "TREATS"}
                    ]
                }"#
                .to_string());
            }
            self.answer_calls.fetch_add(1, Ordering::SeqCst);
            Ok("A fungal pathogen causes wheat rust; fungicide spraying controls it.".to_string())
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            vector_dimensions: 80,
            chunking: ChunkingConfig {
                target_words: 10,
                overlap_words: 2,
            },
            ..Default::default()
        }
    }

    fn wheat_pages() -> Vec<PageText> {
        vec![
            PageText {
                number: 1,
                text: "Wheat rust is a fungal disease.".to_string(),
            },
            PageText {
                number: 2,
                text: "Control involves fungicide spraying.".to_string(),
            },
        ]
    }

    fn engine() -> RagEngine<HashingEmbedder, InMemoryVectorStore, InMemoryGraphStore, ScriptedGenerator>
    {
        RagEngine::new(
            // 64-dim native embedder against an 80-dim index exercises the
            // shared padding path on both ingestion and query.
            HashingEmbedder { dimensions: 64 },
            InMemoryVectorStore::default(),
            InMemoryGraphStore::default(),
            ScriptedGenerator::default(),
            test_config(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn end_to_end_question_cites_the_ingested_page() {
        let engine = engine();
        let report = engine
            .ingest_pages("agriculture_guide.pdf", &wheat_pages())
            .await
            .unwrap();

        assert_eq!(report.chunks_written, 1);
        assert_eq!(report.chunks_failed, 0);
        assert!(report.entities_written >= 3);
        assert!(report.relationships_written >= 2);

        let answer = engine
            .answer_question("What causes wheat disease?")
            .await
            .unwrap();

        assert!(answer.grounded);
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].source_file, "agriculture_guide.pdf");
        assert!(answer.citations[0].pages.contains(&1));
        assert!(!answer.text.contains("agriculture_guide"));
    }

    #[tokio::test]
    async fn reingestion_is_idempotent_for_both_stores() {
        let engine = engine();
        engine
            .ingest_pages("agriculture_guide.pdf", &wheat_pages())
            .await
            .unwrap();
        let first = engine.stats().await.unwrap();

        engine
            .ingest_pages("agriculture_guide.pdf", &wheat_pages())
            .await
            .unwrap();
        let second = engine.stats().await.unwrap();

        assert_eq!(first.vectors, second.vectors);
        assert_eq!(first.entity_nodes, second.entity_nodes);
        assert_eq!(first.relationship_edges, second.relationship_edges);
    }

    #[tokio::test]
    async fn no_vector_hits_returns_fixed_answer_without_generation() {
        let engine = engine();
        // Nothing ingested: vector search has no records to match.
        let answer = engine
            .answer_question("What causes wheat disease?")
            .await
            .unwrap();

        assert_eq!(answer.text, INSUFFICIENT_INFORMATION);
        assert!(!answer.grounded);
        assert!(answer.citations.is_empty());
        assert_eq!(engine.generator.answer_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn graph_outage_still_yields_a_vector_only_answer() {
        let engine = RagEngine::new(
            HashingEmbedder { dimensions: 64 },
            InMemoryVectorStore::default(),
            FailingGraphStore,
            ScriptedGenerator::default(),
            test_config(),
        )
        .unwrap();

        // Graph writes fail during ingestion; vector writes still land.
        let report = engine
            .ingest_pages("agriculture_guide.pdf", &wheat_pages())
            .await
            .unwrap();
        assert_eq!(report.chunks_written, 1);
        assert_eq!(report.entities_written, 0);

        let bundle = engine.retrieve("What causes wheat disease?").await.unwrap();
        assert!(!bundle.is_empty());
        assert!(bundle
            .fragments
            .iter()
            .all(|fragment| fragment.origin == FragmentOrigin::Vector));

        let answer = engine
            .answer_question("What causes wheat disease?")
            .await
            .unwrap();
        assert!(answer.grounded);
    }

    #[tokio::test]
    async fn repeated_retrieval_returns_identical_bundles() {
        let engine = engine();
        engine
            .ingest_pages("agriculture_guide.pdf", &wheat_pages())
            .await
            .unwrap();

        let first = engine.retrieve("What causes wheat disease?").await.unwrap();
        let second = engine.retrieve("What causes wheat disease?").await.unwrap();

        let ids = |bundle: &ContextBundle| {
            bundle
                .fragments
                .iter()
                .map(|fragment| (fragment.chunk_id.clone(), fragment.origin))
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
    }

    #[tokio::test]
    async fn graph_phase_contributes_fragments_for_related_entities() {
        let engine = engine();
        engine
            .ingest_pages("agriculture_guide.pdf", &wheat_pages())
            .await
            .unwrap();

        let bundle = engine.retrieve("What causes wheat disease?").await.unwrap();
        // The single chunk is found by the vector phase first, so the graph
        // copy is deduplicated away; first occurrence wins.
        assert_eq!(
            bundle
                .fragments
                .iter()
                .filter(|fragment| fragment.origin == FragmentOrigin::Vector)
                .count(),
            1
        );
        assert_eq!(bundle.fragments.len(), 1);
    }

    #[tokio::test]
    async fn empty_question_is_rejected() {
        let engine = engine();
        assert!(matches!(
            engine.answer_question("   ").await,
            Err(QueryError::EmptyQuestion)
        ));
    }

    #[tokio::test]
    async fn invalid_configuration_fails_at_construction() {
        let config = EngineConfig {
            chunking: ChunkingConfig {
                target_words: 5,
                overlap_words: 9,
            },
            ..Default::default()
        };
        let result = RagEngine::new(
            HashingEmbedder::default(),
            InMemoryVectorStore::default(),
            InMemoryGraphStore::default(),
            ScriptedGenerator::default(),
            config,
        );
        assert!(matches!(result, Err(IngestError::InvalidConfiguration(_))));
    }

    #[test]
    fn fingerprints_are_stable_across_runs() {
        let pages = wheat_pages();
        let first = fingerprint_pages("agriculture_guide.pdf", &pages);
        let second = fingerprint_pages("agriculture_guide.pdf", &pages);
        assert_eq!(first.document_id, second.document_id);
        assert_eq!(first.checksum, second.checksum);
        assert_eq!(first.page_count, 2);
    }
}
