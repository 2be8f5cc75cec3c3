use crate::config::RetrievalConfig;
use crate::error::QueryError;
use crate::models::{ContextBundle, ContextFragment};
use crate::traits::{GraphIndex, VectorIndex};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Combines vector-similarity hits with graph-neighborhood expansion into
/// one deduplicated context bundle. Retrieval performs no writes, so an
/// abandoned query leaves nothing to clean up.
pub struct HybridRetriever<'a, V, G> {
    vector: &'a V,
    graph: &'a G,
    config: &'a RetrievalConfig,
}

impl<'a, V, G> HybridRetriever<'a, V, G>
where
    V: VectorIndex + Send + Sync,
    G: GraphIndex + Send + Sync,
{
    pub fn new(vector: &'a V, graph: &'a G, config: &'a RetrievalConfig) -> Self {
        Self {
            vector,
            graph,
            config,
        }
    }

    /// Runs both phases for an already-embedded question. A single failed
    /// phase degrades to the other; both failing is `RetrievalUnavailable`.
    /// No matches at all is an empty bundle, not an error.
    pub async fn retrieve(
        &self,
        question: &str,
        query_vector: &[f32],
    ) -> Result<ContextBundle, QueryError> {
        let mut vector_failure = None;
        let vector_hits = match self.vector.search(query_vector, self.config.top_k).await {
            Ok(mut hits) => {
                // Stores return ranked results; re-sort with a chunk-id
                // tiebreak so the bundle order is fully deterministic.
                hits.sort_by(|left, right| {
                    right
                        .score
                        .unwrap_or(0.0)
                        .total_cmp(&left.score.unwrap_or(0.0))
                        .then_with(|| left.chunk_id.cmp(&right.chunk_id))
                });
                hits
            }
            Err(error) => {
                warn!(%error, "vector phase failed, degrading to graph-only retrieval");
                vector_failure = Some(error.to_string());
                Vec::new()
            }
        };

        let seed_terms = extract_seed_terms(question, &vector_hits, self.config.max_seed_terms);

        let mut graph_failure = None;
        let graph_hits = if seed_terms.is_empty() {
            Vec::new()
        } else {
            match self
                .graph
                .neighborhood(&seed_terms, self.config.graph_hops, self.config.entity_matching)
                .await
            {
                Ok(hits) => hits,
                Err(error) => {
                    warn!(%error, "graph phase failed, degrading to vector-only retrieval");
                    graph_failure = Some(error.to_string());
                    Vec::new()
                }
            }
        };

        if let (Some(vector), Some(graph)) = (&vector_failure, &graph_failure) {
            return Err(QueryError::RetrievalUnavailable {
                vector: vector.clone(),
                graph: graph.clone(),
            });
        }

        let bundle = fuse_fragments(vector_hits, graph_hits, self.config.max_fragments);
        debug!(fragments = bundle.fragments.len(), "assembled context bundle");
        Ok(bundle)
    }
}

/// Seed terms for the graph phase: distinct lowercased words longer than
/// three characters, question words first, then vector-hit texts, in
/// first-seen order, capped. Keeps traversal input deterministic and bounded.
pub fn extract_seed_terms(
    question: &str,
    vector_hits: &[ContextFragment],
    max_terms: usize,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut terms = Vec::new();

    let mut push_words = |text: &str, terms: &mut Vec<String>| {
        for word in text.split_whitespace() {
            if terms.len() >= max_terms {
                return;
            }
            let cleaned: String = word
                .to_lowercase()
                .chars()
                .filter(|character| character.is_alphanumeric())
                .collect();
            if cleaned.len() > 3 && seen.insert(cleaned.clone()) {
                terms.push(cleaned);
            }
        }
    };

    push_words(question, &mut terms);
    for hit in vector_hits {
        if terms.len() >= max_terms {
            break;
        }
        push_words(&hit.text, &mut terms);
    }

    terms
}

/// Vector fragments first (they carry a direct relevance score), graph
/// fragments appended in traversal order; deduplicated by chunk id with the
/// first occurrence winning, then truncated to the bundle cap.
pub fn fuse_fragments(
    vector_hits: Vec<ContextFragment>,
    graph_hits: Vec<ContextFragment>,
    max_fragments: usize,
) -> ContextBundle {
    let mut seen = HashSet::new();
    let mut fragments = Vec::new();

    for fragment in vector_hits.into_iter().chain(graph_hits) {
        if fragments.len() >= max_fragments {
            break;
        }
        if seen.insert(fragment.chunk_id.clone()) {
            fragments.push(fragment);
        }
    }

    ContextBundle { fragments }
}
