use crate::error::IngestError;
use serde::{Deserialize, Serialize};

/// How vector-hit text is matched against graph entity names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityMatching {
    /// Seed term must equal the lowercased entity name.
    Exact,
    /// Entity name contains the seed term (the original system's behavior).
    Contains,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub target_words: usize,
    pub overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_words: 600,
            overlap_words: 100,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.target_words == 0 || self.overlap_words == 0 {
            return Err(IngestError::InvalidConfiguration(
                "chunk target and overlap must both be > 0".to_string(),
            ));
        }
        if self.overlap_words >= self.target_words {
            return Err(IngestError::InvalidConfiguration(format!(
                "chunk overlap {} must be smaller than target {}",
                self.overlap_words, self.target_words
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Nearest neighbours requested from the vector store.
    pub top_k: usize,
    /// Relationship hops traversed from the seed entities.
    pub graph_hops: usize,
    /// Hard cap on the context bundle, bounds the prompt length.
    pub max_fragments: usize,
    /// Cap on seed terms passed to the graph phase.
    pub max_seed_terms: usize,
    pub entity_matching: EntityMatching,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            graph_hops: 1,
            max_fragments: 8,
            max_seed_terms: 32,
            entity_matching: EntityMatching::Contains,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop_sequences: Vec<String>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_tokens: 150,
            temperature: 0.2,
            stop_sequences: vec!["\n\n\n".to_string(), "QUESTION:".to_string()],
        }
    }
}

/// All engine tuning in one explicit struct, constructed once and passed in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Dimensionality the vector store index was created with.
    pub vector_dimensions: usize,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub synthesis: SynthesisConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vector_dimensions: 1024,
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            synthesis: SynthesisConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.vector_dimensions == 0 {
            return Err(IngestError::InvalidConfiguration(
                "vector dimensionality must be > 0".to_string(),
            ));
        }
        if self.retrieval.max_fragments == 0 {
            return Err(IngestError::InvalidConfiguration(
                "retrieval.max_fragments must be > 0".to_string(),
            ));
        }
        self.chunking.validate()
    }
}

/// Validates a service endpoint URL up front so a typo fails at startup
/// instead of on the first request.
pub fn validate_endpoint(raw: &str) -> Result<String, IngestError> {
    let parsed = url::Url::parse(raw)
        .map_err(|error| IngestError::InvalidConfiguration(format!("bad endpoint {raw}: {error}")))?;
    Ok(parsed.to_string().trim_end_matches('/').to_string())
}
