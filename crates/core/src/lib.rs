pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod entities;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod models;
pub mod retrieval;
pub mod stores;
pub mod synthesis;
pub mod traits;
pub mod writer;

pub use chunking::chunk_pages;
pub use config::{
    ChunkingConfig, EngineConfig, EntityMatching, RetrievalConfig, SynthesisConfig,
    validate_endpoint,
};
pub use embeddings::{fit_dimension, Embedder, HashingEmbedder, OllamaEmbedder};
pub use engine::RagEngine;
pub use entities::extract_entities;
pub use error::{
    EmbeddingServiceError, GenerationError, GraphStoreError, IngestError, QueryError,
    VectorStoreError,
};
pub use extractor::{discover_source_files, extract_page_texts, PageText};
pub use generation::{GenerationOptions, OllamaGenerator, TextGenerator};
pub use models::{
    Answer, Chunk, Citation, ContextBundle, ContextFragment, DocumentFingerprint, Entity,
    EntityKind, FragmentOrigin, IngestReport, RelationKind, Relationship, StoreStats,
};
pub use retrieval::HybridRetriever;
pub use stores::{Neo4jStore, QdrantStore};
pub use synthesis::{render_prompt, synthesize, INSUFFICIENT_INFORMATION};
pub use traits::{GraphIndex, VectorIndex};
pub use writer::{DualStoreWriter, IdentityLocks, WriteOutcome};
