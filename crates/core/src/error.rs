use thiserror::Error;

/// Failure talking to the embedding model service.
#[derive(Debug, Error)]
pub enum EmbeddingServiceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("deserialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure talking to the vector store.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("vector store request failed: {0}")]
    Request(String),
}

/// Failure talking to the graph store.
#[derive(Debug, Error)]
pub enum GraphStoreError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("graph store request failed: {0}")]
    Request(String),
}

/// Failure talking to the generative model service.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("deserialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("embedding service error: {0}")]
    Embedding(#[from] EmbeddingServiceError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("graph store error: {0}")]
    GraphStore(#[from] GraphStoreError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("embedding service error: {0}")]
    Embedding(#[from] EmbeddingServiceError),

    #[error("retrieval unavailable: vector phase failed ({vector}); graph phase failed ({graph})")]
    RetrievalUnavailable { vector: String, graph: String },

    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("graph store error: {0}")]
    GraphStore(#[from] GraphStoreError),
}
