use agro_rag_core::{
    validate_endpoint, ChunkingConfig, EngineConfig, FragmentOrigin, Neo4jStore, OllamaEmbedder,
    OllamaGenerator, QdrantStore, RagEngine, RetrievalConfig,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::Path;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "agro-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Ollama base URL (embeddings and generation)
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Embedding model name
    #[arg(long, default_value = "nomic-embed-text")]
    embed_model: String,

    /// Generative model name
    #[arg(long, default_value = "llama3.2")]
    generate_model: String,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, default_value = "agro_chunks")]
    qdrant_collection: String,

    /// Neo4j HTTP base URL
    #[arg(long, env = "NEO4J_URL", default_value = "http://localhost:7474")]
    neo4j_url: String,

    /// Neo4j database name
    #[arg(long, default_value = "neo4j")]
    neo4j_db: String,

    /// Neo4j username
    #[arg(long, env = "NEO4J_USER", default_value = "neo4j")]
    neo4j_user: String,

    /// Neo4j password
    #[arg(long, env = "NEO4J_PASSWORD", default_value = "password")]
    neo4j_password: String,

    /// Vector index dimensionality
    #[arg(long, default_value = "1024")]
    vector_dimensions: usize,

    /// Request timeout in seconds for model calls
    #[arg(long, default_value = "120")]
    model_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a document file or a folder of documents into both stores.
    Ingest {
        /// PDF, txt or md file, or a folder scanned recursively.
        #[arg(long)]
        path: String,

        /// Words per chunk.
        #[arg(long, default_value = "600")]
        chunk_words: usize,

        /// Words of overlap between consecutive chunks.
        #[arg(long, default_value = "100")]
        overlap_words: usize,
    },
    /// Answer a question from the ingested documents, with citations.
    Ask {
        /// Question text
        #[arg(long)]
        question: String,

        /// Nearest neighbours requested from the vector store.
        #[arg(long, default_value = "10")]
        top_k: usize,

        /// Relationship hops traversed from the seed entities.
        #[arg(long, default_value = "1")]
        graph_hops: usize,

        /// Print the retrieved context fragments before the answer.
        #[arg(long, default_value_t = false)]
        show_context: bool,
    },
    /// Print vector, entity and relationship counts from both stores.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let ollama_url = validate_endpoint(&cli.ollama_url)?;
    let qdrant_url = validate_endpoint(&cli.qdrant_url)?;
    let neo4j_url = validate_endpoint(&cli.neo4j_url)?;
    let timeout = Duration::from_secs(cli.model_timeout_secs);

    let mut config = EngineConfig {
        vector_dimensions: cli.vector_dimensions,
        ..Default::default()
    };
    match &cli.command {
        Command::Ingest {
            chunk_words,
            overlap_words,
            ..
        } => {
            config.chunking = ChunkingConfig {
                target_words: *chunk_words,
                overlap_words: *overlap_words,
            };
        }
        Command::Ask {
            top_k, graph_hops, ..
        } => {
            config.retrieval = RetrievalConfig {
                top_k: *top_k,
                graph_hops: *graph_hops,
                ..Default::default()
            };
        }
        Command::Stats => {}
    }

    let embedder = OllamaEmbedder::new(&ollama_url, &cli.embed_model, timeout)?;
    let generator = OllamaGenerator::new(&ollama_url, &cli.generate_model, timeout)?;
    let vector = QdrantStore::new(&qdrant_url, &cli.qdrant_collection, cli.vector_dimensions);
    let graph = Neo4jStore::new(&neo4j_url, &cli.neo4j_db, &cli.neo4j_user, &cli.neo4j_password);

    if matches!(cli.command, Command::Ingest { .. }) {
        vector.ensure_collection().await?;
    }

    let engine = RagEngine::new(embedder, vector, graph, generator, config)?;
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "agro-rag boot"
    );

    match cli.command {
        Command::Ingest { path, .. } => {
            let report = engine.ingest_path(Path::new(&path)).await?;
            println!(
                "{} chunks ingested, {} entities, {} relationships, {} chunks failed at {}",
                report.chunks_written,
                report.entities_written,
                report.relationships_written,
                report.chunks_failed,
                Utc::now().to_rfc3339()
            );
        }
        Command::Ask {
            question,
            show_context,
            ..
        } => {
            if show_context {
                let bundle = engine.retrieve(&question).await?;
                for fragment in &bundle.fragments {
                    let origin = match fragment.origin {
                        FragmentOrigin::Vector => "vector",
                        FragmentOrigin::Graph => "graph",
                    };
                    println!(
                        "[{}] {} pages={:?} chunk={}",
                        origin, fragment.source_file, fragment.page_numbers, fragment.chunk_id
                    );
                    println!("{}\n", fragment.text);
                }
            }

            let answer = engine.answer_question(&question).await?;
            println!("{}", answer.text);
            if !answer.citations.is_empty() {
                println!("\nSources:");
                for citation in &answer.citations {
                    let pages = citation
                        .pages
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    println!("  {} (pages {})", citation.source_file, pages);
                }
            }
        }
        Command::Stats => {
            let stats = engine.stats().await?;
            println!("vectors: {}", stats.vectors);
            println!("entity nodes: {}", stats.entity_nodes);
            println!("relationship edges: {}", stats.relationship_edges);
        }
    }

    Ok(())
}
