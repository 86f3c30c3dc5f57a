use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_rag_core::{
    ChunkingConfig, EmbeddingConfig, EmbeddingGateway, GenerationConfig, GenerationGateway,
    HttpEmbeddingBackend, HttpGenerationBackend, IndexError, LopdfExtractor, QueryError,
    RagService, ServiceConfig, DEFAULT_TOP_K,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const EXIT_NO_INDEX: u8 = 2;
const EXIT_BUILD_FAILED: u8 = 3;
const EXIT_QUERY_FAILED: u8 = 4;

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Base URL of the OpenAI-compatible embedding service
    #[arg(long, default_value = "http://localhost:8080/v1")]
    embedding_url: String,

    /// Embedding model identifier
    #[arg(long, default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Base URL of the OpenAI-compatible generation service
    #[arg(long, default_value = "http://localhost:8080/v1")]
    generation_url: String,

    /// Generation model identifier
    #[arg(long, default_value = "gpt-4o-mini")]
    generation_model: String,

    /// API key sent as a bearer token to both services
    #[arg(long, env = "PDF_RAG_API_KEY")]
    api_key: Option<String>,

    /// Location of the persisted index
    #[arg(long, default_value = "pdf_rag_index.json")]
    index_path: PathBuf,

    /// Gateway request timeout in seconds
    #[arg(long, default_value = "60")]
    request_timeout_secs: u64,

    /// Chunk window size in characters
    #[arg(long, default_value = "2000")]
    chunk_chars: usize,

    /// Overlap between consecutive chunks in characters
    #[arg(long, default_value = "500")]
    overlap_chars: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the vector index from a folder of PDFs.
    Rebuild {
        /// Folder that contains PDFs recursively.
        #[arg(long)]
        folder: String,
    },
    /// Ask a question against the persisted index.
    Ask {
        /// The question to answer.
        #[arg(long)]
        question: String,
        /// Number of passages to retrieve as context.
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.request_timeout_secs);

    let embedder = EmbeddingGateway::new(
        HttpEmbeddingBackend::new(
            &cli.embedding_url,
            &cli.embedding_model,
            cli.api_key.clone(),
            timeout,
        ),
        EmbeddingConfig::default(),
    );
    let generator = GenerationGateway::new(
        HttpGenerationBackend::new(
            &cli.generation_url,
            &cli.generation_model,
            cli.api_key.clone(),
            timeout,
        ),
        GenerationConfig::default(),
    );

    let mut config = ServiceConfig::new(cli.index_path.clone());
    config.chunking = ChunkingConfig {
        chunk_chars: cli.chunk_chars,
        overlap_chars: cli.overlap_chars,
    };
    if let Command::Ask { top_k, .. } = &cli.command {
        config.top_k = *top_k;
    }

    let service = RagService::new(embedder, generator, Box::new(LopdfExtractor), config);

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-rag boot"
    );

    match cli.command {
        Command::Rebuild { folder } => {
            match service.rebuild_index(Path::new(&folder)).await {
                Ok(report) => {
                    if !report.skipped_files.is_empty() {
                        warn!(
                            "skipped_files={} for folder={}",
                            report.skipped_files.len(),
                            folder
                        );
                        for skipped in &report.skipped_files {
                            warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
                        }
                    }

                    println!(
                        "{} chunks from {} documents ({} pages, {} dims) indexed at {}",
                        report.chunks,
                        report.documents,
                        report.pages,
                        report.dimensions,
                        Utc::now().to_rfc3339()
                    );
                    ExitCode::SUCCESS
                }
                Err(error) => {
                    eprintln!("build failed: {error}");
                    ExitCode::from(EXIT_BUILD_FAILED)
                }
            }
        }
        Command::Ask { question, .. } => match service.answer_question(&question).await {
            Ok(answer) => {
                println!("{}", answer.text);

                if !answer.citations.is_empty() {
                    println!();
                    println!("Sources:");
                }
                for (position, citation) in answer.citations.iter().enumerate() {
                    println!(
                        "  [{}] {} p.{} (score {:.4})",
                        position + 1,
                        citation.chunk.title,
                        citation.chunk.page,
                        citation.score
                    );
                }
                ExitCode::SUCCESS
            }
            Err(QueryError::Index(IndexError::NotFound(path))) => {
                eprintln!(
                    "no index present at {}; run `pdf-rag rebuild --folder <dir>` first",
                    path.display()
                );
                ExitCode::from(EXIT_NO_INDEX)
            }
            Err(error) => {
                eprintln!("query failed: {error}");
                ExitCode::from(EXIT_QUERY_FAILED)
            }
        },
    }
}
