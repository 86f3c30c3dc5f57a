use crate::chunking::{self, ChunkingConfig};
use crate::error::BuildError;
use crate::extractor::PdfExtractor;
use crate::gateways::EmbeddingGateway;
use crate::index::{IndexEntry, VectorIndex};
use crate::loader::load_documents;
use crate::models::{BuildReport, Chunk};
use crate::traits::EmbeddingBackend;
use std::fmt;
use std::path::Path;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Idle,
    Loading,
    Chunking,
    Embedding,
    Indexing,
    Persisted,
    Failed,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Indexing => "indexing",
            Self::Persisted => "persisted",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

pub struct IndexBuilder<'a, B> {
    extractor: &'a dyn PdfExtractor,
    embedder: &'a EmbeddingGateway<B>,
    chunking: ChunkingConfig,
}

impl<'a, B: EmbeddingBackend + 'static> IndexBuilder<'a, B> {
    pub fn new(
        extractor: &'a dyn PdfExtractor,
        embedder: &'a EmbeddingGateway<B>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            extractor,
            embedder,
            chunking,
        }
    }

    // Full rebuild every time: Loading -> Chunking -> Embedding -> Indexing ->
    // Persisted. A failure in any phase leaves the previously persisted index
    // untouched, since nothing is written until the atomic save at the end.
    pub async fn build(
        &self,
        source_dir: &Path,
        index_path: &Path,
    ) -> Result<(VectorIndex, BuildReport), BuildError> {
        self.chunking.validate()?;

        info!(phase = %BuildPhase::Loading, source = %source_dir.display(), "index build started");
        let corpus = load_documents(source_dir, self.extractor)
            .map_err(|error| fail(BuildPhase::Loading, error))?;

        for skipped in &corpus.skipped_files {
            warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
        }

        info!(phase = %BuildPhase::Chunking, documents = corpus.documents.len(), "chunking corpus");
        let mut chunks: Vec<Chunk> = Vec::new();
        for document in &corpus.documents {
            let document_chunks = chunking::split(document, self.chunking)
                .map_err(|error| fail(BuildPhase::Chunking, error))?;
            chunks.extend(document_chunks);
        }
        chunks.retain(|chunk| !chunk.text.trim().is_empty());

        info!(phase = %BuildPhase::Embedding, chunks = chunks.len(), "embedding chunks");
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|error| fail(BuildPhase::Embedding, BuildError::Embedding(error)))?;

        info!(phase = %BuildPhase::Indexing, "building vector index");
        let chunk_count = chunks.len();
        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry { chunk, embedding })
            .collect();
        let index = VectorIndex::build(entries, self.embedder.model_id())
            .map_err(|error| fail(BuildPhase::Indexing, BuildError::Index(error)))?;
        index
            .save(index_path)
            .map_err(|error| fail(BuildPhase::Indexing, BuildError::Index(error)))?;

        let report = BuildReport {
            documents: corpus.documents.len(),
            pages: corpus
                .documents
                .iter()
                .map(|document| document.pages.len())
                .sum(),
            chunks: chunk_count,
            dimensions: index.metadata().dimensions,
            skipped_files: corpus.skipped_files,
        };

        info!(
            phase = %BuildPhase::Persisted,
            documents = report.documents,
            chunks = report.chunks,
            "index build finished"
        );
        Ok((index, report))
    }
}

fn fail(phase: BuildPhase, error: BuildError) -> BuildError {
    error!(phase = %phase, %error, "index build failed");
    error
}
