use crate::builder::IndexBuilder;
use crate::chunking::ChunkingConfig;
use crate::error::{BuildError, QueryError};
use crate::extractor::PdfExtractor;
use crate::gateways::{EmbeddingGateway, GenerationGateway};
use crate::index::VectorIndex;
use crate::models::{Answer, BuildReport};
use crate::pipeline::{QaPipeline, DEFAULT_TOP_K};
use crate::traits::{EmbeddingBackend, GenerationBackend};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

pub struct ServiceConfig {
    pub index_path: PathBuf,
    pub chunking: ChunkingConfig,
    pub top_k: usize,
}

impl ServiceConfig {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            chunking: ChunkingConfig::default(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

pub struct RagService<E, G> {
    embedder: EmbeddingGateway<E>,
    generator: GenerationGateway<G>,
    extractor: Box<dyn PdfExtractor>,
    config: ServiceConfig,
    live_index: RwLock<Option<Arc<VectorIndex>>>,
    rebuild_guard: Mutex<()>,
}

impl<E, G> RagService<E, G>
where
    E: EmbeddingBackend + 'static,
    G: GenerationBackend,
{
    pub fn new(
        embedder: EmbeddingGateway<E>,
        generator: GenerationGateway<G>,
        extractor: Box<dyn PdfExtractor>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            embedder,
            generator,
            extractor,
            config,
            live_index: RwLock::new(None),
            rebuild_guard: Mutex::new(()),
        }
    }

    // Rebuilds are serialized by the guard; questions in flight keep the Arc
    // they cloned at start and finish against the index they started with.
    pub async fn rebuild_index(&self, source_dir: &Path) -> Result<BuildReport, BuildError> {
        let _guard = self.rebuild_guard.lock().await;

        let builder = IndexBuilder::new(
            self.extractor.as_ref(),
            &self.embedder,
            self.config.chunking,
        );
        let (index, report) = builder.build(source_dir, &self.config.index_path).await?;

        *self.live_index.write().await = Some(Arc::new(index));
        Ok(report)
    }

    pub async fn answer_question(&self, question: &str) -> Result<Answer, QueryError> {
        let index = self.current_index().await?;
        QaPipeline::new(&self.embedder, &self.generator)
            .answer(question, &index, self.config.top_k)
            .await
    }

    async fn current_index(&self) -> Result<Arc<VectorIndex>, QueryError> {
        if let Some(index) = self.live_index.read().await.as_ref() {
            return Ok(Arc::clone(index));
        }

        let loaded = Arc::new(
            VectorIndex::load(&self.config.index_path).map_err(QueryError::Index)?,
        );
        info!(entries = loaded.len(), path = %self.config.index_path.display(), "index loaded from disk");

        let mut slot = self.live_index.write().await;
        Ok(Arc::clone(slot.get_or_insert(loaded)))
    }
}
