pub mod builder;
pub mod chunking;
pub mod error;
pub mod extractor;
pub mod gateways;
pub mod index;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod service;
pub mod traits;

pub use builder::{BuildPhase, IndexBuilder};
pub use chunking::{split, ChunkingConfig};
pub use error::{BuildError, EmbedError, GenerateError, IndexError, QueryError};
pub use extractor::{LopdfExtractor, PageText, PdfExtractor};
pub use gateways::{
    EmbeddingConfig, EmbeddingGateway, GenerationConfig, GenerationGateway, GroundedPrompt,
    HttpEmbeddingBackend, HttpGenerationBackend,
};
pub use index::{IndexEntry, IndexMetadata, VectorIndex, INDEX_FORMAT_VERSION};
pub use loader::{discover_pdf_files, load_documents, CorpusLoad};
pub use models::{Answer, BuildReport, Chunk, Citation, Document, Page, SkippedPdf};
pub use pipeline::{QaPipeline, DEFAULT_TOP_K};
pub use service::{RagService, ServiceConfig};
pub use traits::{EmbeddingBackend, GenerationBackend};
