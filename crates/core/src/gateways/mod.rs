pub mod embedding;
pub mod generation;

pub use embedding::{EmbeddingConfig, EmbeddingGateway, HttpEmbeddingBackend};
pub use generation::{
    GenerationConfig, GenerationGateway, GroundedPrompt, HttpGenerationBackend,
};
