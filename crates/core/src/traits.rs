use crate::error::{EmbedError, GenerateError};
use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    fn model_id(&self) -> &str;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn model_id(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, GenerateError>;
}
