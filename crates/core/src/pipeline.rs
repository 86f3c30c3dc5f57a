use crate::error::QueryError;
use crate::gateways::{EmbeddingGateway, GenerationGateway, GroundedPrompt};
use crate::index::VectorIndex;
use crate::models::{Answer, Citation};
use crate::traits::{EmbeddingBackend, GenerationBackend};
use tracing::info;

pub const DEFAULT_TOP_K: usize = 3;

// The grounding contract: the model may only use the supplied passages and
// must say it does not know when they are insufficient.
const GROUNDING_INSTRUCTION: &str = "Use the following pieces of context to answer the question \
at the end. Follow these rules:\n\
1. If the answer is not within the context knowledge, state that you do not know, rather than \
fabricating a response.\n\
2. If you find the answer, craft a detailed, thorough, and concise response to the question at \
the end. Aim for a summary of at most 250 words.";

pub struct QaPipeline<'a, E, G> {
    embedder: &'a EmbeddingGateway<E>,
    generator: &'a GenerationGateway<G>,
}

impl<'a, E, G> QaPipeline<'a, E, G>
where
    E: EmbeddingBackend + 'static,
    G: GenerationBackend,
{
    pub fn new(embedder: &'a EmbeddingGateway<E>, generator: &'a GenerationGateway<G>) -> Self {
        Self {
            embedder,
            generator,
        }
    }

    pub async fn answer(
        &self,
        question: &str,
        index: &VectorIndex,
        top_k: usize,
    ) -> Result<Answer, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::InvalidInput("question is empty".to_string()));
        }

        let metadata = index.metadata();
        if metadata.embedding_model != self.embedder.model_id() {
            return Err(QueryError::IndexModelMismatch {
                index_model: metadata.embedding_model.clone(),
                gateway_model: self.embedder.model_id().to_string(),
            });
        }

        let query_vector = self.embedder.embed_one(question).await?;
        if !index.is_empty() && query_vector.len() != metadata.dimensions {
            return Err(QueryError::IndexModelMismatch {
                index_model: metadata.embedding_model.clone(),
                gateway_model: self.embedder.model_id().to_string(),
            });
        }

        let hits = index.search(&query_vector, top_k)?;
        info!(question_chars = question.len(), retrieved = hits.len(), "retrieval complete");

        let context = hits
            .iter()
            .map(|(chunk, _)| format!("[{} p.{}] {}", chunk.title, chunk.page, chunk.text))
            .collect();

        let prompt = GroundedPrompt {
            instruction: GROUNDING_INSTRUCTION.to_string(),
            context,
            question: question.to_string(),
        };

        let text = self.generator.generate(prompt).await?;

        Ok(Answer {
            text,
            citations: hits
                .into_iter()
                .map(|(chunk, score)| Citation { chunk, score })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EmbedError, GenerateError};
    use crate::gateways::{EmbeddingConfig, GenerationConfig};
    use crate::index::{IndexEntry, VectorIndex};
    use crate::models::Chunk;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct CountingEmbedder {
        calls: Arc<AtomicUsize>,
        model: &'static str,
        vector: Vec<f32>,
    }

    #[async_trait]
    impl EmbeddingBackend for CountingEmbedder {
        fn model_id(&self) -> &str {
            self.model
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| self.vector.clone()).collect())
        }
    }

    struct CountingGenerator {
        calls: Arc<AtomicUsize>,
        prompts: Arc<Mutex<Vec<String>>>,
        reply: &'static str,
    }

    #[async_trait]
    impl GenerationBackend for CountingGenerator {
        fn model_id(&self) -> &str {
            "fake-generator"
        }

        async fn generate(
            &self,
            prompt: &str,
            _max_output_tokens: u32,
        ) -> Result<String, GenerateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.to_string())
        }
    }

    fn embedder(
        model: &'static str,
        vector: Vec<f32>,
    ) -> (EmbeddingGateway<CountingEmbedder>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let gateway = EmbeddingGateway::new(
            CountingEmbedder {
                calls: Arc::clone(&calls),
                model,
                vector,
            },
            EmbeddingConfig {
                backoff_base_ms: 1,
                ..EmbeddingConfig::default()
            },
        );
        (gateway, calls)
    }

    fn generator(
        reply: &'static str,
    ) -> (
        GenerationGateway<CountingGenerator>,
        Arc<AtomicUsize>,
        Arc<Mutex<Vec<String>>>,
    ) {
        let calls = Arc::new(AtomicUsize::new(0));
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let gateway = GenerationGateway::new(
            CountingGenerator {
                calls: Arc::clone(&calls),
                prompts: Arc::clone(&prompts),
                reply,
            },
            GenerationConfig {
                backoff_base_ms: 1,
                ..GenerationConfig::default()
            },
        );
        (gateway, calls, prompts)
    }

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            document_id: "doc-1".to_string(),
            source_path: "/tmp/doc.pdf".to_string(),
            title: "doc.pdf".to_string(),
            page: 7,
            start_offset: 0,
            end_offset: text.len(),
            text: text.to_string(),
        }
    }

    fn index_with(entries: Vec<(&str, &str, Vec<f32>)>, model: &str) -> VectorIndex {
        VectorIndex::build(
            entries
                .into_iter()
                .map(|(id, text, embedding)| IndexEntry {
                    chunk: chunk(id, text),
                    embedding,
                })
                .collect(),
            model,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn empty_question_is_rejected_without_gateway_calls() {
        let (embed_gateway, embed_calls) = embedder("model-a", vec![1.0]);
        let (generate_gateway, generate_calls, _) = generator("unused");
        let pipeline = QaPipeline::new(&embed_gateway, &generate_gateway);
        let index = index_with(vec![("a", "text", vec![1.0])], "model-a");

        let result = pipeline.answer("   ", &index, DEFAULT_TOP_K).await;

        assert!(matches!(result, Err(QueryError::InvalidInput(_))));
        assert_eq!(embed_calls.load(Ordering::SeqCst), 0);
        assert_eq!(generate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn mismatched_index_model_is_rejected_before_embedding() {
        let (embed_gateway, embed_calls) = embedder("model-b", vec![1.0]);
        let (generate_gateway, _, _) = generator("unused");
        let pipeline = QaPipeline::new(&embed_gateway, &generate_gateway);
        let index = index_with(vec![("a", "text", vec![1.0])], "model-a");

        let result = pipeline.answer("what is it?", &index, DEFAULT_TOP_K).await;

        assert!(matches!(result, Err(QueryError::IndexModelMismatch { .. })));
        assert_eq!(embed_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn mismatched_dimensions_are_rejected_as_model_mismatch() {
        let (embed_gateway, _) = embedder("model-a", vec![1.0, 0.0, 0.0]);
        let (generate_gateway, generate_calls, _) = generator("unused");
        let pipeline = QaPipeline::new(&embed_gateway, &generate_gateway);
        let index = index_with(vec![("a", "text", vec![1.0, 0.0])], "model-a");

        let result = pipeline.answer("what is it?", &index, DEFAULT_TOP_K).await;

        assert!(matches!(result, Err(QueryError::IndexModelMismatch { .. })));
        assert_eq!(generate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn answer_carries_retrieved_chunks_as_citations() {
        let (embed_gateway, _) = embedder("model-a", vec![1.0, 0.0]);
        let (generate_gateway, _, prompts) = generator("the manual says 42");
        let pipeline = QaPipeline::new(&embed_gateway, &generate_gateway);
        let index = index_with(
            vec![
                ("near", "pressure is 42 psi", vec![1.0, 0.0]),
                ("far", "unrelated maintenance note", vec![0.0, 1.0]),
            ],
            "model-a",
        );

        let answer = pipeline
            .answer("what is the pressure?", &index, 2)
            .await
            .expect("pipeline should answer");

        assert_eq!(answer.text, "the manual says 42");
        assert_eq!(answer.citations.len(), 2);
        assert_eq!(answer.citations[0].chunk.chunk_id, "near");
        assert!(answer.citations[0].score >= answer.citations[1].score);

        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("state that you do not know"));
        assert!(prompts[0].contains("pressure is 42 psi"));
        assert!(prompts[0].contains("[doc.pdf p.7]"));
        assert!(prompts[0].contains("Question: what is the pressure?"));
    }

    #[tokio::test]
    async fn empty_index_still_produces_a_grounded_answer() {
        let (embed_gateway, _) = embedder("model-a", vec![1.0]);
        let (generate_gateway, generate_calls, _) =
            generator("I cannot answer from the provided context.");
        let pipeline = QaPipeline::new(&embed_gateway, &generate_gateway);
        let index = index_with(vec![], "model-a");

        let answer = pipeline
            .answer("anything at all?", &index, DEFAULT_TOP_K)
            .await
            .expect("empty retrieval still answers");

        assert!(!answer.text.is_empty());
        assert!(answer.citations.is_empty());
        assert_eq!(generate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn generation_failure_propagates_without_a_fallback_answer() {
        struct FailingGenerator;

        #[async_trait]
        impl GenerationBackend for FailingGenerator {
            fn model_id(&self) -> &str {
                "failing-generator"
            }

            async fn generate(
                &self,
                _prompt: &str,
                _max_output_tokens: u32,
            ) -> Result<String, GenerateError> {
                Err(GenerateError::BackendResponse("boom".to_string()))
            }
        }

        let (embed_gateway, _) = embedder("model-a", vec![1.0]);
        let generate_gateway = GenerationGateway::new(
            FailingGenerator,
            GenerationConfig {
                backoff_base_ms: 1,
                ..GenerationConfig::default()
            },
        );
        let pipeline = QaPipeline::new(&embed_gateway, &generate_gateway);
        let index = index_with(vec![("a", "text", vec![1.0])], "model-a");

        let result = pipeline.answer("question?", &index, DEFAULT_TOP_K).await;
        assert!(matches!(result, Err(QueryError::Generation(_))));
    }
}
