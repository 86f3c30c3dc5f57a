use crate::error::EmbedError;
use crate::traits::EmbeddingBackend;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub batch_size: usize,
    pub max_attempts: usize,
    pub backoff_base_ms: u64,
    pub max_concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            max_attempts: 4,
            backoff_base_ms: 100,
            max_concurrency: 4,
        }
    }
}

pub struct EmbeddingGateway<B> {
    backend: Arc<B>,
    config: EmbeddingConfig,
    permits: Arc<Semaphore>,
}

impl<B: EmbeddingBackend + 'static> EmbeddingGateway<B> {
    pub fn new(backend: B, config: EmbeddingConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            backend: Arc::new(backend),
            config,
            permits,
        }
    }

    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        for (position, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                return Err(EmbedError::InvalidInput(format!(
                    "text at position {position} is empty"
                )));
            }
        }

        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.config.batch_size.max(1);
        let mut handles = Vec::new();

        for batch in texts.chunks(batch_size) {
            let backend = Arc::clone(&self.backend);
            let permits = Arc::clone(&self.permits);
            let config = self.config.clone();
            let batch = batch.to_vec();

            handles.push(tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.map_err(|_| {
                    EmbedError::BackendResponse("embedding gateway shut down".to_string())
                })?;
                embed_batch_with_retry(backend.as_ref(), &batch, &config).await
            }));
        }

        // Joined in spawn order, so output order matches input order.
        let mut vectors = Vec::with_capacity(texts.len());
        for handle in handles {
            let batch_vectors = handle.await.map_err(|error| {
                EmbedError::BackendResponse(format!("embedding task failed: {error}"))
            })??;
            vectors.extend(batch_vectors);
        }

        if vectors.len() != texts.len() {
            return Err(EmbedError::BackendResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        Ok(vectors)
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let input = [text.to_string()];
        let mut vectors = self.embed(&input).await?;
        vectors.pop().ok_or_else(|| {
            EmbedError::BackendResponse("embedding service returned no vector".to_string())
        })
    }
}

async fn embed_batch_with_retry<B: EmbeddingBackend>(
    backend: &B,
    batch: &[String],
    config: &EmbeddingConfig,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let strategy = ExponentialBackoff::from_millis(config.backoff_base_ms.max(1))
        .max_delay(Duration::from_secs(10))
        .map(jitter)
        .take(config.max_attempts.saturating_sub(1));

    let result = RetryIf::spawn(
        strategy,
        || backend.embed_batch(batch),
        |error: &EmbedError| {
            let transient = error.is_transient();
            if transient {
                warn!(%error, "transient embedding failure, retrying");
            }
            transient
        },
    )
    .await;

    match result {
        Ok(vectors) if vectors.len() == batch.len() => Ok(vectors),
        Ok(vectors) => Err(EmbedError::BackendResponse(format!(
            "batch of {} texts produced {} embeddings",
            batch.len(),
            vectors.len()
        ))),
        Err(error) if error.is_transient() => Err(EmbedError::Unavailable {
            attempts: config.max_attempts,
            last: error.to_string(),
        }),
        Err(error) => Err(error),
    }
}

pub struct HttpEmbeddingBackend {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpEmbeddingBackend {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
            timeout,
        }
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingBackend {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut request = self
            .client
            .post(format!("{}/embeddings", self.endpoint))
            .timeout(self.timeout)
            .json(&json!({
                "model": self.model,
                "input": texts,
            }));

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(classify_transport_error)?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbedError::RateLimited);
        }

        if !response.status().is_success() {
            return Err(EmbedError::BackendResponse(format!(
                "embedding endpoint returned {}",
                response.status()
            )));
        }

        let parsed: Value = response.json().await.map_err(classify_transport_error)?;
        let data = parsed
            .pointer("/data")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                EmbedError::BackendResponse("response missing data array".to_string())
            })?;

        // Vectors are placed by the response's index field, not arrival order.
        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        for item in data {
            let position = item
                .pointer("/index")
                .and_then(Value::as_u64)
                .ok_or_else(|| {
                    EmbedError::BackendResponse("embedding item missing index".to_string())
                })? as usize;

            let raw = item
                .pointer("/embedding")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    EmbedError::BackendResponse(format!(
                        "embedding item {position} missing vector"
                    ))
                })?;

            let vector = raw
                .iter()
                .map(|value| value.as_f64().map(|number| number as f32))
                .collect::<Option<Vec<f32>>>()
                .ok_or_else(|| {
                    EmbedError::BackendResponse(format!(
                        "embedding item {position} contains a non-numeric value"
                    ))
                })?;

            let slot = vectors.get_mut(position).ok_or_else(|| {
                EmbedError::BackendResponse(format!("embedding index {position} out of range"))
            })?;
            *slot = Some(vector);
        }

        vectors
            .into_iter()
            .enumerate()
            .map(|(position, slot)| {
                slot.ok_or_else(|| {
                    EmbedError::BackendResponse(format!(
                        "no embedding returned for input {position}"
                    ))
                })
            })
            .collect()
    }
}

fn classify_transport_error(error: reqwest::Error) -> EmbedError {
    if error.is_timeout() {
        EmbedError::Timeout
    } else {
        EmbedError::Http(error)
    }
}
