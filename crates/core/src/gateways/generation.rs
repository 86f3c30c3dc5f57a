use crate::error::GenerateError;
use crate::traits::GenerationBackend;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub max_prompt_chars: usize,
    pub max_output_tokens: u32,
    pub max_attempts: usize,
    pub backoff_base_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_prompt_chars: 24_000,
            max_output_tokens: 2_048,
            max_attempts: 4,
            backoff_base_ms: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroundedPrompt {
    pub instruction: String,
    pub context: Vec<String>,
    pub question: String,
}

impl GroundedPrompt {
    pub fn render(&self) -> String {
        let mut prompt = String::new();
        prompt.push_str(&self.instruction);
        prompt.push_str("\n\n");

        for block in &self.context {
            prompt.push_str(block);
            prompt.push_str("\n\n");
        }

        prompt.push_str("Question: ");
        prompt.push_str(&self.question);
        prompt.push_str("\nHelpful Answer:");
        prompt
    }
}

pub struct GenerationGateway<B> {
    backend: Arc<B>,
    config: GenerationConfig,
}

impl<B: GenerationBackend> GenerationGateway<B> {
    pub fn new(backend: B, config: GenerationConfig) -> Self {
        Self {
            backend: Arc::new(backend),
            config,
        }
    }

    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    pub async fn generate(&self, prompt: GroundedPrompt) -> Result<String, GenerateError> {
        let (rendered, dropped) = fit_prompt(prompt, self.config.max_prompt_chars)?;
        if dropped > 0 {
            warn!(
                dropped_blocks = dropped,
                limit = self.config.max_prompt_chars,
                "dropped oldest context blocks to fit prompt limit"
            );
        }

        let strategy = ExponentialBackoff::from_millis(self.config.backoff_base_ms.max(1))
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_attempts.saturating_sub(1));

        let result = RetryIf::spawn(
            strategy,
            || self.backend.generate(&rendered, self.config.max_output_tokens),
            |error: &GenerateError| {
                let transient = error.is_transient();
                if transient {
                    warn!(%error, "transient generation failure, retrying");
                }
                transient
            },
        )
        .await;

        match result {
            Ok(text) => Ok(text),
            Err(error) if error.is_transient() => Err(GenerateError::Unavailable {
                attempts: self.config.max_attempts,
                last: error.to_string(),
            }),
            Err(error) => Err(error),
        }
    }
}

// Length policy: context blocks are dropped oldest-first (the order they were
// assembled in) until the rendered prompt fits. Instruction and question are
// never dropped; if they alone exceed the limit the prompt is unsatisfiable.
fn fit_prompt(
    mut prompt: GroundedPrompt,
    max_chars: usize,
) -> Result<(String, usize), GenerateError> {
    let mut dropped = 0;

    loop {
        let rendered = prompt.render();
        let prompt_chars = rendered.chars().count();

        if prompt_chars <= max_chars {
            return Ok((rendered, dropped));
        }

        if prompt.context.is_empty() {
            return Err(GenerateError::PromptTooLong {
                prompt_chars,
                limit: max_chars,
            });
        }

        prompt.context.remove(0);
        dropped += 1;
    }
}

pub struct HttpGenerationBackend {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpGenerationBackend {
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
impl GenerationBackend for HttpGenerationBackend {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, GenerateError> {
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .timeout(self.timeout)
            .json(&json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
                "max_tokens": max_output_tokens,
            }));

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(classify_transport_error)?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerateError::RateLimited);
        }

        if !response.status().is_success() {
            return Err(GenerateError::BackendResponse(format!(
                "generation endpoint returned {}",
                response.status()
            )));
        }

        let parsed: Value = response.json().await.map_err(classify_transport_error)?;
        parsed
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                GenerateError::BackendResponse("response carried no generated text".to_string())
            })
    }
}

fn classify_transport_error(error: reqwest::Error) -> GenerateError {
    if error.is_timeout() {
        GenerateError::Timeout
    } else {
        GenerateError::Http(error)
    }
}
