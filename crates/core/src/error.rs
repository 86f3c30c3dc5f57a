use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("invalid embedding input: {0}")]
    InvalidInput(String),

    #[error("embedding service rate limited")]
    RateLimited,

    #[error("embedding request timed out")]
    Timeout,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from embedding service: {0}")]
    BackendResponse(String),

    #[error("embedding service unavailable after {attempts} attempts: {last}")]
    Unavailable { attempts: usize, last: String },
}

impl EmbedError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout)
    }
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("generation service rate limited")]
    RateLimited,

    #[error("generation request timed out")]
    Timeout,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from generation service: {0}")]
    BackendResponse(String),

    #[error("prompt of {prompt_chars} chars exceeds limit of {limit} even with all context dropped")]
    PromptTooLong { prompt_chars: usize, limit: usize },

    #[error("generation service unavailable after {attempts} attempts: {last}")]
    Unavailable { attempts: usize, last: String },
}

impl GenerateError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout)
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid search argument: {0}")]
    InvalidInput(String),

    #[error("embedding dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("no index found at {0}")]
    NotFound(PathBuf),

    #[error("index at {path} is corrupt: {details}")]
    Corrupt { path: PathBuf, details: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("no pdf files found in {0}")]
    NoDocuments(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid question: {0}")]
    InvalidInput(String),

    #[error("index was built with embedding model '{index_model}' but the gateway serves '{gateway_model}'")]
    IndexModelMismatch {
        index_model: String,
        gateway_model: String,
    },

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerateError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),
}
