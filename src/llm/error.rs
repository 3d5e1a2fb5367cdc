//! LLM error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("provider error: {0}")]
    ProviderError(String),

    #[error("provider not implemented: {0}")]
    ProviderNotImplemented(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("http error: {0}")]
    HttpError(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("token limit exceeded")]
    TokenLimitExceeded,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("cache error: {0}")]
    CacheError(String),

    /// The requested embedding dimension is not offered by the chosen model.
    #[error("unsupported dimension {requested} for model {model}")]
    UnsupportedDimension { model: String, requested: usize },
}
