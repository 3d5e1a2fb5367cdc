//! Top-level RAG error taxonomy
//!
//! Everything that is not `InputError` or `DimensionMismatch` is recoverable
//! at the component boundary; the retrieval path never surfaces a raw
//! subsystem error past the orchestrator.

use crate::llm::LLMError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("input error: {0}")]
    InputError(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("provider error: {0}")]
    ProviderError(#[from] LLMError),

    #[error("store error: {0}")]
    StoreError(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<crate::db::DbError> for RagError {
    fn from(e: crate::db::DbError) -> Self {
        RagError::Internal(e.to_string())
    }
}

impl From<crate::note::NoteSourceError> for RagError {
    fn from(e: crate::note::NoteSourceError) -> Self {
        match e {
            crate::note::NoteSourceError::NotFound(id) => RagError::NotFound(id),
            crate::note::NoteSourceError::Unavailable(msg) => RagError::Internal(msg),
        }
    }
}
