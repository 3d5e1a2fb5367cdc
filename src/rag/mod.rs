//! Retrieval-augmented generation core
//!
//! Chunking, incremental indexing, hybrid search, query expansion,
//! reranking, prompt assembly, and analytics for one owner-scoped note
//! corpus.

pub mod analytics;
pub mod chunker;
pub mod error;
pub mod expander;
pub mod hybrid;
pub mod indexer;
pub mod lexical;
pub mod orchestrator;
pub mod reranker;
pub mod types;
pub mod vector_store;

pub use error::RagError;
pub use orchestrator::RetrievalOrchestrator;
pub use types::{RagOptions, RagResult};
