//! RAG Settings
//!
//! System-wide defaults for the retrieval pipeline. Every field here can be
//! overridden per request by `RagOptions` (see `rag::types`).

use serde::{Deserialize, Serialize};

/// Named vector-store targets recognized by the composite store and by
/// `RagOptions::vector_store_provider`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum VectorStoreTarget {
    PostgreSql,
    Pinecone,
    Both,
}

impl VectorStoreTarget {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "PostgreSQL" | "postgresql" | "postgres" => Some(Self::PostgreSql),
            "Pinecone" | "pinecone" => Some(Self::Pinecone),
            "Both" | "both" => Some(Self::Both),
            _ => None,
        }
    }
}

/// System-wide RAG configuration, recognized fields per the external
/// configuration surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSettings {
    // Chunking
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    pub enable_chunking: bool,
    pub enable_semantic_chunking: bool,

    // Retrieval
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub initial_retrieval_count: usize,

    // Hybrid search
    pub enable_hybrid_search: bool,
    pub enable_native_hybrid_search: bool,
    pub vector_weight: f32,
    pub bm25_weight: f32,
    pub rrf_constant: f32,

    // Query expansion
    pub enable_hyde: bool,
    pub enable_query_expansion: bool,
    pub multi_query_count: usize,

    // Reranking
    pub enable_reranking: bool,
    pub min_rerank_score: f32,

    // Prompt assembly
    pub max_context_length: usize,

    // Analytics
    pub enable_analytics: bool,
    pub log_detailed_metrics: bool,

    // Provider/model defaults per stage
    pub embedding_provider: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub hyde_provider: String,
    pub hyde_model: String,
    pub query_expansion_provider: String,
    pub query_expansion_model: String,
    pub reranking_provider: String,
    pub reranking_model: String,

    // Vector store target
    pub vector_store_provider: VectorStoreTarget,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            min_chunk_size: 100,
            max_chunk_size: 1000,
            enable_chunking: true,
            enable_semantic_chunking: true,

            top_k: 5,
            similarity_threshold: 0.3,
            initial_retrieval_count: 20,

            enable_hybrid_search: true,
            enable_native_hybrid_search: false,
            vector_weight: 1.0,
            bm25_weight: 1.0,
            rrf_constant: 60.0,

            enable_hyde: true,
            enable_query_expansion: true,
            multi_query_count: 3,

            enable_reranking: true,
            min_rerank_score: 5.0,

            max_context_length: 8000,

            enable_analytics: true,
            log_detailed_metrics: false,

            embedding_provider: "openai".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 1536,
            hyde_provider: "openai".to_string(),
            hyde_model: "gpt-4o-mini".to_string(),
            query_expansion_provider: "openai".to_string(),
            query_expansion_model: "gpt-4o-mini".to_string(),
            reranking_provider: "openai".to_string(),
            reranking_model: "gpt-4o-mini".to_string(),

            vector_store_provider: VectorStoreTarget::PostgreSql,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = RagSettings::default();
        assert_eq!(settings.top_k, 5);
        assert!(settings.enable_hybrid_search);
        assert_eq!(settings.vector_store_provider, VectorStoreTarget::PostgreSql);
    }

    #[test]
    fn test_vector_store_target_parse() {
        assert_eq!(
            VectorStoreTarget::parse("Pinecone"),
            Some(VectorStoreTarget::Pinecone)
        );
        assert_eq!(
            VectorStoreTarget::parse("Both"),
            Some(VectorStoreTarget::Both)
        );
        assert_eq!(VectorStoreTarget::parse("nonsense"), None);
    }
}
