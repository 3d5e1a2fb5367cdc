//! RAG data model
//!
//! Entities shared across the chunker, indexer, hybrid searcher, reranker,
//! orchestrator, and analytics sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bounded, structure-aware slice of a note's enriched content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub note_id: String,
    pub index: usize,
    pub content: String,
    pub section_header: Option<String>,
    pub token_count: usize,
    pub start_byte: usize,
    pub end_byte: usize,
}

/// One embedding record per chunk, denormalized for read speed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub note_id: String,
    pub owner_id: String,
    pub chunk_index: usize,
    pub content: String,
    pub vector: Vec<f32>,
    pub dimensions: usize,
    pub provider: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub note_updated_at: DateTime<Utc>,
    pub note_title: String,
    pub tags: Vec<String>,
    pub summary: Option<String>,
}

impl EmbeddingRecord {
    pub fn synthetic_id(note_id: &str, chunk_index: usize) -> String {
        format!("{note_id}#chunk#{chunk_index}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    PartiallyCompleted,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingJob {
    pub id: String,
    pub owner_id: String,
    pub status: JobStatus,
    pub provider: String,
    pub model: String,
    pub vector_store_target: String,
    pub total_to_index: usize,
    pub processed: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Sparse per-request override of `RagSettings`. `None` means "use the
/// system default for this request".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagOptions {
    pub top_k: Option<usize>,
    pub initial_retrieval_count: Option<usize>,
    pub similarity_threshold: Option<f32>,
    pub min_rerank_score: Option<f32>,
    pub max_context_length: Option<usize>,

    pub enable_hybrid: Option<bool>,
    pub enable_hyde: Option<bool>,
    pub enable_multi_query: Option<bool>,
    pub enable_reranking: Option<bool>,
    pub enable_analytics: Option<bool>,

    pub multi_query_count: Option<usize>,

    pub vector_weight: Option<f32>,
    pub bm25_weight: Option<f32>,
    pub rrf_constant: Option<f32>,

    pub embedding_provider: Option<String>,
    pub embedding_model: Option<String>,
    pub embedding_dimensions: Option<usize>,
    pub hyde_provider: Option<String>,
    pub hyde_model: Option<String>,
    pub query_expansion_provider: Option<String>,
    pub query_expansion_model: Option<String>,
    pub reranking_provider: Option<String>,
    pub reranking_model: Option<String>,

    pub vector_store_provider: Option<String>,
}

/// Resolved (call argument -> per-request options -> system default) view
/// of every RAG setting needed for one retrieval.
#[derive(Debug, Clone)]
pub struct EffectiveOptions {
    pub top_k: usize,
    pub initial_retrieval_count: usize,
    pub similarity_threshold: f32,
    pub min_rerank_score: f32,
    pub max_context_length: usize,

    pub enable_hybrid: bool,
    pub enable_hyde: bool,
    pub enable_multi_query: bool,
    pub enable_reranking: bool,
    pub enable_analytics: bool,

    pub multi_query_count: usize,

    pub vector_weight: f32,
    pub bm25_weight: f32,
    pub rrf_constant: f32,

    pub embedding_provider: String,
    pub embedding_model: String,
    pub embedding_dimensions: Option<usize>,
    pub hyde_provider: String,
    pub hyde_model: String,
    pub query_expansion_provider: String,
    pub query_expansion_model: String,
    pub reranking_provider: String,
    pub reranking_model: String,

    pub vector_store_provider: Option<crate::config::VectorStoreTarget>,
}

impl EffectiveOptions {
    pub fn resolve(settings: &crate::config::RagSettings, options: &RagOptions) -> Self {
        Self {
            top_k: options.top_k.unwrap_or(settings.top_k),
            initial_retrieval_count: options
                .initial_retrieval_count
                .unwrap_or(settings.initial_retrieval_count),
            similarity_threshold: options
                .similarity_threshold
                .unwrap_or(settings.similarity_threshold),
            min_rerank_score: options.min_rerank_score.unwrap_or(settings.min_rerank_score),
            max_context_length: options
                .max_context_length
                .unwrap_or(settings.max_context_length),

            enable_hybrid: options.enable_hybrid.unwrap_or(settings.enable_hybrid_search),
            enable_hyde: options.enable_hyde.unwrap_or(settings.enable_hyde),
            enable_multi_query: options
                .enable_multi_query
                .unwrap_or(settings.enable_query_expansion),
            enable_reranking: options.enable_reranking.unwrap_or(settings.enable_reranking),
            enable_analytics: options.enable_analytics.unwrap_or(settings.enable_analytics),

            multi_query_count: options.multi_query_count.unwrap_or(settings.multi_query_count),

            vector_weight: options.vector_weight.unwrap_or(settings.vector_weight),
            bm25_weight: options.bm25_weight.unwrap_or(settings.bm25_weight),
            rrf_constant: options.rrf_constant.unwrap_or(settings.rrf_constant),

            embedding_provider: options
                .embedding_provider
                .clone()
                .unwrap_or_else(|| settings.embedding_provider.clone()),
            embedding_model: options
                .embedding_model
                .clone()
                .unwrap_or_else(|| settings.embedding_model.clone()),
            embedding_dimensions: options.embedding_dimensions.or(Some(settings.embedding_dimensions)),
            hyde_provider: options
                .hyde_provider
                .clone()
                .unwrap_or_else(|| settings.hyde_provider.clone()),
            hyde_model: options.hyde_model.clone().unwrap_or_else(|| settings.hyde_model.clone()),
            query_expansion_provider: options
                .query_expansion_provider
                .clone()
                .unwrap_or_else(|| settings.query_expansion_provider.clone()),
            query_expansion_model: options
                .query_expansion_model
                .clone()
                .unwrap_or_else(|| settings.query_expansion_model.clone()),
            reranking_provider: options
                .reranking_provider
                .clone()
                .unwrap_or_else(|| settings.reranking_provider.clone()),
            reranking_model: options
                .reranking_model
                .clone()
                .unwrap_or_else(|| settings.reranking_model.clone()),

            vector_store_provider: options
                .vector_store_provider
                .as_ref()
                .and_then(|name| crate::config::VectorStoreTarget::parse(name)),
        }
    }
}

/// A candidate surfaced by the hybrid searcher, before reranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub note_id: String,
    pub chunk_index: usize,
    pub content: String,
    pub note_title: String,
    pub tags: Vec<String>,
    pub summary: Option<String>,

    pub vector_score: f32,
    pub bm25_score: f32,
    pub vector_rank: Option<usize>,
    pub bm25_rank: Option<usize>,
    pub fused_score: f32,
    pub found_in_vector: bool,
    pub found_in_bm25: bool,
}

/// A candidate after reranking, carrying the blended final score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedChunk {
    pub note_id: String,
    pub chunk_index: usize,
    pub content: String,
    pub note_title: String,
    pub tags: Vec<String>,
    pub summary: Option<String>,

    pub fused_score: f32,
    pub relevance_score: Option<f32>,
    pub final_score: f32,
    pub reranked: bool,
}

/// Result of one `retrieve()` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagResult {
    pub results: Vec<RankedChunk>,
    pub formatted_context: String,
    pub total_tokens: usize,
    pub rag_log_id: Option<String>,
}

/// Timing and aggregate-score metrics accumulated across one retrieval,
/// owned exclusively by the orchestrator task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub owner_id: String,
    pub conversation_id: Option<String>,
    pub query_text: String,
    pub embedding_ms: Option<u64>,
    pub vector_ms: Option<u64>,
    pub lexical_ms: Option<u64>,
    pub rerank_ms: Option<u64>,
    pub total_ms: Option<u64>,
    pub retrieved_count: usize,
    pub final_count: usize,
    pub top_cosine: Option<f32>,
    pub avg_cosine: Option<f32>,
    pub top_bm25: Option<f32>,
    pub avg_bm25: Option<f32>,
    pub top_rerank: Option<f32>,
    pub avg_rerank: Option<f32>,
    pub hybrid_enabled: bool,
    pub hyde_enabled: bool,
    pub multi_query_enabled: bool,
    pub reranking_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackVerdict {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub total_queries: usize,
    pub avg_latency_ms: Option<f64>,
    pub positive_rate: Option<f64>,
    pub cosine_positive_correlation: Option<f64>,
    pub rerank_positive_correlation: Option<f64>,
}
