//! Vector store (C3)
//!
//! Owner-scoped persistence for chunk embeddings with k-NN, metadata
//! lookup, and deletion. Three concrete backends share this contract: an
//! embedded SQL-with-vector-extension backend (`postgres`, PostgreSQL +
//! pgvector), a remote managed vector index (`pinecone`), and an
//! in-process backend (`memory`) for tests and small deployments.
//! `composite` fans writes to both durable backends and reads from a
//! configurable primary.

pub mod composite;
pub mod memory;
pub mod pinecone;
pub mod postgres;

use crate::rag::types::EmbeddingRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// One k-NN hit: an embedding record's denormalized fields plus its
/// cosine similarity to the query vector.
#[derive(Debug, Clone)]
pub struct KnnHit {
    pub id: String,
    pub note_id: String,
    pub chunk_index: usize,
    pub content: String,
    pub note_title: String,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub cosine: f32,
}

#[derive(Debug, Clone, Default)]
pub struct VectorStoreStats {
    pub total_chunks: usize,
    pub total_notes: usize,
}

/// Owner-scoped vector persistence. Every query filters by owner id and,
/// when vectors of multiple dimensions coexist, by the dimension stamp on
/// the query.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert_batch(&self, records: &[EmbeddingRecord]) -> Result<(), StoreError>;

    async fn delete_by_note(&self, owner_id: &str, note_id: &str) -> Result<(), StoreError>;

    async fn knn(
        &self,
        owner_id: &str,
        query_vector: &[f32],
        k: usize,
        min_cosine: f32,
        dimensions: Option<usize>,
    ) -> Result<Vec<KnnHit>, StoreError>;

    async fn indexed_note_ids(&self, owner_id: &str) -> Result<Vec<String>, StoreError>;

    async fn note_updated_at(&self, note_id: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn stats(&self, owner_id: &str) -> Result<VectorStoreStats, StoreError>;

    /// Sets which inner backend serves reads for the composite variant.
    /// A no-op on single-backend stores.
    fn set_read_primary(&self, _target: crate::config::VectorStoreTarget) {}
}

/// Cosine similarity between two equal-length vectors. Used by backends
/// that cannot push the computation into the database (e.g. Pinecone
/// already returns a score; this helper is for in-process fallbacks and
/// tests).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }
}
