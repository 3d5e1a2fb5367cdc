//! In-process vector store
//!
//! A `Mutex<HashMap>`-backed implementation of the full `VectorStore`
//! contract, including `indexed_note_ids`/`note_updated_at`. Useful as a
//! lightweight backend for tests and for hosts that do not want to stand up
//! Postgres or Pinecone for a small personal corpus.

use super::{cosine_similarity, KnnHit, StoreError, VectorStore, VectorStoreStats};
use crate::rag::types::EmbeddingRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryVectorStore {
    records: Mutex<HashMap<String, EmbeddingRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert_batch(&self, records: &[EmbeddingRecord]) -> Result<(), StoreError> {
        let mut guard = self.records.lock().unwrap();
        for record in records {
            guard.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn delete_by_note(&self, owner_id: &str, note_id: &str) -> Result<(), StoreError> {
        let _ = owner_id;
        let mut guard = self.records.lock().unwrap();
        guard.retain(|_, r| r.note_id != note_id);
        Ok(())
    }

    async fn knn(
        &self,
        owner_id: &str,
        query_vector: &[f32],
        k: usize,
        min_cosine: f32,
        dimensions: Option<usize>,
    ) -> Result<Vec<KnnHit>, StoreError> {
        let guard = self.records.lock().unwrap();
        let mut hits: Vec<KnnHit> = guard
            .values()
            .filter(|r| r.owner_id == owner_id)
            .filter(|r| dimensions.map(|d| d == r.dimensions).unwrap_or(true))
            .map(|r| KnnHit {
                id: r.id.clone(),
                note_id: r.note_id.clone(),
                chunk_index: r.chunk_index,
                content: r.content.clone(),
                note_title: r.note_title.clone(),
                tags: r.tags.clone(),
                summary: r.summary.clone(),
                cosine: cosine_similarity(query_vector, &r.vector),
            })
            .filter(|hit| hit.cosine >= min_cosine)
            .collect();
        hits.sort_by(|a, b| b.cosine.partial_cmp(&a.cosine).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn indexed_note_ids(&self, owner_id: &str) -> Result<Vec<String>, StoreError> {
        let guard = self.records.lock().unwrap();
        let mut ids: Vec<String> = guard
            .values()
            .filter(|r| r.owner_id == owner_id)
            .map(|r| r.note_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn note_updated_at(&self, note_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let guard = self.records.lock().unwrap();
        Ok(guard.values().find(|r| r.note_id == note_id).map(|r| r.note_updated_at))
    }

    async fn stats(&self, owner_id: &str) -> Result<VectorStoreStats, StoreError> {
        let guard = self.records.lock().unwrap();
        let owned: Vec<&EmbeddingRecord> = guard.values().filter(|r| r.owner_id == owner_id).collect();
        let mut notes: Vec<&str> = owned.iter().map(|r| r.note_id.as_str()).collect();
        notes.sort();
        notes.dedup();
        Ok(VectorStoreStats {
            total_chunks: owned.len(),
            total_notes: notes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(note_id: &str, owner_id: &str, vector: Vec<f32>) -> EmbeddingRecord {
        chunked_record(note_id, owner_id, 0, vector)
    }

    fn chunked_record(note_id: &str, owner_id: &str, chunk_index: usize, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            id: EmbeddingRecord::synthetic_id(note_id, chunk_index),
            note_id: note_id.to_string(),
            owner_id: owner_id.to_string(),
            chunk_index,
            content: "body".to_string(),
            vector,
            dimensions: 3,
            provider: "ollama".to_string(),
            model: "test".to_string(),
            created_at: Utc::now(),
            note_updated_at: Utc::now(),
            note_title: "Title".to_string(),
            tags: vec![],
            summary: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_then_knn_returns_closest_first() {
        let store = InMemoryVectorStore::new();
        store
            .upsert_batch(&[
                record("n1", "u1", vec![1.0, 0.0, 0.0]),
                record("n2", "u1", vec![0.0, 1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store.knn("u1", &[1.0, 0.0, 0.0], 5, 0.0, None).await.unwrap();
        assert_eq!(hits[0].note_id, "n1");
    }

    #[tokio::test]
    async fn test_delete_by_note_removes_only_that_note() {
        let store = InMemoryVectorStore::new();
        store
            .upsert_batch(&[record("n1", "u1", vec![1.0, 0.0, 0.0]), record("n2", "u1", vec![0.0, 1.0, 0.0])])
            .await
            .unwrap();
        store.delete_by_note("u1", "n1").await.unwrap();
        let ids = store.indexed_note_ids("u1").await.unwrap();
        assert_eq!(ids, vec!["n2".to_string()]);
    }

    #[tokio::test]
    async fn test_stats_counts_distinct_notes_and_chunks() {
        let store = InMemoryVectorStore::new();
        store
            .upsert_batch(&[
                chunked_record("n1", "u1", 0, vec![1.0, 0.0, 0.0]),
                chunked_record("n1", "u1", 1, vec![0.0, 1.0, 0.0]),
            ])
            .await
            .unwrap();
        let stats = store.stats("u1").await.unwrap();
        assert_eq!(stats.total_chunks, 2);
        assert_eq!(stats.total_notes, 1);
    }
}
