//! Composite vector store
//!
//! Fans writes out to every configured backend so that switching the
//! active read target never loses history, and reads from a single
//! configurable primary. Used when `RagSettings.vector_store_provider`
//! is `Both`.

use super::{postgres::PostgresVectorStore, pinecone::PineconeVectorStore};
use super::{KnnHit, StoreError, VectorStore, VectorStoreStats};
use crate::config::VectorStoreTarget;
use crate::rag::types::EmbeddingRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::RwLock;

pub struct CompositeVectorStore {
    postgres: PostgresVectorStore,
    pinecone: PineconeVectorStore,
    primary: RwLock<VectorStoreTarget>,
}

impl CompositeVectorStore {
    pub fn new(postgres: PostgresVectorStore, pinecone: PineconeVectorStore, primary: VectorStoreTarget) -> Self {
        Self {
            postgres,
            pinecone,
            primary: RwLock::new(primary),
        }
    }

    /// Choose which backend serves reads. `Both` falls back to Postgres,
    /// since it is the only backend that supports the full read surface
    /// (`indexed_note_ids`, `note_updated_at`) needed by the indexer.
    fn read_target(&self) -> &dyn VectorStore {
        let primary = *self.primary.read().unwrap();
        match primary {
            VectorStoreTarget::Pinecone => &self.pinecone,
            VectorStoreTarget::PostgreSql | VectorStoreTarget::Both => &self.postgres,
        }
    }
}

#[async_trait]
impl VectorStore for CompositeVectorStore {
    async fn upsert_batch(&self, records: &[EmbeddingRecord]) -> Result<(), StoreError> {
        self.postgres.upsert_batch(records).await?;
        self.pinecone.upsert_batch(records).await?;
        Ok(())
    }

    async fn delete_by_note(&self, owner_id: &str, note_id: &str) -> Result<(), StoreError> {
        self.postgres.delete_by_note(owner_id, note_id).await?;
        self.pinecone.delete_by_note(owner_id, note_id).await?;
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
        self.read_target()
            .knn(owner_id, query_vector, k, min_cosine, dimensions)
            .await
    }

    async fn indexed_note_ids(&self, owner_id: &str) -> Result<Vec<String>, StoreError> {
        // Always Postgres: Pinecone has no cheap distinct-metadata listing.
        self.postgres.indexed_note_ids(owner_id).await
    }

    async fn note_updated_at(&self, note_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.postgres.note_updated_at(note_id).await
    }

    async fn stats(&self, owner_id: &str) -> Result<VectorStoreStats, StoreError> {
        self.read_target().stats(owner_id).await
    }

    fn set_read_primary(&self, target: VectorStoreTarget) {
        *self.primary.write().unwrap() = target;
    }
}
