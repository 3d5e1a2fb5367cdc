//! PostgreSQL + pgvector vector store backend

use super::{KnnHit, StoreError, VectorStore, VectorStoreStats};
use crate::rag::types::EmbeddingRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};

pub struct PostgresVectorStore {
    pool: Pool<Postgres>,
}

impl PostgresVectorStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Create the backing table and index, idempotently. Requires the
    /// `vector` extension to already be installed in the target database.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rag_embedding (
                id TEXT PRIMARY KEY,
                note_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                vector vector NOT NULL,
                dimensions INTEGER NOT NULL,
                provider TEXT NOT NULL,
                model TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                note_updated_at TIMESTAMPTZ NOT NULL,
                note_title TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '',
                summary TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rag_embedding_owner ON rag_embedding(owner_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rag_embedding_note ON rag_embedding(note_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl VectorStore for PostgresVectorStore {
    async fn upsert_batch(&self, records: &[EmbeddingRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        for record in records {
            let tags_joined = record.tags.join(",");
            let vector = Vector::from(record.vector.clone());

            sqlx::query(
                "INSERT INTO rag_embedding (
                    id, note_id, owner_id, chunk_index, content, vector, dimensions,
                    provider, model, created_at, note_updated_at, note_title, tags, summary
                ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)
                ON CONFLICT (id) DO UPDATE SET
                    content = excluded.content,
                    vector = excluded.vector,
                    dimensions = excluded.dimensions,
                    provider = excluded.provider,
                    model = excluded.model,
                    created_at = excluded.created_at,
                    note_updated_at = excluded.note_updated_at,
                    note_title = excluded.note_title,
                    tags = excluded.tags,
                    summary = excluded.summary",
            )
            .bind(&record.id)
            .bind(&record.note_id)
            .bind(&record.owner_id)
            .bind(record.chunk_index as i32)
            .bind(&record.content)
            .bind(vector)
            .bind(record.dimensions as i32)
            .bind(&record.provider)
            .bind(&record.model)
            .bind(record.created_at)
            .bind(record.note_updated_at)
            .bind(&record.note_title)
            .bind(tags_joined)
            .bind(&record.summary)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        }

        tx.commit().await.map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete_by_note(&self, owner_id: &str, note_id: &str) -> Result<(), StoreError> {
        let _ = owner_id;
        sqlx::query("DELETE FROM rag_embedding WHERE note_id = $1")
            .bind(note_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
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
        let vector = Vector::from(query_vector.to_vec());

        let rows = if let Some(dims) = dimensions {
            sqlx::query(
                "SELECT id, note_id, chunk_index, content, note_title, tags, summary,
                        1.0 - (vector <=> $1::vector) AS cosine
                 FROM rag_embedding
                 WHERE owner_id = $2 AND dimensions = $3
                 ORDER BY vector <=> $1::vector
                 LIMIT $4",
            )
            .bind(&vector)
            .bind(owner_id)
            .bind(dims as i32)
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(
                "SELECT id, note_id, chunk_index, content, note_title, tags, summary,
                        1.0 - (vector <=> $1::vector) AS cosine
                 FROM rag_embedding
                 WHERE owner_id = $2
                 ORDER BY vector <=> $1::vector
                 LIMIT $3",
            )
            .bind(&vector)
            .bind(owner_id)
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let hits = rows
            .into_iter()
            .map(|row| {
                let tags_str: String = row.get("tags");
                let tags = if tags_str.is_empty() {
                    Vec::new()
                } else {
                    tags_str.split(',').map(String::from).collect()
                };
                KnnHit {
                    id: row.get("id"),
                    note_id: row.get("note_id"),
                    chunk_index: row.get::<i32, _>("chunk_index") as usize,
                    content: row.get("content"),
                    note_title: row.get("note_title"),
                    tags,
                    summary: row.get("summary"),
                    cosine: row.get::<f64, _>("cosine") as f32,
                }
            })
            .filter(|hit| hit.cosine >= min_cosine)
            .collect();

        Ok(hits)
    }

    async fn indexed_note_ids(&self, owner_id: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT DISTINCT note_id FROM rag_embedding WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(rows.into_iter().map(|r| r.get("note_id")).collect())
    }

    async fn note_updated_at(&self, note_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row = sqlx::query(
            "SELECT note_updated_at FROM rag_embedding WHERE note_id = $1 LIMIT 1",
        )
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(row.map(|r| r.get("note_updated_at")))
    }

    async fn stats(&self, owner_id: &str) -> Result<VectorStoreStats, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total_chunks, COUNT(DISTINCT note_id) AS total_notes
             FROM rag_embedding WHERE owner_id = $1",
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(VectorStoreStats {
            total_chunks: row.get::<i64, _>("total_chunks") as usize,
            total_notes: row.get::<i64, _>("total_notes") as usize,
        })
    }
}
