//! Indexer (C6)
//!
//! Incremental fan-out from notes -> chunks -> embeddings -> vector store,
//! with per-note watermarking and cooperative cancellation through a
//! persisted job row.

use crate::config::{RagSettings, VectorStoreTarget};
use crate::db::DbPool;
use crate::llm::providers::ProviderType;
use crate::llm::EmbeddingClient;
use crate::note::NoteSource;
use crate::rag::chunker::chunk_note;
use crate::rag::error::RagError;
use crate::rag::lexical::SqliteLexicalStore;
use crate::rag::types::{EmbeddingRecord, IndexingJob, JobStatus};
use crate::rag::vector_store::VectorStore;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::collections::HashSet;
use std::sync::Arc;
use ulid::Ulid;

fn status_to_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "Pending",
        JobStatus::Running => "Running",
        JobStatus::Completed => "Completed",
        JobStatus::PartiallyCompleted => "PartiallyCompleted",
        JobStatus::Failed => "Failed",
        JobStatus::Cancelled => "Cancelled",
    }
}

fn status_from_str(s: &str) -> JobStatus {
    match s {
        "Running" => JobStatus::Running,
        "Completed" => JobStatus::Completed,
        "PartiallyCompleted" => JobStatus::PartiallyCompleted,
        "Failed" => JobStatus::Failed,
        "Cancelled" => JobStatus::Cancelled,
        _ => JobStatus::Pending,
    }
}

fn insert_job(db_pool: &DbPool, job: &IndexingJob) -> Result<(), RagError> {
    let conn = db_pool.get().map_err(|e| RagError::Internal(e.to_string()))?;
    conn.execute(
        "INSERT INTO indexing_job (
            id, owner_id, status, provider, model, vector_store_target,
            total_to_index, processed, skipped, deleted, errors_json, created_at, started_at, completed_at
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
        params![
            job.id,
            job.owner_id,
            status_to_str(job.status),
            job.provider,
            job.model,
            job.vector_store_target,
            job.total_to_index as i64,
            job.processed as i64,
            job.skipped as i64,
            job.deleted as i64,
            serde_json::to_string(&job.errors).unwrap_or_else(|_| "[]".to_string()),
            job.created_at.to_rfc3339(),
            job.started_at.map(|t| t.to_rfc3339()),
            job.completed_at.map(|t| t.to_rfc3339()),
        ],
    )
    .map_err(|e| RagError::Internal(e.to_string()))?;
    Ok(())
}

fn persist_job(db_pool: &DbPool, job: &IndexingJob) -> Result<(), RagError> {
    let conn = db_pool.get().map_err(|e| RagError::Internal(e.to_string()))?;
    conn.execute(
        "UPDATE indexing_job SET status=?1, total_to_index=?2, processed=?3, skipped=?4,
            deleted=?5, errors_json=?6, started_at=?7, completed_at=?8 WHERE id=?9",
        params![
            status_to_str(job.status),
            job.total_to_index as i64,
            job.processed as i64,
            job.skipped as i64,
            job.deleted as i64,
            serde_json::to_string(&job.errors).unwrap_or_else(|_| "[]".to_string()),
            job.started_at.map(|t| t.to_rfc3339()),
            job.completed_at.map(|t| t.to_rfc3339()),
            job.id,
        ],
    )
    .map_err(|e| RagError::Internal(e.to_string()))?;
    Ok(())
}

/// Reads only the job's status column, the minimal poll the background
/// loop needs between notes to observe a cancellation request.
fn poll_status(db_pool: &DbPool, job_id: &str) -> Result<JobStatus, RagError> {
    let conn = db_pool.get().map_err(|e| RagError::Internal(e.to_string()))?;
    let status: String = conn
        .query_row("SELECT status FROM indexing_job WHERE id = ?1", [job_id], |row| row.get(0))
        .map_err(|e| RagError::Internal(e.to_string()))?;
    Ok(status_from_str(&status))
}

pub fn get_job(db_pool: &DbPool, job_id: &str) -> Result<Option<IndexingJob>, RagError> {
    let conn = db_pool.get().map_err(|e| RagError::Internal(e.to_string()))?;
    let row = conn
        .query_row(
            "SELECT id, owner_id, status, provider, model, vector_store_target, total_to_index,
                processed, skipped, deleted, errors_json, created_at, started_at, completed_at
             FROM indexing_job WHERE id = ?1",
            [job_id],
            |row| {
                let errors_json: String = row.get(10)?;
                let created_at: String = row.get(11)?;
                let started_at: Option<String> = row.get(12)?;
                let completed_at: Option<String> = row.get(13)?;
                Ok(IndexingJob {
                    id: row.get(0)?,
                    owner_id: row.get(1)?,
                    status: status_from_str(&row.get::<_, String>(2)?),
                    provider: row.get(3)?,
                    model: row.get(4)?,
                    vector_store_target: row.get(5)?,
                    total_to_index: row.get::<_, i64>(6)? as usize,
                    processed: row.get::<_, i64>(7)? as usize,
                    skipped: row.get::<_, i64>(8)? as usize,
                    deleted: row.get::<_, i64>(9)? as usize,
                    errors: serde_json::from_str(&errors_json).unwrap_or_default(),
                    created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
                    started_at: started_at.and_then(|s| s.parse().ok()),
                    completed_at: completed_at.and_then(|s| s.parse().ok()),
                })
            },
        )
        .optional()
        .map_err(|e| RagError::Internal(e.to_string()))?;
    Ok(row)
}

/// Requests cancellation of a running job. Cooperative: takes effect the
/// next time the background loop polls between notes.
pub fn cancel_job(db_pool: &DbPool, job_id: &str) -> Result<(), RagError> {
    let conn = db_pool.get().map_err(|e| RagError::Internal(e.to_string()))?;
    conn.execute(
        "UPDATE indexing_job SET status = 'Cancelled' WHERE id = ?1 AND status IN ('Pending', 'Running')",
        [job_id],
    )
    .map_err(|e| RagError::Internal(e.to_string()))?;
    Ok(())
}

#[derive(Clone)]
pub struct Indexer {
    db_pool: DbPool,
    note_source: Arc<dyn NoteSource>,
    vector_store: Arc<dyn VectorStore>,
    lexical_store: Arc<SqliteLexicalStore>,
    embedding_client: Arc<EmbeddingClient>,
    settings: RagSettings,
    /// Fixed dimension of the managed (Pinecone) index, when configured.
    managed_index_dimension: Option<usize>,
}

impl Indexer {
    pub fn new(
        db_pool: DbPool,
        note_source: Arc<dyn NoteSource>,
        vector_store: Arc<dyn VectorStore>,
        lexical_store: Arc<SqliteLexicalStore>,
        embedding_client: Arc<EmbeddingClient>,
        settings: RagSettings,
        managed_index_dimension: Option<usize>,
    ) -> Self {
        Self {
            db_pool,
            note_source,
            vector_store,
            lexical_store,
            embedding_client,
            settings,
            managed_index_dimension,
        }
    }

    /// Validates, creates the Pending job row, and launches the background
    /// loop on a detached task. Returns the job id immediately.
    pub async fn start(
        &self,
        owner_id: &str,
        provider: Option<ProviderType>,
        model: Option<String>,
        vector_store_target: Option<VectorStoreTarget>,
        dimensions: Option<usize>,
    ) -> Result<String, RagError> {
        let target = vector_store_target.unwrap_or(self.settings.vector_store_provider);
        let resolved_dimension = dimensions.unwrap_or(self.settings.embedding_dimensions);

        if matches!(target, VectorStoreTarget::Pinecone | VectorStoreTarget::Both) {
            if let Some(fixed) = self.managed_index_dimension {
                if fixed != resolved_dimension {
                    return Err(RagError::DimensionMismatch {
                        expected: fixed,
                        actual: resolved_dimension,
                    });
                }
            }
        }

        let resolved_provider = provider.unwrap_or(
            ProviderType::parse(&self.settings.embedding_provider).unwrap_or(ProviderType::Ollama),
        );
        let resolved_model = model.unwrap_or_else(|| self.settings.embedding_model.clone());

        let job = IndexingJob {
            id: Ulid::new().to_string(),
            owner_id: owner_id.to_string(),
            status: JobStatus::Pending,
            provider: format!("{resolved_provider:?}"),
            model: resolved_model.clone(),
            vector_store_target: format!("{target:?}"),
            total_to_index: 0,
            processed: 0,
            skipped: 0,
            deleted: 0,
            errors: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        insert_job(&self.db_pool, &job)?;

        let job_id = job.id.clone();
        let this = self.clone();
        let owner_id = owner_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = this
                .run_job(job, owner_id, resolved_provider, resolved_model, resolved_dimension)
                .await
            {
                log::error!("[indexer] job failed with an unrecoverable error: {e}");
            }
        });

        Ok(job_id)
    }

    async fn run_job(
        &self,
        mut job: IndexingJob,
        owner_id: String,
        provider: ProviderType,
        model: String,
        dimensions: usize,
    ) -> Result<(), RagError> {
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        persist_job(&self.db_pool, &job)?;

        if let Err(e) = self.run_job_body(&mut job, &owner_id, provider, &model, dimensions).await {
            job.status = JobStatus::Failed;
            job.errors.push(format!("fatal error: {e}"));
            job.completed_at = Some(Utc::now());
            persist_job(&self.db_pool, &job)?;
        }

        Ok(())
    }

    /// The indexing loop proper. Any `Err` it returns is fatal (database or
    /// vector-store connectivity lost mid-run) and the caller persists
    /// `Failed`; per-note failures (a single embedding call, a single
    /// store write) are instead pushed onto `job.errors` so the run
    /// continues and the terminal status becomes `PartiallyCompleted`.
    async fn run_job_body(
        &self,
        job: &mut IndexingJob,
        owner_id: &str,
        provider: ProviderType,
        model: &str,
        dimensions: usize,
    ) -> Result<(), RagError> {
        let notes = match self.note_source.list_notes(owner_id).await {
            Ok(notes) => notes,
            Err(e) => {
                job.status = JobStatus::Failed;
                job.errors.push(format!("list_notes failed: {e}"));
                job.completed_at = Some(Utc::now());
                persist_job(&self.db_pool, job)?;
                return Ok(());
            }
        };

        let current_ids: HashSet<String> = notes.iter().map(|n| n.id.clone()).collect();

        let indexed_ids = self
            .vector_store
            .indexed_note_ids(owner_id)
            .await
            .map_err(|e| RagError::StoreError(e.to_string()))?;

        for stale_id in indexed_ids.iter().filter(|id| !current_ids.contains(*id)) {
            match self.vector_store.delete_by_note(owner_id, stale_id).await {
                Err(e) => job.errors.push(format!("delete_by_note({stale_id}) failed: {e}")),
                Ok(()) => match self.lexical_store.delete_by_note(stale_id) {
                    Err(e) => job.errors.push(format!("lexical delete_by_note({stale_id}) failed: {e}")),
                    Ok(()) => job.deleted += 1,
                },
            }
        }

        let mut to_index = Vec::new();
        let mut skipped = 0usize;
        for note in notes {
            let watermark = self
                .vector_store
                .note_updated_at(&note.id)
                .await
                .map_err(|e| RagError::StoreError(e.to_string()))?;
            match watermark {
                Some(ts) if ts >= note.updated_at => skipped += 1,
                _ => to_index.push(note),
            }
        }

        job.total_to_index = to_index.len();
        job.skipped = skipped;
        persist_job(&self.db_pool, job)?;

        for note in to_index {
            if poll_status(&self.db_pool, &job.id)? == JobStatus::Cancelled {
                job.completed_at = Some(Utc::now());
                persist_job(&self.db_pool, job)?;
                return Ok(());
            }

            if let Err(e) = self.vector_store.delete_by_note(owner_id, &note.id).await {
                job.errors.push(format!("{}: delete_by_note failed: {e}", note.id));
            }
            if let Err(e) = self.lexical_store.delete_by_note(&note.id) {
                job.errors.push(format!("{}: lexical delete_by_note failed: {e}", note.id));
            }

            let chunks = chunk_note(&note, &self.settings);
            let mut records = Vec::with_capacity(chunks.len());

            for chunk in &chunks {
                match self
                    .embedding_client
                    .embed(provider, &chunk.content, Some(model), Some(dimensions))
                    .await
                {
                    Ok(result) => {
                        records.push(EmbeddingRecord {
                            id: EmbeddingRecord::synthetic_id(&note.id, chunk.index),
                            note_id: note.id.clone(),
                            owner_id: owner_id.to_string(),
                            chunk_index: chunk.index,
                            content: chunk.content.clone(),
                            vector: result.vector,
                            dimensions,
                            provider: format!("{provider:?}"),
                            model: model.to_string(),
                            created_at: Utc::now(),
                            note_updated_at: note.updated_at,
                            note_title: note.title.clone(),
                            tags: note.tags.clone(),
                            summary: note.summary.clone(),
                        });
                    }
                    Err(e) => {
                        job.errors.push(format!("{}:{}: embedding failed: {e}", note.id, chunk.index));
                    }
                }
            }

            if !records.is_empty() {
                if let Err(e) = self.vector_store.upsert_batch(&records).await {
                    job.errors.push(format!("{}: upsert_batch failed: {e}", note.id));
                } else if let Err(e) = self.lexical_store.upsert_batch(&records) {
                    job.errors.push(format!("{}: lexical upsert_batch failed: {e}", note.id));
                }
            }

            job.processed += 1;
            persist_job(&self.db_pool, job)?;
        }

        job.status = if job.errors.is_empty() {
            JobStatus::Completed
        } else {
            JobStatus::PartiallyCompleted
        };
        job.completed_at = Some(Utc::now());
        persist_job(&self.db_pool, job)?;
        Ok(())
    }

    /// Per-note hot path used by live note updates: reuses the same
    /// delete-then-embed-then-upsert sequence as the background loop's
    /// per-note step, but runs synchronously for a single note.
    pub async fn reindex_note(
        &self,
        note_id: &str,
        owner_id: &str,
        provider: ProviderType,
        model: &str,
        dimensions: usize,
    ) -> Result<(), RagError> {
        let note = self
            .note_source
            .get_note(note_id)
            .await
            .map_err(|e| RagError::Internal(e.to_string()))?
            .ok_or_else(|| RagError::NotFound(format!("note {note_id} not found")))?;

        self.vector_store
            .delete_by_note(owner_id, note_id)
            .await
            .map_err(|e| RagError::StoreError(e.to_string()))?;
        self.lexical_store.delete_by_note(note_id)?;

        let chunks = chunk_note(&note, &self.settings);
        let mut records = Vec::with_capacity(chunks.len());

        for chunk in &chunks {
            let result = self
                .embedding_client
                .embed(provider, &chunk.content, Some(model), Some(dimensions))
                .await
                .map_err(RagError::ProviderError)?;

            records.push(EmbeddingRecord {
                id: EmbeddingRecord::synthetic_id(&note.id, chunk.index),
                note_id: note.id.clone(),
                owner_id: owner_id.to_string(),
                chunk_index: chunk.index,
                content: chunk.content.clone(),
                vector: result.vector,
                dimensions,
                provider: format!("{provider:?}"),
                model: model.to_string(),
                created_at: Utc::now(),
                note_updated_at: note.updated_at,
                note_title: note.title.clone(),
                tags: note.tags.clone(),
                summary: note.summary.clone(),
            });
        }

        if !records.is_empty() {
            self.vector_store
                .upsert_batch(&records)
                .await
                .map_err(|e| RagError::StoreError(e.to_string()))?;
            self.lexical_store.upsert_batch(&records)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::PartiallyCompleted,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(status_from_str(status_to_str(status)), status);
        }
    }
}
