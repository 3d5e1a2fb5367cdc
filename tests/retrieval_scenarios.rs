//! End-to-end coverage of the retrieval core's concrete scenarios.
//!
//! The completion/embedding ports construct live provider adapters from
//! configuration (no injection seam), so these scenarios exercise every
//! deterministic, network-free stage of the pipeline directly: the vector
//! and lexical stores, hybrid fusion, the reranker's blend/filter/sort
//! contract, prompt assembly, and the indexer's job bookkeeping and
//! stale-note cleanup (which never needs to call an embedding provider when
//! every live note is already up to date).

use chrono::{Duration, Utc};
use noteece_rag_core::config::RagSettings;
use noteece_rag_core::db;
use noteece_rag_core::note::{Note, NoteSource, NoteSourceError};
use noteece_rag_core::rag::analytics::AnalyticsSink;
use noteece_rag_core::rag::hybrid;
use noteece_rag_core::rag::indexer::Indexer;
use noteece_rag_core::rag::lexical::{LexicalDocument, LexicalIndex, SqliteLexicalStore};
use noteece_rag_core::rag::orchestrator::RetrievalOrchestrator;
use noteece_rag_core::rag::reranker;
use noteece_rag_core::rag::types::{EmbeddingRecord, FeedbackVerdict, JobStatus, QueryMetrics};
use noteece_rag_core::rag::vector_store::memory::InMemoryVectorStore;
use noteece_rag_core::rag::vector_store::VectorStore;
use noteece_rag_core::llm::{CompletionClient, EmbeddingClient, LLMConfig};
use r2d2_sqlite::SqliteConnectionManager;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

fn memory_db() -> db::DbPool {
    let manager = SqliteConnectionManager::memory();
    let pool = r2d2::Pool::new(manager).unwrap();
    db::migrate(&pool.get().unwrap()).unwrap();
    pool
}

fn sample_note(id: &str, owner_id: &str, title: &str, body: &str) -> Note {
    let now = Utc::now();
    Note {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        tags: vec![],
        created_at: now - Duration::hours(1),
        updated_at: now,
        summary: None,
        image_descriptions: vec![],
    }
}

fn embedding_record(note: &Note, chunk_index: usize, vector: Vec<f32>) -> EmbeddingRecord {
    EmbeddingRecord {
        id: EmbeddingRecord::synthetic_id(&note.id, chunk_index),
        note_id: note.id.clone(),
        owner_id: note.owner_id.clone(),
        chunk_index,
        content: note.body.clone(),
        vector,
        dimensions: 3,
        provider: "ollama".to_string(),
        model: "test".to_string(),
        created_at: Utc::now(),
        note_updated_at: note.updated_at,
        note_title: note.title.clone(),
        tags: note.tags.clone(),
        summary: note.summary.clone(),
    }
}

struct FakeNoteSource {
    notes: RwLock<HashMap<String, Note>>,
}

impl FakeNoteSource {
    fn new(notes: Vec<Note>) -> Self {
        Self {
            notes: RwLock::new(notes.into_iter().map(|n| (n.id.clone(), n)).collect()),
        }
    }
}

#[async_trait::async_trait]
impl NoteSource for FakeNoteSource {
    async fn list_notes(&self, owner_id: &str) -> Result<Vec<Note>, NoteSourceError> {
        Ok(self
            .notes
            .read()
            .await
            .values()
            .filter(|n| n.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn get_note(&self, note_id: &str) -> Result<Option<Note>, NoteSourceError> {
        Ok(self.notes.read().await.get(note_id).cloned())
    }
}

// Scenario 1: empty corpus. A query against a store with zero indexed notes
// surfaces no candidates, an empty formatted context, and the no-notes
// prompt template; enhance_prompt never fabricates a citation.
#[tokio::test]
async fn scenario_empty_corpus_yields_no_results_and_no_notes_template() {
    let store = InMemoryVectorStore::new();
    let lexical_index = LexicalIndex::build(vec![]);

    let candidates = hybrid::search(
        &store,
        &lexical_index,
        "u1",
        "hello",
        &[1.0, 0.0, 0.0],
        5,
        0.3,
        20,
        1.0,
        1.0,
        60.0,
        None,
        true,
    )
    .await
    .unwrap();
    assert!(candidates.is_empty());

    let db_pool = memory_db();
    let embedding_client = Arc::new(EmbeddingClient::new(LLMConfig::default()));
    let completion_client = Arc::new(CompletionClient::new(LLMConfig::default(), db_pool.clone()));
    let lexical_store = Arc::new(SqliteLexicalStore::new(db_pool.clone()));
    let analytics = Arc::new(AnalyticsSink::new(db_pool));
    let orchestrator = RetrievalOrchestrator::new(
        embedding_client,
        completion_client,
        Arc::new(store),
        lexical_store,
        analytics,
        RagSettings::default(),
    );

    let prompt = orchestrator.enhance_prompt("hi", "");
    assert!(prompt.contains("No relevant notes"));
    assert!(!prompt.contains("[Coffee]"));
}

// Scenario 2: a single tiny note, vector-only (hybrid disabled). Exactly one
// result surfaces, tagged with its note id and chunk index, and the
// assembled prompt cites the note by title and carries its literal body.
#[tokio::test]
async fn scenario_single_note_vector_only_surfaces_one_result() {
    let note = sample_note("N1", "u1", "Coffee", "I brew coffee every morning.");
    let store = InMemoryVectorStore::new();
    store
        .upsert_batch(&[embedding_record(&note, 0, vec![1.0, 0.0, 0.0])])
        .await
        .unwrap();
    let lexical_index = LexicalIndex::build(vec![]);

    let candidates = hybrid::search(
        &store,
        &lexical_index,
        "u1",
        "coffee",
        &[1.0, 0.0, 0.0],
        5,
        0.3,
        20,
        1.0,
        1.0,
        60.0,
        None,
        false,
    )
    .await
    .unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].note_id, "N1");
    assert_eq!(candidates[0].chunk_index, 0);

    let db_pool = memory_db();
    let completion_client = CompletionClient::new(LLMConfig::default(), db_pool);
    let ranked = reranker::rerank(&completion_client, "coffee", candidates, "unused", 5, 5.0, false).await;
    assert_eq!(ranked.len(), 1);
    assert!(ranked[0].final_score > 0.0);
    assert!(!ranked[0].reranked);
    assert!(ranked[0].content.contains("I brew coffee every morning."));
}

// Scenario 3: hybrid fusion surfaces a lexically-strong, vector-weak note
// ahead of a purely vector-ranked one. With K=60 the RRF contribution for
// a rank-4 vector hit plus a rank-1 lexical hit still lets that note win.
#[tokio::test]
async fn scenario_hybrid_fusion_dominates_pure_vector_ranking() {
    let owner = "u1";
    let n1 = sample_note("N1", owner, "Unrelated", "nothing to do with the query");
    let n2 = sample_note("N2", owner, "Rust Async", "rust async runtimes explained in depth");
    let n3 = sample_note("N3", owner, "Filler A", "filler content one");
    let n4 = sample_note("N4", owner, "Filler B", "filler content two");

    let store = InMemoryVectorStore::new();
    // Vector ranking: N1 closest (rank 1), N3/N4 next, N2 weakest (rank 4).
    store
        .upsert_batch(&[
            embedding_record(&n1, 0, vec![1.0, 0.0, 0.0]),
            embedding_record(&n3, 0, vec![0.9, 0.1, 0.0]),
            embedding_record(&n4, 0, vec![0.8, 0.2, 0.0]),
            embedding_record(&n2, 0, vec![0.1, 0.1, 0.9]),
        ])
        .await
        .unwrap();

    // Lexical ranking: N2 is the only match (rank 1), so it dominates BM25.
    let lexical_index = LexicalIndex::build(vec![LexicalDocument {
        id: EmbeddingRecord::synthetic_id(&n2.id, 0),
        note_id: n2.id.clone(),
        chunk_index: 0,
        content: n2.body.clone(),
        note_title: n2.title.clone(),
    }]);

    let candidates = hybrid::search(
        &store,
        &lexical_index,
        owner,
        "rust async",
        &[1.0, 0.0, 0.0],
        5,
        0.0,
        20,
        1.0,
        1.0,
        60.0,
        None,
        true,
    )
    .await
    .unwrap();

    let n2_candidate = candidates.iter().find(|c| c.note_id == "N2").unwrap();
    assert_eq!(n2_candidate.vector_rank, Some(4));
    assert_eq!(n2_candidate.bm25_rank, Some(1));
    let expected = 1.0 / (60.0 + 4.0) + 1.0 / (60.0 + 1.0);
    assert!((n2_candidate.fused_score - expected).abs() < 1e-4);

    let db_pool = memory_db();
    let completion_client = CompletionClient::new(LLMConfig::default(), db_pool);
    let ranked = reranker::rerank(&completion_client, "rust async", candidates, "unused", 5, 0.0, false).await;
    assert_eq!(ranked[0].note_id, "N2");
}

// Scenario 4: the indexing job's cancellation contract. Cancellation is
// cooperative through the persisted job row; a request takes effect the
// next time the background loop polls between notes.
#[test]
fn scenario_cancellation_mid_index_persists_cancelled_status() {
    use noteece_rag_core::rag::indexer::{cancel_job, get_job};
    use noteece_rag_core::rag::types::IndexingJob;

    let db_pool = memory_db();
    let job = IndexingJob {
        id: "job-1".to_string(),
        owner_id: "u1".to_string(),
        status: JobStatus::Running,
        provider: "Ollama".to_string(),
        model: "test".to_string(),
        vector_store_target: "PostgreSql".to_string(),
        total_to_index: 1000,
        processed: 10,
        skipped: 0,
        deleted: 0,
        errors: vec![],
        created_at: Utc::now(),
        started_at: Some(Utc::now()),
        completed_at: None,
    };
    {
        let conn = db_pool.get().unwrap();
        conn.execute(
            "INSERT INTO indexing_job (
                id, owner_id, status, provider, model, vector_store_target,
                total_to_index, processed, skipped, deleted, errors_json, created_at, started_at, completed_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            rusqlite::params![
                job.id,
                job.owner_id,
                "Running",
                job.provider,
                job.model,
                job.vector_store_target,
                job.total_to_index as i64,
                job.processed as i64,
                job.skipped as i64,
                job.deleted as i64,
                "[]",
                job.created_at.to_rfc3339(),
                job.started_at.map(|t| t.to_rfc3339()),
                job.completed_at.map(|t| t.to_rfc3339()),
            ],
        )
        .unwrap();
    }

    cancel_job(&db_pool, "job-1").unwrap();
    let reloaded = get_job(&db_pool, "job-1").unwrap().unwrap();
    assert_eq!(reloaded.status, JobStatus::Cancelled);
    assert_eq!(reloaded.processed, 10);
}

// Scenario 5: a note deleted from the source gets its embeddings and
// lexical documents removed, while up-to-date notes are skipped (so the
// run never needs to call an embedding provider).
#[tokio::test]
async fn scenario_stale_note_cleanup_deletes_only_the_removed_note() {
    let owner = "u1";
    let a = sample_note("A", owner, "A", "content a");
    let b = sample_note("B", owner, "B", "content b");
    let c = sample_note("C", owner, "C", "content c");

    let store = Arc::new(InMemoryVectorStore::new());
    store
        .upsert_batch(&[
            embedding_record(&a, 0, vec![1.0, 0.0, 0.0]),
            embedding_record(&b, 0, vec![0.0, 1.0, 0.0]),
            embedding_record(&c, 0, vec![0.0, 0.0, 1.0]),
        ])
        .await
        .unwrap();

    let db_pool = memory_db();
    let lexical_store = Arc::new(SqliteLexicalStore::new(db_pool.clone()));
    lexical_store
        .upsert_batch(&[
            embedding_record(&a, 0, vec![1.0, 0.0, 0.0]),
            embedding_record(&b, 0, vec![0.0, 1.0, 0.0]),
            embedding_record(&c, 0, vec![0.0, 0.0, 1.0]),
        ])
        .unwrap();

    // B is gone from the live source; A and C are unchanged since indexing
    // (their watermark, stamped from their `updated_at` at embed time, is
    // already >= their current `updated_at`).
    let note_source: Arc<dyn NoteSource> = Arc::new(FakeNoteSource::new(vec![a.clone(), c.clone()]));

    let embedding_client = Arc::new(EmbeddingClient::new(LLMConfig::default()));
    let job_db_pool = db_pool.clone();
    let indexer = Indexer::new(
        db_pool,
        note_source,
        store.clone() as Arc<dyn VectorStore>,
        lexical_store.clone(),
        embedding_client,
        RagSettings::default(),
        None,
    );

    let job_id = indexer
        .start("u1", None, None, Some(noteece_rag_core::config::VectorStoreTarget::PostgreSql), Some(3))
        .await
        .unwrap();

    // A and C are both skipped by watermark, so the loop never needs to call
    // an embedding provider and finishes almost immediately; poll until the
    // spawned background task has persisted a terminal status.
    use noteece_rag_core::rag::indexer::get_job;
    for _ in 0..50 {
        let job = get_job(&job_db_pool, &job_id).unwrap();
        if matches!(job.as_ref().map(|j| j.status), Some(JobStatus::Completed) | Some(JobStatus::PartiallyCompleted)) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    let job = get_job(&job_db_pool, &job_id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.deleted, 1);
    assert_eq!(job.skipped, 2);
    assert_eq!(job.total_to_index, 0);

    let remaining = store.indexed_note_ids("u1").await.unwrap();
    assert!(remaining.contains(&"A".to_string()));
    assert!(remaining.contains(&"C".to_string()));
    assert!(!remaining.contains(&"B".to_string()));
}

// Scenario 6: reranking drops candidates below the minimum score and
// truncates to top_k, preserving relevance-descending order.
#[tokio::test]
async fn scenario_rerank_filtering_keeps_only_scores_at_or_above_minimum() {
    // Exercised as a pure unit test inside reranker.rs
    // (`test_blend_and_filter_drops_below_threshold_and_orders_by_relevance`)
    // since scoring itself requires a live completion backend. This test
    // instead checks the disabled-reranking path still produces a bounded,
    // score-sorted result for the same candidate shape.
    let mut candidates = Vec::new();
    for (i, score) in [0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.3, 0.2].iter().enumerate() {
        candidates.push(noteece_rag_core::rag::types::Candidate {
            id: i.to_string(),
            note_id: i.to_string(),
            chunk_index: 0,
            content: "c".to_string(),
            note_title: "t".to_string(),
            tags: vec![],
            summary: None,
            vector_score: *score,
            bm25_score: 0.0,
            vector_rank: Some(i + 1),
            bm25_rank: None,
            fused_score: *score,
            found_in_vector: true,
            found_in_bm25: false,
        });
    }

    let db_pool = memory_db();
    let completion_client = CompletionClient::new(LLMConfig::default(), db_pool);
    let ranked = reranker::rerank(&completion_client, "q", candidates, "unused", 5, 0.0, false).await;
    assert_eq!(ranked.len(), 5);
    assert!((ranked[0].final_score - 0.9).abs() < 1e-6);
}

#[test]
fn analytics_feedback_round_trip_matches_last_write() {
    let db_pool = memory_db();
    let sink = AnalyticsSink::new(db_pool);
    let metrics = QueryMetrics {
        owner_id: "u1".to_string(),
        query_text: "q".to_string(),
        total_ms: Some(50),
        ..Default::default()
    };
    let id = sink.log(&metrics).unwrap();
    sink.update_feedback(&id, FeedbackVerdict::Positive, None, None).unwrap();
    sink.update_feedback(&id, FeedbackVerdict::Negative, Some("wrong note"), None).unwrap();
    let stats = sink.performance_stats("u1", None).unwrap();
    assert_eq!(stats.positive_rate, Some(0.0));
}
