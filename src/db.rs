//! Ambient (non-vector) persistence
//!
//! Settings, indexing job rows, RAG query logs, and the completion cache
//! live in an embedded SQLite database reached through an `r2d2` pool. This
//! is a different store from the vector embeddings themselves (see
//! `rag::vector_store`), which live in the owner's configured backend.

use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("{0}")]
    Message(String),
}

/// Type alias for the r2d2 connection pool over SQLite.
pub type DbPool = r2d2::Pool<r2d2_sqlite::SqliteConnectionManager>;

/// Get a settings value by key.
pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>, DbError> {
    let result = conn
        .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(result)
}

/// Set a settings value.
pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

/// Create every ambient table this crate needs, idempotently.
pub fn migrate(conn: &Connection) -> Result<(), DbError> {
    log::info!("[db] Running ambient schema migration");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS indexing_job (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            status TEXT NOT NULL,
            provider TEXT NOT NULL,
            model TEXT NOT NULL,
            vector_store_target TEXT NOT NULL,
            total_to_index INTEGER NOT NULL DEFAULT 0,
            processed INTEGER NOT NULL DEFAULT 0,
            skipped INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0,
            errors_json TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_indexing_job_owner ON indexing_job(owner_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rag_query_log (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            conversation_id TEXT,
            query_text TEXT NOT NULL,
            embedding_ms INTEGER,
            vector_ms INTEGER,
            lexical_ms INTEGER,
            rerank_ms INTEGER,
            total_ms INTEGER,
            retrieved_count INTEGER NOT NULL DEFAULT 0,
            final_count INTEGER NOT NULL DEFAULT 0,
            top_cosine REAL,
            avg_cosine REAL,
            top_bm25 REAL,
            avg_bm25 REAL,
            top_rerank REAL,
            avg_rerank REAL,
            features_json TEXT NOT NULL DEFAULT '{}',
            feedback_verdict TEXT,
            feedback_category TEXT,
            feedback_comment TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rag_query_log_owner ON rag_query_log(owner_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lexical_document (
            id TEXT PRIMARY KEY,
            note_id TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            note_title TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lexical_document_owner ON lexical_document(owner_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS llm_cache (
            cache_key TEXT PRIMARY KEY,
            request_json TEXT NOT NULL,
            response_json TEXT NOT NULL,
            model TEXT NOT NULL,
            tokens_used INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            last_accessed INTEGER NOT NULL,
            access_count INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    log::info!("[db] Ambient schema migration complete");
    Ok(())
}
