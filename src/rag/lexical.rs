//! Lexical index (C4)
//!
//! In-process BM25 scoring over a note corpus's chunk content, with title
//! terms weighted more heavily than body terms. No external search engine
//! dependency: the corpus is small enough per owner that an in-memory
//! inverted index rebuilt per query is cheap and avoids a second store to
//! keep consistent with the vector index.

use crate::db::DbPool;
use crate::rag::error::RagError;
use crate::rag::types::EmbeddingRecord;
use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::params;
use std::collections::HashMap;

const K1: f32 = 1.2;
const B: f32 = 0.75;
const AVG_DOC_LEN: f32 = 500.0;
const TITLE_WEIGHT: f32 = 3.0;

lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(r"[A-Za-z0-9_]+").unwrap();
    static ref SANITIZE_RE: Regex = Regex::new(r"[^\w\s\-]").unwrap();
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
}

/// One document indexed for BM25 scoring: a chunk's content plus its
/// parent note's title, tokenized separately so title terms can be
/// up-weighted.
#[derive(Debug, Clone)]
pub struct LexicalDocument {
    pub id: String,
    pub note_id: String,
    pub chunk_index: usize,
    pub content: String,
    pub note_title: String,
}

struct IndexedDoc {
    doc: LexicalDocument,
    term_counts: HashMap<String, f32>,
    doc_len: f32,
}

/// Sanitizes a raw query into lowercase alphanumeric/underscore/hyphen
/// tokens with collapsed whitespace. Returns an empty string for
/// whitespace-only or punctuation-only input.
pub fn sanitize_query(query: &str) -> String {
    let stripped = SANITIZE_RE.replace_all(query, " ");
    let collapsed = WHITESPACE_RE.replace_all(stripped.trim(), " ");
    collapsed.to_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    TOKEN_RE
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// A query's lexical matches against one owner's corpus, scored with BM25.
pub struct LexicalIndex {
    docs: Vec<IndexedDoc>,
    doc_freq: HashMap<String, usize>,
    avg_doc_len: f32,
}

impl LexicalIndex {
    /// Builds an index from scratch over the given documents. Title terms
    /// are counted `TITLE_WEIGHT` times toward both term frequency and
    /// document length, mirroring a field-boosted BM25F.
    pub fn build(documents: Vec<LexicalDocument>) -> Self {
        let mut docs = Vec::with_capacity(documents.len());
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0.0f32;

        for doc in documents {
            let body_tokens = tokenize(&doc.content);
            let title_tokens = tokenize(&doc.note_title);

            let mut term_counts: HashMap<String, f32> = HashMap::new();
            for t in &body_tokens {
                *term_counts.entry(t.clone()).or_insert(0.0) += 1.0;
            }
            for t in &title_tokens {
                *term_counts.entry(t.clone()).or_insert(0.0) += TITLE_WEIGHT;
            }

            let doc_len = body_tokens.len() as f32 + title_tokens.len() as f32 * TITLE_WEIGHT;
            total_len += doc_len;

            for term in term_counts.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }

            docs.push(IndexedDoc {
                doc,
                term_counts,
                doc_len,
            });
        }

        let avg_doc_len = if docs.is_empty() {
            AVG_DOC_LEN
        } else {
            total_len / docs.len() as f32
        };

        Self {
            docs,
            doc_freq,
            avg_doc_len,
        }
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.docs.len() as f32;
        let df = *self.doc_freq.get(term).unwrap_or(&0) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Scores every document against the sanitized query and returns
    /// `(document id, bm25 score)` pairs for documents with a non-zero
    /// score, sorted descending. Returns an empty vector for an empty or
    /// whitespace-only query.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(String, f32)> {
        let sanitized = sanitize_query(query);
        if sanitized.is_empty() {
            return Vec::new();
        }

        let query_terms = tokenize(&sanitized);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(String, f32)> = self
            .docs
            .iter()
            .filter_map(|indexed| {
                let mut score = 0.0f32;
                for term in &query_terms {
                    let tf = *indexed.term_counts.get(term).unwrap_or(&0.0);
                    if tf == 0.0 {
                        continue;
                    }
                    let idf = self.idf(term);
                    let numerator = tf * (K1 + 1.0);
                    let denominator =
                        tf + K1 * (1.0 - B + B * (indexed.doc_len / self.avg_doc_len));
                    score += idf * (numerator / denominator);
                }
                if score > 0.0 {
                    Some((indexed.doc.id.clone(), score))
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }
}

/// Ambient-database-backed persistence for lexical documents. The indexer
/// writes here in lockstep with the vector store so both indexes stay
/// consistent; queries rebuild an in-process `LexicalIndex` from the
/// owner's rows, which is cheap at personal-corpus scale.
pub struct SqliteLexicalStore {
    db_pool: DbPool,
}

impl SqliteLexicalStore {
    pub fn new(db_pool: DbPool) -> Self {
        Self { db_pool }
    }

    pub fn upsert_batch(&self, records: &[EmbeddingRecord]) -> Result<(), RagError> {
        if records.is_empty() {
            return Ok(());
        }
        let conn = self.db_pool.get().map_err(|e| RagError::Internal(e.to_string()))?;
        for record in records {
            conn.execute(
                "INSERT INTO lexical_document (id, note_id, owner_id, chunk_index, content, note_title)
                 VALUES (?1,?2,?3,?4,?5,?6)
                 ON CONFLICT(id) DO UPDATE SET content = excluded.content, note_title = excluded.note_title",
                params![record.id, record.note_id, record.owner_id, record.chunk_index as i64, record.content, record.note_title],
            )
            .map_err(|e| RagError::Internal(e.to_string()))?;
        }
        Ok(())
    }

    pub fn delete_by_note(&self, note_id: &str) -> Result<(), RagError> {
        let conn = self.db_pool.get().map_err(|e| RagError::Internal(e.to_string()))?;
        conn.execute("DELETE FROM lexical_document WHERE note_id = ?1", [note_id])
            .map_err(|e| RagError::Internal(e.to_string()))?;
        Ok(())
    }

    /// Rebuilds the in-process BM25 index over everything currently stored
    /// for `owner_id`.
    pub fn load_index(&self, owner_id: &str) -> Result<LexicalIndex, RagError> {
        let conn = self.db_pool.get().map_err(|e| RagError::Internal(e.to_string()))?;
        let mut stmt = conn
            .prepare("SELECT id, note_id, chunk_index, content, note_title FROM lexical_document WHERE owner_id = ?1")
            .map_err(|e| RagError::Internal(e.to_string()))?;

        let docs = stmt
            .query_map([owner_id], |row| {
                Ok(LexicalDocument {
                    id: row.get(0)?,
                    note_id: row.get(1)?,
                    chunk_index: row.get::<_, i64>(2)? as usize,
                    content: row.get(3)?,
                    note_title: row.get(4)?,
                })
            })
            .map_err(|e| RagError::Internal(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RagError::Internal(e.to_string()))?;

        Ok(LexicalIndex::build(docs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, content: &str, title: &str) -> LexicalDocument {
        LexicalDocument {
            id: id.to_string(),
            note_id: "note-1".to_string(),
            chunk_index: 0,
            content: content.to_string(),
            note_title: title.to_string(),
        }
    }

    #[test]
    fn test_sanitize_query_collapses_whitespace_and_punctuation() {
        assert_eq!(sanitize_query("  Rust   async!!  "), "rust async");
    }

    #[test]
    fn test_sanitize_query_empty_for_punctuation_only() {
        assert_eq!(sanitize_query("???"), "");
    }

    #[test]
    fn test_search_empty_query_returns_empty() {
        let index = LexicalIndex::build(vec![doc("a", "rust programming", "Intro")]);
        assert!(index.search("   ", 10).is_empty());
    }

    #[test]
    fn test_search_ranks_title_match_higher() {
        let index = LexicalIndex::build(vec![
            doc("a", "this document mentions rust once", "Unrelated"),
            doc("b", "this document is about cooking", "Rust Programming Guide"),
        ]);
        let results = index.search("rust", 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "b");
    }

    #[test]
    fn test_search_no_match_returns_empty() {
        let index = LexicalIndex::build(vec![doc("a", "completely unrelated text", "Title")]);
        assert!(index.search("nonexistentterm", 10).is_empty());
    }

    fn memory_pool() -> DbPool {
        let manager = r2d2_sqlite::SqliteConnectionManager::memory();
        let pool = r2d2::Pool::new(manager).unwrap();
        crate::db::migrate(&pool.get().unwrap()).unwrap();
        pool
    }

    fn sample_record(id: &str, note_id: &str, owner_id: &str) -> EmbeddingRecord {
        EmbeddingRecord {
            id: id.to_string(),
            note_id: note_id.to_string(),
            owner_id: owner_id.to_string(),
            chunk_index: 0,
            content: "rust is a systems language".to_string(),
            vector: vec![0.1, 0.2],
            dimensions: 2,
            provider: "ollama".to_string(),
            model: "test".to_string(),
            created_at: chrono::Utc::now(),
            note_updated_at: chrono::Utc::now(),
            note_title: "Rust Notes".to_string(),
            tags: vec![],
            summary: None,
        }
    }

    #[test]
    fn test_sqlite_lexical_store_roundtrip() {
        let store = SqliteLexicalStore::new(memory_pool());
        store.upsert_batch(&[sample_record("r1", "n1", "u1")]).unwrap();

        let index = store.load_index("u1").unwrap();
        let results = index.search("rust", 10);
        assert_eq!(results.len(), 1);

        store.delete_by_note("n1").unwrap();
        let index = store.load_index("u1").unwrap();
        assert!(index.search("rust", 10).is_empty());
    }
}
