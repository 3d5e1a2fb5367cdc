//! Note source port
//!
//! The RAG core treats notes as read-only. The host application owns note
//! CRUD, authentication, and storage; this module only defines the shape the
//! core consumes and the port it pulls notes through.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A note as seen by the retrieval core. Attributes mirror the host's note
/// model but only carry what chunking, indexing, and prompt assembly need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub summary: Option<String>,
    pub image_descriptions: Vec<String>,
}

impl Note {
    /// `updated_at` must never precede `created_at`.
    pub fn is_valid(&self) -> bool {
        self.updated_at >= self.created_at
    }
}

#[derive(Error, Debug)]
pub enum NoteSourceError {
    #[error("note source unavailable: {0}")]
    Unavailable(String),
    #[error("note not found: {0}")]
    NotFound(String),
}

/// Read-only note source the indexer and per-note reindex path pull from.
/// Concrete implementations live in the host application; this crate only
/// consumes the trait.
#[async_trait::async_trait]
pub trait NoteSource: Send + Sync {
    /// All notes belonging to `owner_id`, including image descriptions.
    async fn list_notes(&self, owner_id: &str) -> Result<Vec<Note>, NoteSourceError>;

    /// A single note by id, used by `reindex_note`.
    async fn get_note(&self, note_id: &str) -> Result<Option<Note>, NoteSourceError>;
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    /// In-memory note source for tests: a fixed owner-scoped note table.
    #[derive(Default)]
    pub struct InMemoryNoteSource {
        notes: RwLock<HashMap<String, Note>>,
    }

    impl InMemoryNoteSource {
        pub fn new(notes: Vec<Note>) -> Self {
            let map = notes.into_iter().map(|n| (n.id.clone(), n)).collect();
            Self {
                notes: RwLock::new(map),
            }
        }

        pub async fn remove(&self, note_id: &str) {
            self.notes.write().await.remove(note_id);
        }

        pub async fn upsert(&self, note: Note) {
            self.notes.write().await.insert(note.id.clone(), note);
        }
    }

    #[async_trait::async_trait]
    impl NoteSource for InMemoryNoteSource {
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
}
