//! Noteece RAG Core
//!
//! Retrieval-augmented generation engine for the Noteece personal
//! knowledge vault: chunking, incremental indexing, hybrid (dense + BM25)
//! search, query expansion, LLM reranking, and prompt assembly.
//!
//! SPDX-License-Identifier: AGPL-3.0-or-later
//! Copyright (c) 2024-2025 Amirreza 'Farnam' Taheri <taherifarnam@gmail.com>

pub mod config;
pub mod db;
pub mod llm;
pub mod note;
pub mod rag;

pub use config::RagSettings;
pub use note::{Note, NoteSource};
pub use rag::error::RagError;
pub use rag::orchestrator::RetrievalOrchestrator;
pub use rag::types::{RagOptions, RagResult};

/// Initialize the library, specifically the logger.
/// This should be called once at the start of the application.
pub fn init() {
    let _ = env_logger::try_init();
    log::info!("[rag-core] Library initialized");
}

#[cfg(test)]
mod tests {
    #[test]
    fn it_works() {
        assert_eq!(2 + 2, 4);
    }
}
