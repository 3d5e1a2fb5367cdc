//! Retrieval orchestrator (C10)
//!
//! Drives the query expander, hybrid searcher, and reranker for one query,
//! groups surviving chunks back into per-note blocks, assembles the
//! citation-ready prompt, and records analytics.

use crate::config::RagSettings;
use crate::llm::providers::ProviderType;
use crate::llm::{CompletionClient, EmbeddingClient};
use crate::rag::analytics::AnalyticsSink;
use crate::rag::chunker::estimate_tokens;
use crate::rag::error::RagError;
use crate::rag::expander;
use crate::rag::hybrid;
use crate::rag::lexical::SqliteLexicalStore;
use crate::rag::reranker;
use crate::rag::types::{Candidate, EffectiveOptions, QueryMetrics, RagOptions, RagResult, RankedChunk};
use crate::rag::vector_store::VectorStore;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

lazy_static! {
    static ref TAGS_LINE_RE: Regex = Regex::new(r"(?m)^Tags: (.*)$").unwrap();
}

const NO_NOTES_TEMPLATE: &str = "You are a helpful assistant. No relevant notes were found for this \
question. Answer only from general knowledge, state clearly that no personal notes were available, \
and do not fabricate citations.\n\nUser: {user_prompt}";

const WITH_CONTEXT_TEMPLATE: &str = "You are a helpful assistant answering from the user's own notes. \
Use the following context to answer the question. Cite every claim drawn from the notes as \
[Note Title]. If the context does not contain the answer, say so rather than inventing one. \
Respect any dates found in the context's metadata lines.\n\nContext:\n{context}\n\nUser: {user_prompt}";

pub struct RetrievalOrchestrator {
    embedding_client: Arc<EmbeddingClient>,
    completion_client: Arc<CompletionClient>,
    vector_store: Arc<dyn VectorStore>,
    lexical_store: Arc<SqliteLexicalStore>,
    analytics: Arc<AnalyticsSink>,
    settings: RagSettings,
}

impl RetrievalOrchestrator {
    pub fn new(
        embedding_client: Arc<EmbeddingClient>,
        completion_client: Arc<CompletionClient>,
        vector_store: Arc<dyn VectorStore>,
        lexical_store: Arc<SqliteLexicalStore>,
        analytics: Arc<AnalyticsSink>,
        settings: RagSettings,
    ) -> Self {
        Self {
            embedding_client,
            completion_client,
            vector_store,
            lexical_store,
            analytics,
            settings,
        }
    }

    pub async fn retrieve(&self, query: &str, owner_id: &str, options: &RagOptions) -> Result<RagResult, RagError> {
        if query.trim().is_empty() {
            return Err(RagError::InputError("query must not be empty".to_string()));
        }
        if owner_id.trim().is_empty() {
            return Err(RagError::InputError("owner id must not be empty".to_string()));
        }

        let effective = EffectiveOptions::resolve(&self.settings, options);

        if let Some(target) = effective.vector_store_provider {
            self.vector_store.set_read_primary(target);
        }

        let mut metrics = QueryMetrics {
            owner_id: owner_id.to_string(),
            query_text: query.to_string(),
            hybrid_enabled: effective.enable_hybrid,
            hyde_enabled: effective.enable_hyde,
            multi_query_enabled: effective.enable_multi_query,
            reranking_enabled: effective.enable_reranking,
            ..Default::default()
        };

        let total_start = Instant::now();
        let embedding_provider = ProviderType::parse(&effective.embedding_provider).unwrap_or(ProviderType::Ollama);

        let embedding_start = Instant::now();
        let expanded = expander::expand(
            &self.completion_client,
            &self.embedding_client,
            embedding_provider,
            &effective.embedding_model,
            effective.embedding_dimensions,
            query,
            effective.enable_hyde,
            &effective.hyde_model,
            effective.enable_multi_query,
            effective.multi_query_count,
            &effective.query_expansion_model,
        )
        .await;

        let expanded = match expanded {
            Ok(e) => e,
            Err(e) => {
                log::warn!("[orchestrator] original query embedding failed: {e}");
                metrics.total_ms = Some(total_start.elapsed().as_millis() as u64);
                let log_id = self.write_analytics(&effective, &metrics)?;
                return Ok(RagResult {
                    results: Vec::new(),
                    formatted_context: String::new(),
                    total_tokens: 0,
                    rag_log_id: log_id,
                });
            }
        };
        metrics.embedding_ms = Some(embedding_start.elapsed().as_millis() as u64);

        let lexical_index = self.lexical_store.load_index(owner_id)?;
        let k_prime = (3 * effective.top_k).max(effective.initial_retrieval_count);

        let search_start = Instant::now();
        let mut variations: Vec<(Vec<Candidate>, f32)> = Vec::new();

        let original_candidates = hybrid::search(
            self.vector_store.as_ref(),
            &lexical_index,
            owner_id,
            query,
            &expanded.original_vector,
            effective.top_k,
            effective.similarity_threshold,
            effective.initial_retrieval_count,
            effective.vector_weight,
            effective.bm25_weight,
            effective.rrf_constant,
            effective.embedding_dimensions,
            effective.enable_hybrid,
        )
        .await?;
        let original_ids: Vec<String> = original_candidates.iter().map(|c| c.id.clone()).collect();
        variations.push((original_candidates, 1.0));

        if let Some(hyde_vector) = &expanded.hyde_vector {
            let hyde_candidates = hybrid::search(
                self.vector_store.as_ref(),
                &lexical_index,
                owner_id,
                query,
                hyde_vector,
                effective.top_k,
                effective.similarity_threshold,
                effective.initial_retrieval_count,
                effective.vector_weight,
                effective.bm25_weight,
                effective.rrf_constant,
                effective.embedding_dimensions,
                effective.enable_hybrid,
            )
            .await?;
            let boosted = hybrid::apply_hyde_boost(hyde_candidates, &original_ids);
            variations.push((boosted, 1.0));
        }

        for variation_vector in &expanded.variation_vectors {
            let variation_candidates = hybrid::search(
                self.vector_store.as_ref(),
                &lexical_index,
                owner_id,
                query,
                variation_vector,
                effective.top_k,
                effective.similarity_threshold,
                effective.initial_retrieval_count,
                effective.vector_weight,
                effective.bm25_weight,
                effective.rrf_constant,
                effective.embedding_dimensions,
                effective.enable_hybrid,
            )
            .await?;
            variations.push((variation_candidates, 1.0));
        }

        let merged = hybrid::merge_variations(variations, k_prime);

        // Vector and lexical search share one suspension window per
        // variation in this implementation; both timings are attributed
        // the same observed total.
        let search_ms = search_start.elapsed().as_millis() as u64;
        metrics.vector_ms = Some(search_ms);
        metrics.lexical_ms = Some(search_ms);
        metrics.retrieved_count = merged.len();

        if merged.is_empty() {
            metrics.total_ms = Some(total_start.elapsed().as_millis() as u64);
            let log_id = self.write_analytics(&effective, &metrics)?;
            return Ok(RagResult {
                results: Vec::new(),
                formatted_context: String::new(),
                total_tokens: expanded.total_tokens,
                rag_log_id: log_id,
            });
        }

        let cosine_scores: Vec<f32> = merged.iter().map(|c| c.vector_score).collect();
        let bm25_scores: Vec<f32> = merged.iter().filter(|c| c.found_in_bm25).map(|c| c.bm25_score).collect();
        metrics.top_cosine = max_of(&cosine_scores);
        metrics.avg_cosine = avg_of(&cosine_scores);
        metrics.top_bm25 = max_of(&bm25_scores);
        metrics.avg_bm25 = avg_of(&bm25_scores);

        let rerank_start = Instant::now();
        let ranked = reranker::rerank(
            &self.completion_client,
            query,
            merged,
            &effective.reranking_model,
            effective.top_k,
            effective.min_rerank_score,
            effective.enable_reranking,
        )
        .await;
        metrics.rerank_ms = Some(rerank_start.elapsed().as_millis() as u64);
        metrics.final_count = ranked.len();

        let rerank_scores: Vec<f32> = ranked.iter().filter_map(|r| r.relevance_score).collect();
        metrics.top_rerank = max_of(&rerank_scores);
        metrics.avg_rerank = avg_of(&rerank_scores);

        let formatted_context = assemble_prompt(&ranked, effective.max_context_length);
        let total_tokens = expanded.total_tokens + estimate_tokens(&formatted_context);

        metrics.total_ms = Some(total_start.elapsed().as_millis() as u64);
        let log_id = self.write_analytics(&effective, &metrics)?;

        Ok(RagResult {
            results: ranked,
            formatted_context,
            total_tokens,
            rag_log_id: log_id,
        })
    }

    fn write_analytics(&self, effective: &EffectiveOptions, metrics: &QueryMetrics) -> Result<Option<String>, RagError> {
        if effective.enable_analytics {
            Ok(Some(self.analytics.log(metrics)?))
        } else {
            Ok(None)
        }
    }

    /// Builds the final prompt handed to the downstream model.
    pub fn enhance_prompt(&self, user_prompt: &str, context: &str) -> String {
        if context.trim().is_empty() {
            NO_NOTES_TEMPLATE.replace("{user_prompt}", user_prompt)
        } else {
            WITH_CONTEXT_TEMPLATE
                .replace("{context}", context)
                .replace("{user_prompt}", user_prompt)
        }
    }
}

fn max_of(values: &[f32]) -> Option<f32> {
    values.iter().copied().fold(None, |acc, v| match acc {
        Some(m) if m >= v => Some(m),
        _ => Some(v),
    })
}

fn avg_of(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f32>() / values.len() as f32)
    }
}

fn extract_tags(content: &str, fallback: &[String]) -> Vec<String> {
    if let Some(captures) = TAGS_LINE_RE.captures(content) {
        let line = captures.get(1).map(|m| m.as_str()).unwrap_or("");
        let parsed: Vec<String> = line.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect();
        if !parsed.is_empty() {
            return parsed;
        }
    }
    fallback.to_vec()
}

/// Groups surviving chunks by note, in order of first appearance (which is
/// final-score descending, since `ranked` is already sorted), and
/// concatenates each group's content ascending by chunk index. Stops
/// adding notes once `max_context_length` characters have been used.
fn assemble_prompt(ranked: &[RankedChunk], max_context_length: usize) -> String {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&RankedChunk>> = HashMap::new();

    for chunk in ranked {
        let is_new = !groups.contains_key(&chunk.note_id);
        groups.entry(chunk.note_id.clone()).or_default().push(chunk);
        if is_new {
            order.push(chunk.note_id.clone());
        }
    }

    let mut out = String::new();

    for note_id in order {
        let mut chunks = groups.remove(&note_id).unwrap_or_default();
        let header_chunk = chunks
            .iter()
            .max_by(|a, b| a.final_score.partial_cmp(&b.final_score).unwrap_or(std::cmp::Ordering::Equal))
            .copied()
            .expect("group is never empty");

        chunks.sort_by_key(|c| c.chunk_index);

        let tags = extract_tags(&header_chunk.content, &header_chunk.tags);

        let mut block = format!("[{}]\n", header_chunk.note_title);
        if !tags.is_empty() {
            block.push_str(&format!("Tags: {}\n", tags.join(", ")));
        }
        if let Some(summary) = &header_chunk.summary {
            block.push_str(&format!("Summary: {summary}\n"));
        }
        if header_chunk.reranked {
            block.push_str(&format!(
                "Relevance: {:.0}/10, Semantic: {:.2}\n",
                header_chunk.relevance_score.unwrap_or(0.0),
                header_chunk.fused_score
            ));
        } else {
            block.push_str(&format!("Relevance Score: {:.2}\n", header_chunk.final_score));
        }
        if chunks.len() > 1 {
            block.push_str(&format!("({} chunks)\n", chunks.len()));
        }

        let body = chunks.iter().map(|c| c.content.as_str()).collect::<Vec<_>>().join("\n\n");
        let body = if body.trim().is_empty() {
            "(No content available for this note)".to_string()
        } else {
            body
        };
        block.push_str(&body);
        block.push_str("\n\n");

        if out.len() + block.len() > max_context_length {
            break;
        }
        out.push_str(&block);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(note_id: &str, idx: usize, content: &str, final_score: f32, reranked: bool) -> RankedChunk {
        RankedChunk {
            note_id: note_id.to_string(),
            chunk_index: idx,
            content: content.to_string(),
            note_title: "Coffee".to_string(),
            tags: vec!["drinks".to_string()],
            summary: None,
            fused_score: 0.5,
            relevance_score: if reranked { Some(8.0) } else { None },
            final_score,
            reranked,
        }
    }

    #[test]
    fn test_assemble_prompt_single_chunk_no_truncation() {
        let ranked = vec![chunk("n1", 0, "I brew coffee every morning.", 0.9, false)];
        let out = assemble_prompt(&ranked, 8000);
        assert!(out.contains("[Coffee]"));
        assert!(out.contains("I brew coffee every morning."));
        assert!(!out.contains("..."));
    }

    #[test]
    fn test_assemble_prompt_stops_at_budget() {
        let ranked = vec![
            chunk("n1", 0, &"a".repeat(50), 0.9, false),
            chunk("n2", 0, &"b".repeat(50), 0.8, false),
        ];
        let out = assemble_prompt(&ranked, 60);
        assert!(out.contains("n1") || out.contains("aaaa"));
        assert!(!out.contains("bbbb"));
    }

    #[test]
    fn test_extract_tags_falls_back_to_stored_tags() {
        let fallback = vec!["x".to_string()];
        assert_eq!(extract_tags("no tags line here", &fallback), fallback);
    }

    #[test]
    fn test_extract_tags_parses_content_line() {
        let content = "Title: T\nTags: a, b, c\n\nContent:\nbody";
        assert_eq!(extract_tags(content, &[]), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_enhance_prompt_empty_context_uses_no_notes_template() {
        let orchestrator_template = NO_NOTES_TEMPLATE.replace("{user_prompt}", "hi");
        assert!(orchestrator_template.contains("No relevant notes"));
    }
}
