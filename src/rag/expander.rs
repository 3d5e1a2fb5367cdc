//! Query expander (C7)
//!
//! Produces the original query embedding plus, optionally, a HyDE
//! (hypothetical document) embedding and several paraphrase embeddings,
//! for the hybrid searcher to run against independently.

use crate::llm::providers::ProviderType;
use crate::llm::{CompletionClient, EmbeddingClient, LLMRequest};
use crate::rag::error::RagError;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct HydeResponse {
    document: String,
    #[allow(dead_code)]
    key_concepts: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct VariationsResponse {
    queries: Vec<String>,
    #[allow(dead_code)]
    explanation: Option<String>,
}

/// The embeddings produced for one user query, ready for the hybrid
/// searcher to run once per vector.
pub struct ExpandedQuery {
    pub original_vector: Vec<f32>,
    pub hyde_vector: Option<Vec<f32>>,
    pub variation_vectors: Vec<Vec<f32>>,
    pub variations_text: Vec<String>,
    pub hypothetical_document: Option<String>,
    pub total_tokens: usize,
    pub dimension: usize,
}

fn hyde_prompt(query: &str) -> String {
    format!(
        "Generate a paragraph as if from a document that answers this question. \
         Respond with JSON: {{\"document\": \"<paragraph>\", \"key_concepts\": [\"...\"]}}\n\n\
         Question: {query}"
    )
}

fn multi_query_prompt(query: &str, count: usize) -> String {
    format!(
        "Generate {count} alternative phrasings of this query that preserve its meaning \
         but vary vocabulary and structure. Respond with JSON: \
         {{\"queries\": [\"...\"], \"explanation\": \"...\"}}\n\n\
         Query: {query}"
    )
}

fn split_raw_variations(text: &str, count: usize) -> Vec<String> {
    text.lines()
        .map(|l| l.trim().trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == '-' || c == ' '))
        .map(str::trim)
        .filter(|l| l.len() > 5)
        .take(count)
        .map(String::from)
        .collect()
}

/// Expands `query` per the effective options. Embedding failure on the
/// original query aborts with `RagError`; every other step degrades
/// gracefully (the step is simply omitted and its tokens are not counted).
#[allow(clippy::too_many_arguments)]
pub async fn expand(
    completion_client: &CompletionClient,
    embedding_client: &EmbeddingClient,
    embedding_provider: ProviderType,
    embedding_model: &str,
    embedding_dimensions: Option<usize>,
    query: &str,
    enable_hyde: bool,
    hyde_model: &str,
    enable_multi_query: bool,
    multi_query_count: usize,
    query_expansion_model: &str,
) -> Result<ExpandedQuery, RagError> {
    let original = embedding_client
        .embed(embedding_provider, query, Some(embedding_model), embedding_dimensions)
        .await
        .map_err(RagError::ProviderError)?;

    let mut total_tokens = original.token_count;
    let dimension = original.vector.len();

    let mut hyde_vector = None;
    let mut hypothetical_document = None;

    if enable_hyde {
        let request = LLMRequest::simple(hyde_prompt(query)).model(hyde_model);
        match completion_client.complete_structured::<HydeResponse>(request.clone()).await {
            Ok(Some(parsed)) => {
                hypothetical_document = Some(parsed.document);
            }
            Ok(None) => match completion_client.complete(request).await {
                Ok(response) => hypothetical_document = Some(response.content),
                Err(e) => log::warn!("[expander] hyde fallback completion failed: {e}"),
            },
            Err(e) => log::warn!("[expander] hyde structured completion failed: {e}"),
        }

        if let Some(doc) = &hypothetical_document {
            match embedding_client
                .embed(embedding_provider, doc, Some(embedding_model), embedding_dimensions)
                .await
            {
                Ok(embedded) => {
                    total_tokens += embedded.token_count;
                    hyde_vector = Some(embedded.vector);
                }
                Err(e) => log::warn!("[expander] hyde embedding failed: {e}"),
            }
        }
    }

    let mut variations_text = Vec::new();
    let mut variation_vectors = Vec::new();

    if enable_multi_query && multi_query_count > 1 {
        let wanted = multi_query_count - 1;
        let request = LLMRequest::simple(multi_query_prompt(query, wanted)).model(query_expansion_model);

        let queries = match completion_client
            .complete_structured::<VariationsResponse>(request.clone())
            .await
        {
            Ok(Some(parsed)) => parsed.queries,
            Ok(None) => match completion_client.complete(request).await {
                Ok(response) => split_raw_variations(&response.content, wanted),
                Err(e) => {
                    log::warn!("[expander] multi-query fallback completion failed: {e}");
                    Vec::new()
                }
            },
            Err(e) => {
                log::warn!("[expander] multi-query structured completion failed: {e}");
                Vec::new()
            }
        };

        for variation in queries.into_iter().take(wanted) {
            match embedding_client
                .embed(embedding_provider, &variation, Some(embedding_model), embedding_dimensions)
                .await
            {
                Ok(embedded) => {
                    total_tokens += embedded.token_count;
                    variations_text.push(variation);
                    variation_vectors.push(embedded.vector);
                }
                Err(e) => log::warn!("[expander] variation embedding failed: {e}"),
            }
        }
    }

    Ok(ExpandedQuery {
        original_vector: original.vector,
        hyde_vector,
        variation_vectors,
        variations_text,
        hypothetical_document,
        total_tokens,
        dimension,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_raw_variations_filters_short_lines() {
        let text = "1. How do I start my morning?\n2. x\n3. What helps me wake up?";
        let result = split_raw_variations(text, 5);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0], "How do I start my morning?");
    }

    #[test]
    fn test_split_raw_variations_respects_count() {
        let text = "alpha beta gamma\ndelta epsilon zeta\neta theta iota";
        let result = split_raw_variations(text, 2);
        assert_eq!(result.len(), 2);
    }
}
