//! Reranker (C9)
//!
//! Rescores the fused candidate set with a completion model, filters below
//! a minimum score, and blends the rerank score with the fused vector/BM25
//! score into a final ranking.

use crate::llm::{CompletionClient, LLMRequest};
use crate::rag::types::{Candidate, RankedChunk};
use futures::future::join_all;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

const BATCH_SIZE: usize = 5;
const TRUNCATE_CHARS: usize = 1500;
const NEUTRAL_SCORE: f32 = 5.0;

lazy_static! {
    static ref SCORE_RE: Regex = Regex::new(r"\d+(\.\d+)?").unwrap();
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    score: f32,
    #[allow(dead_code)]
    reasoning: Option<String>,
}

fn truncate_content(content: &str) -> String {
    if content.chars().count() <= TRUNCATE_CHARS {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(TRUNCATE_CHARS).collect();
        format!("{truncated}...")
    }
}

fn scoring_prompt(query: &str, content: &str) -> String {
    format!(
        "Rate how relevant the following passage is to the query on a scale of 0 to 10, \
         where 10 means directly and completely answers the query and 0 means unrelated.\n\n\
         Query: {query}\n\nPassage:\n{content}\n\n\
         Respond with a JSON object: {{\"score\": <integer 0-10>, \"reasoning\": \"<brief reason>\"}}"
    )
}

async fn score_candidate(client: &CompletionClient, query: &str, candidate: &Candidate, model: &str) -> f32 {
    let truncated = truncate_content(&candidate.content);
    let prompt = scoring_prompt(query, &truncated);
    let request = LLMRequest::simple(prompt).model(model).temperature(0.0);

    match client.complete_structured::<ScoreResponse>(request.clone()).await {
        Ok(Some(parsed)) => return parsed.score.clamp(0.0, 10.0),
        Ok(None) => {}
        Err(e) => {
            log::warn!("[reranker] structured scoring call failed: {e}");
        }
    }

    match client.complete(request).await {
        Ok(response) => SCORE_RE
            .find(&response.content)
            .and_then(|m| m.as_str().parse::<f32>().ok())
            .map(|s| s.clamp(0.0, 10.0))
            .unwrap_or(NEUTRAL_SCORE),
        Err(e) => {
            log::warn!("[reranker] fallback scoring call failed: {e}");
            NEUTRAL_SCORE
        }
    }
}

/// Reranks `candidates` against `query`, dropping anything below
/// `min_rerank_score` and returning at most `top_k` results sorted by
/// `(relevance_score desc, fused_score desc)`.
pub async fn rerank(
    client: &CompletionClient,
    query: &str,
    candidates: Vec<Candidate>,
    model: &str,
    top_k: usize,
    min_rerank_score: f32,
    enabled: bool,
) -> Vec<RankedChunk> {
    if !enabled {
        // `candidates` arrives already sorted by fused score (hybrid search's
        // own output contract); passing the top `top_k` through unchanged is
        // what keeps a fusion winner on top even though `final_score` here is
        // only the vector score, not the sort key.
        let mut ranked: Vec<RankedChunk> = candidates
            .into_iter()
            .map(|c| RankedChunk {
                note_id: c.note_id,
                chunk_index: c.chunk_index,
                content: c.content,
                note_title: c.note_title,
                tags: c.tags,
                summary: c.summary,
                fused_score: c.fused_score,
                relevance_score: None,
                final_score: c.vector_score,
                reranked: false,
            })
            .collect();
        ranked.truncate(top_k);
        return ranked;
    }

    let mut scored: Vec<(Candidate, f32)> = Vec::with_capacity(candidates.len());
    for batch in candidates.chunks(BATCH_SIZE) {
        let futures = batch.iter().map(|c| score_candidate(client, query, c, model));
        let scores = join_all(futures).await;
        for (c, score) in batch.iter().zip(scores) {
            scored.push((c.clone(), score));
        }
    }

    blend_and_filter(scored, top_k, min_rerank_score)
}

/// Filters scored candidates below `min_rerank_score`, blends the remaining
/// relevance scores with their fused vector/BM25 score, and sorts by
/// `(relevance_score desc, fused_score desc)` truncated to `top_k`. Split out
/// from `rerank` so the blend/filter/sort contract can be exercised without a
/// completion backend.
fn blend_and_filter(scored: Vec<(Candidate, f32)>, top_k: usize, min_rerank_score: f32) -> Vec<RankedChunk> {
    let mut ranked: Vec<RankedChunk> = scored
        .into_iter()
        .filter(|(_, score)| *score >= min_rerank_score)
        .map(|(c, score)| {
            let final_score = 0.7 * (score / 10.0) + 0.3 * c.vector_score;
            RankedChunk {
                note_id: c.note_id,
                chunk_index: c.chunk_index,
                content: c.content,
                note_title: c.note_title,
                tags: c.tags,
                summary: c.summary,
                fused_score: c.fused_score,
                relevance_score: Some(score),
                final_score,
                reranked: true,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.fused_score.partial_cmp(&a.fused_score).unwrap_or(std::cmp::Ordering::Equal))
    });
    ranked.truncate(top_k);
    ranked
}
