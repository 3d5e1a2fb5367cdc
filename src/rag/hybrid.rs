//! Hybrid searcher (C8)
//!
//! Runs dense vector k-NN and lexical BM25 search against the same owner
//! corpus and fuses the two ranked lists with Reciprocal Rank Fusion.

use crate::rag::error::RagError;
use crate::rag::lexical::LexicalIndex;
use crate::rag::types::Candidate;
use crate::rag::vector_store::VectorStore;
use std::collections::HashMap;

/// Runs one hybrid search for one query vector/text pair and returns fused
/// candidates sorted descending by fused score, truncated to `k'`.
#[allow(clippy::too_many_arguments)]
pub async fn search(
    vector_store: &dyn VectorStore,
    lexical_index: &LexicalIndex,
    owner_id: &str,
    query_text: &str,
    query_vector: &[f32],
    k: usize,
    min_cosine: f32,
    initial_retrieval_count: usize,
    vector_weight: f32,
    bm25_weight: f32,
    rrf_constant: f32,
    dimensions: Option<usize>,
    enable_hybrid: bool,
) -> Result<Vec<Candidate>, RagError> {
    let k_prime = (3 * k).max(initial_retrieval_count);

    let vector_hits = vector_store
        .knn(owner_id, query_vector, k_prime, min_cosine, dimensions)
        .await
        .map_err(|e| RagError::StoreError(e.to_string()))?;

    if !enable_hybrid {
        let candidates = vector_hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| Candidate {
                id: hit.id,
                note_id: hit.note_id,
                chunk_index: hit.chunk_index,
                content: hit.content,
                note_title: hit.note_title,
                tags: hit.tags,
                summary: hit.summary,
                vector_score: hit.cosine,
                bm25_score: 0.0,
                vector_rank: Some(i + 1),
                bm25_rank: None,
                fused_score: hit.cosine,
                found_in_vector: true,
                found_in_bm25: false,
            })
            .collect();
        return Ok(candidates);
    }

    let lexical_hits = lexical_index.search(query_text, k_prime);

    let mut by_id: HashMap<String, Candidate> = HashMap::new();

    for (rank, hit) in vector_hits.into_iter().enumerate() {
        let r = rank + 1;
        let contribution = vector_weight / (rrf_constant + r as f32);
        by_id.insert(
            hit.id.clone(),
            Candidate {
                id: hit.id,
                note_id: hit.note_id,
                chunk_index: hit.chunk_index,
                content: hit.content,
                note_title: hit.note_title,
                tags: hit.tags,
                summary: hit.summary,
                vector_score: hit.cosine,
                bm25_score: 0.0,
                vector_rank: Some(r),
                bm25_rank: None,
                fused_score: contribution,
                found_in_vector: true,
                found_in_bm25: false,
            },
        );
    }

    for (rank, (id, bm25_score)) in lexical_hits.into_iter().enumerate() {
        let r = rank + 1;
        let contribution = bm25_weight / (rrf_constant + r as f32);
        by_id
            .entry(id)
            .and_modify(|c| {
                c.bm25_score = bm25_score;
                c.bm25_rank = Some(r);
                c.fused_score += contribution;
                c.found_in_bm25 = true;
            })
            .or_insert_with(|| Candidate {
                id: String::new(),
                note_id: String::new(),
                chunk_index: 0,
                content: String::new(),
                note_title: String::new(),
                tags: Vec::new(),
                summary: None,
                vector_score: 0.0,
                bm25_score,
                vector_rank: None,
                bm25_rank: Some(r),
                fused_score: contribution,
                found_in_vector: false,
                found_in_bm25: true,
            });
    }

    let mut candidates: Vec<Candidate> = by_id.into_values().filter(|c| !c.id.is_empty()).collect();
    candidates.sort_by(|a, b| b.fused_score.partial_cmp(&a.fused_score).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate(k_prime);
    Ok(candidates)
}

/// Merges the per-variation candidate lists produced by repeated calls to
/// `search` (one per query embedding: original, optional HyDE, each
/// multi-query variation) into one deduplicated, descending-sorted list.
///
/// `boost` multiplies every candidate's fused score before merging (1.1 for
/// HyDE results that also surfaced from the original query, 1.0 otherwise).
/// Records that collide by id take the max of the boosted fused scores.
pub fn merge_variations(variations: Vec<(Vec<Candidate>, f32)>, k_prime: usize) -> Vec<Candidate> {
    let mut by_id: HashMap<String, Candidate> = HashMap::new();

    for (candidates, boost) in variations {
        for mut c in candidates {
            c.fused_score *= boost;
            by_id
                .entry(c.id.clone())
                .and_modify(|existing| {
                    if c.fused_score > existing.fused_score {
                        *existing = c.clone();
                    }
                })
                .or_insert(c);
        }
    }

    let mut merged: Vec<Candidate> = by_id.into_values().collect();
    merged.sort_by(|a, b| b.fused_score.partial_cmp(&a.fused_score).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(k_prime);
    merged
}

/// Applies the HyDE boost only to candidates also present in the
/// original-query result set, per the documented (non-speculative) reading
/// of the boost rule.
pub fn apply_hyde_boost(hyde_candidates: Vec<Candidate>, original_ids: &[String]) -> Vec<Candidate> {
    hyde_candidates
        .into_iter()
        .map(|mut c| {
            if original_ids.contains(&c.id) {
                c.fused_score *= 1.1;
            }
            c
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::types::Candidate;

    fn candidate(id: &str, fused: f32) -> Candidate {
        Candidate {
            id: id.to_string(),
            note_id: "n".to_string(),
            chunk_index: 0,
            content: "c".to_string(),
            note_title: "t".to_string(),
            tags: vec![],
            summary: None,
            vector_score: 0.0,
            bm25_score: 0.0,
            vector_rank: None,
            bm25_rank: None,
            fused_score: fused,
            found_in_vector: true,
            found_in_bm25: false,
        }
    }

    #[test]
    fn test_rrf_fusion_formula_scenario() {
        // Scenario: vector rank 3 (w_v=1.0), lexical rank 1 (w_b=1.0), K=60.
        let k = 60.0f32;
        let vector_contribution = 1.0 / (k + 3.0);
        let bm25_contribution = 1.0 / (k + 1.0);
        let fused = vector_contribution + bm25_contribution;
        assert!((fused - 0.03226).abs() < 0.0001);
    }

    #[test]
    fn test_merge_variations_keeps_max_fused() {
        let a = vec![candidate("x", 0.5)];
        let b = vec![candidate("x", 0.8)];
        let merged = merge_variations(vec![(a, 1.0), (b, 1.0)], 10);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].fused_score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_apply_hyde_boost_only_for_overlapping_ids() {
        let hyde = vec![candidate("a", 1.0), candidate("b", 1.0)];
        let boosted = apply_hyde_boost(hyde, &["a".to_string()]);
        let a = boosted.iter().find(|c| c.id == "a").unwrap();
        let b = boosted.iter().find(|c| c.id == "b").unwrap();
        assert!((a.fused_score - 1.1).abs() < 1e-6);
        assert!((b.fused_score - 1.0).abs() < 1e-6);
    }
}
