//! Analytics sink (C11)
//!
//! Persists one row per retrieval and accepts later user feedback keyed by
//! the log id. `performance_stats` correlates cosine/rerank scores against
//! feedback via Pearson correlation, returning null below the minimum
//! sample size the statistic needs to be meaningful.

use crate::db::DbPool;
use crate::rag::error::RagError;
use crate::rag::types::{FeedbackVerdict, PerformanceStats, QueryMetrics};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde_json::json;
use ulid::Ulid;

const MIN_CORRELATION_SAMPLE: usize = 10;

pub struct AnalyticsSink {
    db_pool: DbPool,
}

impl AnalyticsSink {
    pub fn new(db_pool: DbPool) -> Self {
        Self { db_pool }
    }

    /// Writes one append-only log row and returns its id.
    pub fn log(&self, metrics: &QueryMetrics) -> Result<String, RagError> {
        let conn = self.db_pool.get().map_err(|e| RagError::Internal(e.to_string()))?;
        let id = Ulid::new().to_string();

        let features = json!({
            "hybrid_enabled": metrics.hybrid_enabled,
            "hyde_enabled": metrics.hyde_enabled,
            "multi_query_enabled": metrics.multi_query_enabled,
            "reranking_enabled": metrics.reranking_enabled,
        });

        conn.execute(
            "INSERT INTO rag_query_log (
                id, owner_id, conversation_id, query_text, embedding_ms, vector_ms, lexical_ms,
                rerank_ms, total_ms, retrieved_count, final_count, top_cosine, avg_cosine,
                top_bm25, avg_bm25, top_rerank, avg_rerank, features_json, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)",
            params![
                id,
                metrics.owner_id,
                metrics.conversation_id,
                metrics.query_text,
                metrics.embedding_ms.map(|v| v as i64),
                metrics.vector_ms.map(|v| v as i64),
                metrics.lexical_ms.map(|v| v as i64),
                metrics.rerank_ms.map(|v| v as i64),
                metrics.total_ms.map(|v| v as i64),
                metrics.retrieved_count as i64,
                metrics.final_count as i64,
                metrics.top_cosine,
                metrics.avg_cosine,
                metrics.top_bm25,
                metrics.avg_bm25,
                metrics.top_rerank,
                metrics.avg_rerank,
                features.to_string(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| RagError::Internal(e.to_string()))?;

        Ok(id)
    }

    /// Idempotent per log id: a later call overwrites the earlier feedback
    /// (last write wins).
    pub fn update_feedback(
        &self,
        log_id: &str,
        verdict: FeedbackVerdict,
        category: Option<&str>,
        comment: Option<&str>,
    ) -> Result<(), RagError> {
        let conn = self.db_pool.get().map_err(|e| RagError::Internal(e.to_string()))?;
        let verdict_str = match verdict {
            FeedbackVerdict::Positive => "positive",
            FeedbackVerdict::Negative => "negative",
        };
        let rows = conn
            .execute(
                "UPDATE rag_query_log SET feedback_verdict=?1, feedback_category=?2, feedback_comment=?3 WHERE id=?4",
                params![verdict_str, category, comment, log_id],
            )
            .map_err(|e| RagError::Internal(e.to_string()))?;

        if rows == 0 {
            return Err(RagError::NotFound(format!("rag log {log_id} not found")));
        }
        Ok(())
    }

    pub fn performance_stats(
        &self,
        owner_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<PerformanceStats, RagError> {
        let conn = self.db_pool.get().map_err(|e| RagError::Internal(e.to_string()))?;

        let since_str = since.map(|d| d.to_rfc3339());

        let mut stmt = conn
            .prepare(
                "SELECT total_ms, top_cosine, top_rerank, feedback_verdict FROM rag_query_log
                 WHERE owner_id = ?1 AND (?2 IS NULL OR created_at >= ?2)",
            )
            .map_err(|e| RagError::Internal(e.to_string()))?;

        let rows = stmt
            .query_map(params![owner_id, since_str], |row| {
                let total_ms: Option<i64> = row.get(0)?;
                let top_cosine: Option<f64> = row.get(1)?;
                let top_rerank: Option<f64> = row.get(2)?;
                let verdict: Option<String> = row.get(3)?;
                Ok((total_ms, top_cosine, top_rerank, verdict))
            })
            .map_err(|e| RagError::Internal(e.to_string()))?;

        let mut total_queries = 0usize;
        let mut latencies = Vec::new();
        let mut verdicts = Vec::new();
        let mut cosine_pairs = Vec::new();
        let mut rerank_pairs = Vec::new();

        for row in rows {
            let (total_ms, top_cosine, top_rerank, verdict) = row.map_err(|e| RagError::Internal(e.to_string()))?;
            total_queries += 1;

            if let Some(ms) = total_ms {
                latencies.push(ms as f64);
            }

            let encoded_verdict = verdict.as_deref().map(|v| if v == "positive" { 1.0 } else { 0.0 });
            if let Some(v) = encoded_verdict {
                verdicts.push(v);
            }
            if let (Some(c), Some(v)) = (top_cosine, encoded_verdict) {
                cosine_pairs.push((c, v));
            }
            if let (Some(r), Some(v)) = (top_rerank, encoded_verdict) {
                rerank_pairs.push((r, v));
            }
        }

        let avg_latency_ms = if latencies.is_empty() {
            None
        } else {
            Some(latencies.iter().sum::<f64>() / latencies.len() as f64)
        };

        let positive_rate = if verdicts.is_empty() {
            None
        } else {
            Some(verdicts.iter().sum::<f64>() / verdicts.len() as f64)
        };

        Ok(PerformanceStats {
            total_queries,
            avg_latency_ms,
            positive_rate,
            cosine_positive_correlation: pearson_correlation(&cosine_pairs),
            rerank_positive_correlation: pearson_correlation(&rerank_pairs),
        })
    }
}

/// Pearson correlation over `(score, 0/1-encoded verdict)` pairs. Returns
/// `None` below the minimum sample size or when either series has zero
/// variance (denominator would be zero).
fn pearson_correlation(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < MIN_CORRELATION_SAMPLE {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;

    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        return None;
    }

    Some(cov / denom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_pool() -> DbPool {
        let manager = r2d2_sqlite::SqliteConnectionManager::memory();
        let pool = r2d2::Pool::new(manager).unwrap();
        crate::db::migrate(&pool.get().unwrap()).unwrap();
        pool
    }

    #[test]
    fn test_pearson_correlation_none_below_min_sample() {
        let pairs = vec![(0.5, 1.0); 3];
        assert_eq!(pearson_correlation(&pairs), None);
    }

    #[test]
    fn test_pearson_correlation_none_for_zero_variance() {
        let pairs = vec![(0.5, 1.0); 12];
        assert_eq!(pearson_correlation(&pairs), None);
    }

    #[test]
    fn test_log_and_retrieve_stats() {
        let sink = AnalyticsSink::new(memory_pool());
        let metrics = QueryMetrics {
            owner_id: "u1".to_string(),
            query_text: "hello".to_string(),
            total_ms: Some(120),
            retrieved_count: 5,
            final_count: 3,
            ..Default::default()
        };
        let id = sink.log(&metrics).unwrap();
        assert!(!id.is_empty());

        let stats = sink.performance_stats("u1", None).unwrap();
        assert_eq!(stats.total_queries, 1);
        assert_eq!(stats.avg_latency_ms, Some(120.0));
    }

    #[test]
    fn test_feedback_not_found_for_unknown_log() {
        let sink = AnalyticsSink::new(memory_pool());
        let result = sink.update_feedback("missing", FeedbackVerdict::Positive, None, None);
        assert!(result.is_err());
    }
}
