//! Pinecone managed vector index backend
//!
//! A `reqwest`-based REST client against a single Pinecone index. Pinecone
//! indexes are created with a fixed dimension; callers must resolve the
//! embedding dimension before indexing and reject mismatches rather than
//! letting the upsert fail server-side.

use super::{KnnHit, StoreError, VectorStore, VectorStoreStats};
use crate::rag::types::EmbeddingRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub struct PineconeVectorStore {
    api_key: String,
    index_host: String,
    client: reqwest::Client,
}

impl PineconeVectorStore {
    pub fn new(api_key: String, index_host: String) -> Self {
        Self {
            api_key,
            index_host,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("https://{}{}", self.index_host.trim_start_matches("https://"), path)
    }
}

#[derive(Serialize)]
struct UpsertVector {
    id: String,
    values: Vec<f32>,
    metadata: serde_json::Value,
}

#[derive(Serialize)]
struct UpsertRequest {
    vectors: Vec<UpsertVector>,
    namespace: String,
}

#[derive(Serialize)]
struct DeleteRequest {
    filter: serde_json::Value,
    namespace: String,
}

#[derive(Serialize)]
struct QueryRequest {
    vector: Vec<f32>,
    #[serde(rename = "topK")]
    top_k: usize,
    #[serde(rename = "includeMetadata")]
    include_metadata: bool,
    namespace: String,
    filter: serde_json::Value,
}

#[derive(Deserialize)]
struct QueryResponse {
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    score: f32,
    metadata: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct ListRequest {
    namespace: String,
}

#[derive(Deserialize)]
struct StatsResponse {
    namespaces: Option<std::collections::HashMap<String, NamespaceStats>>,
}

#[derive(Deserialize)]
struct NamespaceStats {
    #[serde(rename = "vectorCount")]
    vector_count: Option<usize>,
}

fn metadata_from_record(record: &EmbeddingRecord) -> serde_json::Value {
    json!({
        "note_id": record.note_id,
        "owner_id": record.owner_id,
        "chunk_index": record.chunk_index,
        "content": record.content,
        "note_title": record.note_title,
        "tags": record.tags,
        "summary": record.summary,
        "note_updated_at": record.note_updated_at.to_rfc3339(),
        "dimensions": record.dimensions,
    })
}

#[async_trait]
impl VectorStore for PineconeVectorStore {
    async fn upsert_batch(&self, records: &[EmbeddingRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        // Pinecone partitions by namespace; one namespace per owner keeps
        // cross-owner queries impossible by construction.
        let owner_id = records[0].owner_id.clone();

        let vectors = records
            .iter()
            .map(|r| UpsertVector {
                id: r.id.clone(),
                values: r.vector.clone(),
                metadata: metadata_from_record(r),
            })
            .collect();

        let body = UpsertRequest {
            vectors,
            namespace: owner_id,
        };

        let resp = self
            .client
            .post(self.url("/vectors/upsert"))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(StoreError::Backend(format!(
                "pinecone upsert failed: {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn delete_by_note(&self, owner_id: &str, note_id: &str) -> Result<(), StoreError> {
        let body = DeleteRequest {
            filter: json!({ "note_id": { "$eq": note_id } }),
            namespace: owner_id.to_string(),
        };

        let resp = self
            .client
            .post(self.url("/vectors/delete"))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(StoreError::Backend(format!(
                "pinecone delete failed: {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn knn(
        &self,
        owner_id: &str,
        query_vector: &[f32],
        k: usize,
        min_cosine: f32,
        dimensions: Option<usize>,
    ) -> Result<Vec<KnnHit>, StoreError> {
        let mut filter = json!({});
        if let Some(dims) = dimensions {
            filter = json!({ "dimensions": { "$eq": dims } });
        }

        let body = QueryRequest {
            vector: query_vector.to_vec(),
            top_k: k,
            include_metadata: true,
            namespace: owner_id.to_string(),
            filter,
        };

        let resp = self
            .client
            .post(self.url("/query"))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(StoreError::Backend(format!(
                "pinecone query failed: {}",
                resp.status()
            )));
        }

        let parsed: QueryResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let hits = parsed
            .matches
            .into_iter()
            .filter(|m| m.score >= min_cosine)
            .map(|m| {
                let meta = m.metadata.unwrap_or_else(|| json!({}));
                KnnHit {
                    id: m.id.clone(),
                    note_id: meta
                        .get("note_id")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    chunk_index: meta
                        .get("chunk_index")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0) as usize,
                    content: meta
                        .get("content")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    note_title: meta
                        .get("note_title")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    tags: meta
                        .get("tags")
                        .and_then(|v| v.as_array())
                        .map(|arr| {
                            arr.iter()
                                .filter_map(|t| t.as_str().map(String::from))
                                .collect()
                        })
                        .unwrap_or_default(),
                    summary: meta
                        .get("summary")
                        .and_then(|v| v.as_str())
                        .map(String::from),
                    cosine: m.score,
                }
            })
            .collect();

        Ok(hits)
    }

    async fn indexed_note_ids(&self, owner_id: &str) -> Result<Vec<String>, StoreError> {
        // Pinecone has no native "list distinct metadata field" operation;
        // the composite store's SQL side is the source of truth for this
        // query when Pinecone is the active or secondary target.
        let _ = owner_id;
        Err(StoreError::Backend(
            "pinecone backend does not support listing indexed note ids directly".to_string(),
        ))
    }

    async fn note_updated_at(&self, note_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let _ = note_id;
        Err(StoreError::Backend(
            "pinecone backend does not support metadata-only lookup without a query vector"
                .to_string(),
        ))
    }

    async fn stats(&self, owner_id: &str) -> Result<VectorStoreStats, StoreError> {
        let resp = self
            .client
            .post(self.url("/describe_index_stats"))
            .header("Api-Key", &self.api_key)
            .json(&ListRequest {
                namespace: owner_id.to_string(),
            })
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(StoreError::Backend(format!(
                "pinecone stats failed: {}",
                resp.status()
            )));
        }

        let parsed: StatsResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let total_chunks = parsed
            .namespaces
            .as_ref()
            .and_then(|ns| ns.get(owner_id))
            .and_then(|s| s.vector_count)
            .unwrap_or(0);

        Ok(VectorStoreStats {
            total_chunks,
            // Pinecone metadata does not expose distinct-note counts cheaply;
            // callers needing an exact note count should use the composite
            // store's SQL side.
            total_notes: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> EmbeddingRecord {
        EmbeddingRecord {
            id: "n1#chunk#0".to_string(),
            note_id: "n1".to_string(),
            owner_id: "u1".to_string(),
            chunk_index: 0,
            content: "body".to_string(),
            vector: vec![1.0, 0.0, 0.0],
            dimensions: 3,
            provider: "ollama".to_string(),
            model: "test".to_string(),
            created_at: Utc::now(),
            note_updated_at: Utc::now(),
            note_title: "Title".to_string(),
            tags: vec!["tag1".to_string()],
            summary: Some("summary".to_string()),
        }
    }

    #[test]
    fn test_metadata_from_record_includes_dimensions() {
        let meta = metadata_from_record(&record());
        assert_eq!(meta["dimensions"], json!(3));
        assert_eq!(meta["note_id"], json!("n1"));
        assert_eq!(meta["owner_id"], json!("u1"));
    }

    #[test]
    fn test_upsert_request_namespaces_by_owner() {
        let r = record();
        let body = UpsertRequest {
            vectors: vec![UpsertVector {
                id: r.id.clone(),
                values: r.vector.clone(),
                metadata: metadata_from_record(&r),
            }],
            namespace: r.owner_id.clone(),
        };
        assert_eq!(body.namespace, "u1");
        assert_eq!(body.vectors.len(), 1);
        assert_eq!(body.vectors[0].metadata["dimensions"], json!(3));
    }

    #[test]
    fn test_delete_request_uses_owner_namespace_not_note_id() {
        let body = DeleteRequest {
            filter: json!({ "note_id": { "$eq": "n1" } }),
            namespace: "u1".to_string(),
        };
        assert_eq!(body.namespace, "u1");
        assert_eq!(body.filter["note_id"]["$eq"], json!("n1"));
    }

    #[test]
    fn test_knn_filter_includes_dimensions_when_requested() {
        let mut filter = json!({});
        let dims: Option<usize> = Some(3);
        if let Some(d) = dims {
            filter = json!({ "dimensions": { "$eq": d } });
        }
        assert_eq!(filter["dimensions"]["$eq"], json!(3));

        let mut filter_none = json!({});
        let dims_none: Option<usize> = None;
        if let Some(d) = dims_none {
            filter_none = json!({ "dimensions": { "$eq": d } });
        }
        assert_eq!(filter_none, json!({}));
    }
}
