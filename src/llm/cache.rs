//! Response caching for completion calls
//!
//! Caches completions keyed by a hash of the full request to avoid paying
//! for duplicate HyDE/rerank/expansion calls. Embeddings are never cached
//! here (see the embedding port docs for why).

use super::{error::LLMError, types::*};
use chrono::Utc;
use rusqlite::{params, Connection};

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_hits: usize,
    pub hit_rate: f32,
}

pub struct ResponseCache;

impl ResponseCache {
    pub fn new() -> Self {
        Self
    }

    pub fn get(&self, conn: &Connection, request: &LLMRequest) -> Result<Option<LLMResponse>, LLMError> {
        let cache_key = request.cache_key();

        log::debug!("[llm::cache] looking up cache key {}", cache_key);

        let result = conn.query_row(
            "SELECT response_json, model, tokens_used FROM llm_cache WHERE cache_key = ?1",
            [&cache_key],
            |row| {
                let response_json: String = row.get(0)?;
                let model: String = row.get(1)?;
                let tokens: usize = row.get::<_, i64>(2)? as usize;
                Ok((response_json, model, tokens))
            },
        );

        match result {
            Ok((response_json, model, tokens)) => {
                let mut response: LLMResponse = serde_json::from_str(&response_json)?;
                response.cached = true;
                response.model = model;
                response.tokens_used = tokens;

                let now = Utc::now().timestamp_millis();
                conn.execute(
                    "UPDATE llm_cache SET last_accessed = ?1, access_count = access_count + 1
                     WHERE cache_key = ?2",
                    params![now, &cache_key],
                )?;

                log::info!("[llm::cache] hit for {}", cache_key);
                Ok(Some(response))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                log::debug!("[llm::cache] miss for {}", cache_key);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn set(
        &self,
        conn: &Connection,
        request: &LLMRequest,
        response: &LLMResponse,
    ) -> Result<(), LLMError> {
        let cache_key = request.cache_key();
        let now = Utc::now().timestamp_millis();

        let request_json = serde_json::to_string(request)?;
        let response_json = serde_json::to_string(response)?;

        conn.execute(
            "INSERT OR REPLACE INTO llm_cache (
                cache_key, request_json, response_json, model, tokens_used,
                created_at, last_accessed, access_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
            params![
                &cache_key,
                &request_json,
                &response_json,
                &response.model,
                response.tokens_used as i64,
                now,
                now,
            ],
        )?;

        log::debug!("[llm::cache] stored {}", cache_key);
        Ok(())
    }

    pub fn clear(&self, conn: &Connection) -> Result<(), LLMError> {
        conn.execute("DELETE FROM llm_cache", [])?;
        Ok(())
    }

    pub fn stats(&self, conn: &Connection) -> Result<CacheStats, LLMError> {
        let total_entries: i64 = conn.query_row("SELECT COUNT(*) FROM llm_cache", [], |r| r.get(0))?;
        let total_hits: i64 = conn.query_row(
            "SELECT COALESCE(SUM(access_count - 1), 0) FROM llm_cache",
            [],
            |r| r.get(0),
        )?;
        let total_lookups = total_entries + total_hits;
        let hit_rate = if total_lookups > 0 {
            total_hits as f32 / total_lookups as f32
        } else {
            0.0
        };

        Ok(CacheStats {
            total_entries: total_entries as usize,
            total_hits: total_hits as usize,
            hit_rate,
        })
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn memory_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn test_cache_roundtrip() {
        let conn = memory_conn();
        let cache = ResponseCache::new();
        let request = LLMRequest::simple("hello").model("gpt-4");
        let response = LLMResponse::new("hi there", "gpt-4", 10);

        assert!(cache.get(&conn, &request).unwrap().is_none());
        cache.set(&conn, &request, &response).unwrap();

        let cached = cache.get(&conn, &request).unwrap().unwrap();
        assert_eq!(cached.content, "hi there");
        assert!(cached.cached);
    }

    #[test]
    fn test_cache_clear() {
        let conn = memory_conn();
        let cache = ResponseCache::new();
        let request = LLMRequest::simple("hello");
        let response = LLMResponse::new("hi", "gpt-4", 1);
        cache.set(&conn, &request, &response).unwrap();
        cache.clear(&conn).unwrap();
        assert!(cache.get(&conn, &request).unwrap().is_none());
    }
}
