//! LLM integration
//!
//! Two clients sit on top of the provider adapters: `CompletionClient`
//! (cache + retry + fallback chain) for prompt-to-text calls, and
//! `EmbeddingClient` (retry only, no cross-provider fallback) for
//! text-to-vector calls.

pub mod cache;
pub mod config;
pub mod error;
pub mod providers;
pub mod retry;
pub mod types;

pub use config::LLMConfig;
pub use error::LLMError;
pub use providers::{
    ClaudeProvider, CompletionProvider, EmbeddingProvider, OllamaProvider, OpenAIProvider,
    ProviderType,
};
pub use types::{EmbedResult, EmbeddingModelInfo, LLMRequest, LLMResponse, Message, Role};

use crate::db::DbPool;
use retry::{with_retry, RetryConfig};
use serde::de::DeserializeOwned;

fn build_completion_provider(
    provider_type: ProviderType,
    config: &LLMConfig,
) -> Result<Box<dyn CompletionProvider>, LLMError> {
    match provider_type {
        ProviderType::Ollama => {
            Ok(Box::new(OllamaProvider::new(config.ollama_base_url.clone())?))
        }
        ProviderType::OpenAI => Ok(Box::new(OpenAIProvider::new(
            config
                .openai_api_key
                .clone()
                .ok_or_else(|| LLMError::ConfigError("openai api key not configured".to_string()))?,
        )?)),
        ProviderType::Claude => Ok(Box::new(ClaudeProvider::new(
            config
                .anthropic_api_key
                .clone()
                .ok_or_else(|| LLMError::ConfigError("anthropic api key not configured".to_string()))?,
        )?)),
        ProviderType::Gemini => Err(LLMError::ProviderNotImplemented(
            "gemini completion provider is not implemented".to_string(),
        )),
    }
}

fn build_embedding_provider(
    provider_type: ProviderType,
    config: &LLMConfig,
) -> Result<Box<dyn EmbeddingProvider>, LLMError> {
    match provider_type {
        ProviderType::Ollama => {
            Ok(Box::new(OllamaProvider::new(config.ollama_base_url.clone())?))
        }
        ProviderType::OpenAI => Ok(Box::new(OpenAIProvider::new(
            config
                .openai_api_key
                .clone()
                .ok_or_else(|| LLMError::ConfigError("openai api key not configured".to_string()))?,
        )?)),
        ProviderType::Claude => Err(LLMError::ProviderNotImplemented(
            "claude has no embedding endpoint".to_string(),
        )),
        ProviderType::Gemini => Err(LLMError::ProviderNotImplemented(
            "gemini embedding provider is not implemented".to_string(),
        )),
    }
}

/// Completion port client: cache-then-primary-then-fallback-chain.
pub struct CompletionClient {
    config: LLMConfig,
    db_pool: DbPool,
    cache: cache::ResponseCache,
    retry_config: RetryConfig,
}

impl CompletionClient {
    pub fn new(config: LLMConfig, db_pool: DbPool) -> Self {
        Self {
            config,
            db_pool,
            cache: cache::ResponseCache::new(),
            retry_config: RetryConfig::default(),
        }
    }

    pub async fn complete(&self, request: LLMRequest) -> Result<LLMResponse, LLMError> {
        if self.config.use_cache {
            let conn = self.db_pool.get().map_err(|e| LLMError::CacheError(e.to_string()))?;
            if let Some(cached) = self.cache.get(&conn, &request)? {
                log::debug!("[llm] cache hit");
                return Ok(cached);
            }
        }

        let providers_to_try = std::iter::once(self.config.default_provider)
            .chain(self.config.fallback_chain.iter().copied());

        let mut last_err = None;
        for provider_type in providers_to_try {
            let provider = match build_completion_provider(provider_type, &self.config) {
                Ok(p) => p,
                Err(e) => {
                    last_err = Some(e);
                    continue;
                }
            };

            let result = with_retry(&self.retry_config, || provider.complete(&request)).await;
            match result.into_result() {
                Ok(response) => {
                    if self.config.use_cache {
                        let conn = self
                            .db_pool
                            .get()
                            .map_err(|e| LLMError::CacheError(e.to_string()))?;
                        self.cache.set(&conn, &request, &response)?;
                    }
                    return Ok(response);
                }
                Err(e) => {
                    log::warn!("[llm] provider {:?} failed: {}", provider_type, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| LLMError::ProviderError("no provider available".to_string())))
    }

    /// Complete and attempt to parse the content as JSON matching `T`.
    /// Never errors on a malformed structured response; returns `None` so
    /// the caller can fall back to regex extraction.
    pub async fn complete_structured<T: DeserializeOwned>(
        &self,
        request: LLMRequest,
    ) -> Result<Option<T>, LLMError> {
        let response = self.complete(request).await?;
        Ok(extract_json(&response.content).and_then(|json| serde_json::from_str(&json).ok()))
    }

    pub fn clear_cache(&self) -> Result<(), LLMError> {
        let conn = self.db_pool.get().map_err(|e| LLMError::CacheError(e.to_string()))?;
        self.cache.clear(&conn)
    }

    pub fn cache_stats(&self) -> Result<cache::CacheStats, LLMError> {
        let conn = self.db_pool.get().map_err(|e| LLMError::CacheError(e.to_string()))?;
        self.cache.stats(&conn)
    }
}

/// Embedding port client. Does not fall back across providers: a single
/// indexing run or query must use one `(provider, model, dimension)`.
pub struct EmbeddingClient {
    config: LLMConfig,
    retry_config: RetryConfig,
}

impl EmbeddingClient {
    pub fn new(config: LLMConfig) -> Self {
        Self {
            config,
            retry_config: RetryConfig::default(),
        }
    }

    pub async fn embed(
        &self,
        provider_type: ProviderType,
        text: &str,
        model: Option<&str>,
        dimensions: Option<usize>,
    ) -> Result<EmbedResult, LLMError> {
        let provider = build_embedding_provider(provider_type, &self.config)?;
        with_retry(&self.retry_config, || provider.embed(text, model, dimensions))
            .await
            .into_result()
    }

    pub async fn embed_batch(
        &self,
        provider_type: ProviderType,
        texts: &[String],
        model: Option<&str>,
        dimensions: Option<usize>,
    ) -> Result<Vec<EmbedResult>, LLMError> {
        let provider = build_embedding_provider(provider_type, &self.config)?;
        with_retry(&self.retry_config, || provider.embed_batch(texts, model, dimensions))
            .await
            .into_result()
    }

    pub async fn list_models(
        &self,
        provider_type: ProviderType,
    ) -> Result<Vec<EmbeddingModelInfo>, LLMError> {
        let provider = build_embedding_provider(provider_type, &self.config)?;
        provider.list_models().await
    }
}

/// Extract a JSON object/array from free text, stripping a markdown code
/// fence if the model wrapped its structured response in one.
fn extract_json(content: &str) -> Option<String> {
    let trimmed = content.trim();
    let candidate = if let Some(stripped) = trimmed.strip_prefix("```json") {
        stripped.trim_end_matches("```").trim()
    } else if let Some(stripped) = trimmed.strip_prefix("```") {
        stripped.trim_end_matches("```").trim()
    } else {
        trimmed
    };

    let start = candidate.find(|c| c == '{' || c == '[')?;
    let end = candidate.rfind(|c| c == '}' || c == ']')?;
    if end < start {
        return None;
    }
    Some(candidate[start..=end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use r2d2_sqlite::SqliteConnectionManager;

    fn memory_pool() -> DbPool {
        let manager = SqliteConnectionManager::memory();
        let pool = r2d2::Pool::new(manager).unwrap();
        crate::db::migrate(&pool.get().unwrap()).unwrap();
        pool
    }

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(extract_json(r#"{"a":1}"#), Some(r#"{"a":1}"#.to_string()));
    }

    #[test]
    fn test_extract_json_fenced() {
        let content = "```json\n{\"a\":1}\n```";
        assert_eq!(extract_json(content), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn test_extract_json_none_when_absent() {
        assert_eq!(extract_json("no json here"), None);
    }

    #[tokio::test]
    async fn test_complete_structured_falls_back_to_none_on_malformed_json() {
        let pool = memory_pool();
        let mut config = LLMConfig::default();
        config.use_cache = false;
        config.default_provider = ProviderType::Ollama;
        config.ollama_base_url = "http://127.0.0.1:0".to_string();
        let client = CompletionClient::new(config, pool);

        #[derive(serde::Deserialize)]
        struct Foo {
            #[allow(dead_code)]
            a: i32,
        }

        let result = client
            .complete_structured::<Foo>(LLMRequest::simple("hi"))
            .await;
        assert!(result.is_err());
    }
}
