//! Ollama provider
//!
//! Local LLM runtime reached via its REST API: `/api/chat` for completions,
//! `/api/embeddings` for embeddings.

use super::*;
use serde::{Deserialize, Serialize};

pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: String) -> Result<Self, LLMError> {
        log::debug!("[llm::ollama] initializing provider at {}", base_url);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| LLMError::NetworkError(format!("failed to create http client: {}", e)))?;

        Ok(Self { base_url, client })
    }
}

#[async_trait]
impl CompletionProvider for OllamaProvider {
    async fn complete(&self, request: &LLMRequest) -> Result<LLMResponse, LLMError> {
        let model = request
            .model
            .as_ref()
            .ok_or_else(|| LLMError::ConfigError("model not specified".to_string()))?;

        let messages: Vec<OllamaMessage> = request
            .messages
            .iter()
            .map(|m| OllamaMessage {
                role: format!("{:?}", m.role).to_lowercase(),
                content: m.content.clone(),
            })
            .collect();

        let ollama_request = OllamaChatRequest {
            model: model.clone(),
            messages,
            stream: false,
            options: Some(OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens.map(|t| t as i32),
                top_p: request.top_p,
                stop: request.stop_sequences.clone(),
            }),
        };

        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&ollama_request)
            .send()
            .await
            .map_err(|e| LLMError::NetworkError(format!("ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LLMError::ProviderError(format!(
                "ollama returned status {}: {}",
                status, error_text
            )));
        }

        let ollama_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LLMError::InvalidResponse(format!("failed to parse response: {}", e)))?;

        let content = ollama_response
            .message
            .content
            .ok_or_else(|| LLMError::InvalidResponse("no content in response".to_string()))?;

        Ok(LLMResponse {
            content,
            model: model.clone(),
            tokens_used: ollama_response.eval_count.unwrap_or(0) as usize,
            finish_reason: ollama_response.done_reason,
            cached: false,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, LLMError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LLMError::NetworkError(format!("failed to fetch models: {}", e)))?;

        let models_response: OllamaModelsResponse = response
            .json()
            .await
            .map_err(|e| LLMError::InvalidResponse(format!("failed to parse models: {}", e)))?;

        Ok(models_response.models.iter().map(|m| m.name.clone()).collect())
    }

    fn name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> Result<bool, LLMError> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                log::warn!("[llm::ollama] health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed(
        &self,
        text: &str,
        model: Option<&str>,
        dimensions: Option<usize>,
    ) -> Result<EmbedResult, LLMError> {
        if dimensions.is_some() {
            return Err(LLMError::UnsupportedDimension {
                model: model.unwrap_or("nomic-embed-text").to_string(),
                requested: dimensions.unwrap(),
            });
        }

        let model_used = model.unwrap_or("nomic-embed-text").to_string();
        let url = format!("{}/api/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&OllamaEmbeddingRequest {
                model: model_used.clone(),
                prompt: text.to_string(),
            })
            .send()
            .await
            .map_err(|e| LLMError::NetworkError(format!("ollama embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LLMError::ProviderError(format!(
                "ollama returned status {}: {}",
                status, error_text
            )));
        }

        let embed_response: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| LLMError::InvalidResponse(format!("failed to parse embedding response: {}", e)))?;

        let token_count = (text.len() as f64 / 3.5).ceil() as usize;

        Ok(EmbedResult {
            vector: embed_response.embedding,
            token_count,
            model_used,
        })
    }

    async fn list_models(&self) -> Result<Vec<EmbeddingModelInfo>, LLMError> {
        Ok(vec![EmbeddingModelInfo {
            id: "nomic-embed-text".to_string(),
            default_dimension: 768,
            supported_dimensions: vec![768],
        }])
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessageResponse,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    eval_count: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}
