//! OpenAI provider
//!
//! Completions via `/v1/chat/completions`, embeddings via `/v1/embeddings`.

use super::*;
use serde::{Deserialize, Serialize};

pub struct OpenAIProvider {
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(api_key: String) -> Result<Self, LLMError> {
        log::debug!("[llm::openai] initializing provider");

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| LLMError::NetworkError(format!("failed to create http client: {}", e)))?;

        Ok(Self { api_key, client })
    }
}

#[async_trait]
impl CompletionProvider for OpenAIProvider {
    async fn complete(&self, request: &LLMRequest) -> Result<LLMResponse, LLMError> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());

        let messages: Vec<OpenAIMessage> = request
            .messages
            .iter()
            .map(|m| OpenAIMessage {
                role: format!("{:?}", m.role).to_lowercase(),
                content: m.content.clone(),
            })
            .collect();

        let openai_request = OpenAIChatRequest {
            model: model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            stop: request.stop_sequences.clone(),
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&openai_request)
            .send()
            .await
            .map_err(|e| LLMError::NetworkError(format!("openai request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LLMError::RateLimitExceeded);
            }
            let error_text = response.text().await.unwrap_or_default();
            return Err(LLMError::ProviderError(format!(
                "openai returned status {}: {}",
                status, error_text
            )));
        }

        let openai_response: OpenAIChatResponse = response
            .json()
            .await
            .map_err(|e| LLMError::InvalidResponse(format!("failed to parse response: {}", e)))?;

        let choice = openai_response
            .choices
            .first()
            .ok_or_else(|| LLMError::InvalidResponse("no choices in response".to_string()))?;

        Ok(LLMResponse {
            content: choice.message.content.clone(),
            model,
            tokens_used: openai_response.usage.total_tokens,
            finish_reason: choice.finish_reason.clone(),
            cached: false,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, LLMError> {
        let response = self
            .client
            .get("https://api.openai.com/v1/models")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| LLMError::NetworkError(format!("failed to fetch models: {}", e)))?;

        let models_response: OpenAIModelsResponse = response
            .json()
            .await
            .map_err(|e| LLMError::InvalidResponse(format!("failed to parse models: {}", e)))?;

        Ok(models_response
            .data
            .iter()
            .filter(|m| m.id.starts_with("gpt-"))
            .map(|m| m.id.clone())
            .collect())
    }

    fn name(&self) -> &str {
        "openai"
    }

    async fn health_check(&self) -> Result<bool, LLMError> {
        match self
            .client
            .get("https://api.openai.com/v1/models")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                log::warn!("[llm::openai] health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    async fn embed(
        &self,
        text: &str,
        model: Option<&str>,
        dimensions: Option<usize>,
    ) -> Result<EmbedResult, LLMError> {
        let model_used = model.unwrap_or("text-embedding-3-small").to_string();

        if let Some(dim) = dimensions {
            validate_embedding_dimension(&model_used, dim)?;
        }

        let request = OpenAIEmbeddingRequest {
            model: model_used.clone(),
            input: text.to_string(),
            dimensions,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| LLMError::NetworkError(format!("openai embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LLMError::RateLimitExceeded);
            }
            let error_text = response.text().await.unwrap_or_default();
            return Err(LLMError::ProviderError(format!(
                "openai returned status {}: {}",
                status, error_text
            )));
        }

        let embed_response: OpenAIEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| LLMError::InvalidResponse(format!("failed to parse embedding response: {}", e)))?;

        let data = embed_response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::InvalidResponse("no embedding in response".to_string()))?;

        Ok(EmbedResult {
            vector: data.embedding,
            token_count: embed_response.usage.total_tokens,
            model_used,
        })
    }

    async fn list_models(&self) -> Result<Vec<EmbeddingModelInfo>, LLMError> {
        Ok(vec![
            EmbeddingModelInfo {
                id: "text-embedding-3-small".to_string(),
                default_dimension: 1536,
                supported_dimensions: vec![512, 1536],
            },
            EmbeddingModelInfo {
                id: "text-embedding-3-large".to_string(),
                default_dimension: 3072,
                supported_dimensions: vec![256, 1024, 3072],
            },
        ])
    }

    fn name(&self) -> &str {
        "openai"
    }
}

fn validate_embedding_dimension(model: &str, requested: usize) -> Result<(), LLMError> {
    let supported: &[usize] = match model {
        "text-embedding-3-small" => &[512, 1536],
        "text-embedding-3-large" => &[256, 1024, 3072],
        _ => &[],
    };
    if !supported.is_empty() && !supported.contains(&requested) {
        return Err(LLMError::UnsupportedDimension {
            model: model.to_string(),
            requested,
        });
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
    usage: OpenAIUsage,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessageResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    total_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAIModelsResponse {
    data: Vec<OpenAIModel>,
}

#[derive(Debug, Deserialize)]
struct OpenAIModel {
    id: String,
}

#[derive(Debug, Serialize)]
struct OpenAIEmbeddingRequest {
    model: String,
    input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
    usage: OpenAIEmbeddingUsage,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingUsage {
    total_tokens: usize,
}
