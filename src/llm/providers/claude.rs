//! Claude (Anthropic) provider
//!
//! Completions via the Messages API. Anthropic has no first-party
//! embedding endpoint, so this provider implements `CompletionProvider`
//! only.

use super::*;
use serde::{Deserialize, Serialize};

pub struct ClaudeProvider {
    api_key: String,
    client: reqwest::Client,
}

impl ClaudeProvider {
    pub fn new(api_key: String) -> Result<Self, LLMError> {
        log::debug!("[llm::claude] initializing provider");

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| LLMError::NetworkError(format!("failed to create http client: {}", e)))?;

        Ok(Self { api_key, client })
    }
}

#[async_trait]
impl CompletionProvider for ClaudeProvider {
    async fn complete(&self, request: &LLMRequest) -> Result<LLMResponse, LLMError> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| "claude-3-5-sonnet-latest".to_string());

        let mut system = None;
        let mut messages = Vec::new();
        for m in &request.messages {
            match m.role {
                Role::System => system = Some(m.content.clone()),
                Role::User => messages.push(ClaudeMessage {
                    role: "user".to_string(),
                    content: m.content.clone(),
                }),
                Role::Assistant => messages.push(ClaudeMessage {
                    role: "assistant".to_string(),
                    content: m.content.clone(),
                }),
            }
        }

        let claude_request = ClaudeRequest {
            model: model.clone(),
            messages,
            system,
            max_tokens: request.max_tokens.unwrap_or(1024),
            temperature: request.temperature,
            top_p: request.top_p,
            stop_sequences: request.stop_sequences.clone(),
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&claude_request)
            .send()
            .await
            .map_err(|e| LLMError::NetworkError(format!("claude request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LLMError::RateLimitExceeded);
            }
            let error_text = response.text().await.unwrap_or_default();
            return Err(LLMError::ProviderError(format!(
                "claude returned status {}: {}",
                status, error_text
            )));
        }

        let claude_response: ClaudeResponse = response
            .json()
            .await
            .map_err(|e| LLMError::InvalidResponse(format!("failed to parse response: {}", e)))?;

        let content = claude_response
            .content
            .into_iter()
            .find(|block| block.block_type == "text")
            .map(|block| block.text)
            .ok_or_else(|| LLMError::InvalidResponse("no text block in response".to_string()))?;

        Ok(LLMResponse {
            content,
            model,
            tokens_used: claude_response.usage.input_tokens + claude_response.usage.output_tokens,
            finish_reason: claude_response.stop_reason,
            cached: false,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, LLMError> {
        Ok(vec![
            "claude-3-5-sonnet-latest".to_string(),
            "claude-3-5-haiku-latest".to_string(),
            "claude-3-opus-latest".to_string(),
        ])
    }

    fn name(&self) -> &str {
        "claude"
    }

    async fn health_check(&self) -> Result<bool, LLMError> {
        Ok(!self.api_key.is_empty())
    }
}

#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContentBlock>,
    usage: ClaudeUsage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeUsage {
    input_tokens: usize,
    output_tokens: usize,
}
