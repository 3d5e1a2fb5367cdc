//! LLM type definitions

use serde::{Deserialize, Serialize};

/// Role of a message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Request to a completion provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMRequest {
    pub model: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub top_p: Option<f32>,
    pub stop_sequences: Option<Vec<String>>,
}

impl LLMRequest {
    pub fn simple(prompt: impl Into<String>) -> Self {
        Self {
            model: None,
            messages: vec![Message::user(prompt)],
            temperature: None,
            max_tokens: None,
            top_p: None,
            stop_sequences: None,
        }
    }

    pub fn with_system(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            model: None,
            messages: vec![Message::system(system), Message::user(user)],
            temperature: None,
            max_tokens: None,
            top_p: None,
            stop_sequences: None,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn system_prompt(mut self, system: impl Into<String>) -> Self {
        self.messages.insert(0, Message::system(system));
        self
    }

    /// Cache key for this request. Must hash every parameter to prevent
    /// different parameter sets from sharing a cached response.
    pub fn cache_key(&self) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();

        if let Some(model) = &self.model {
            model.hash(&mut hasher);
        }

        for msg in &self.messages {
            format!("{:?}:{}", msg.role, msg.content).hash(&mut hasher);
        }

        if let Some(temp) = self.temperature {
            temp.to_bits().hash(&mut hasher);
        }

        if let Some(max) = self.max_tokens {
            max.hash(&mut hasher);
        }

        if let Some(top_p) = self.top_p {
            top_p.to_bits().hash(&mut hasher);
        }

        if let Some(ref stop) = self.stop_sequences {
            for seq in stop {
                seq.hash(&mut hasher);
            }
        }

        format!("{:x}", hasher.finish())
    }
}

/// Response from a completion provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub model: String,
    pub tokens_used: usize,
    pub finish_reason: Option<String>,
    pub cached: bool,
}

impl LLMResponse {
    pub fn new(content: impl Into<String>, model: impl Into<String>, tokens: usize) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            tokens_used: tokens,
            finish_reason: None,
            cached: false,
        }
    }
}

/// Result of embedding one piece of text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResult {
    pub vector: Vec<f32>,
    pub token_count: usize,
    pub model_used: String,
}

/// Metadata about a model an embedding provider exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingModelInfo {
    pub id: String,
    pub default_dimension: usize,
    pub supported_dimensions: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
    }

    #[test]
    fn test_request_builder() {
        let req = LLMRequest::simple("Test")
            .model("llama3")
            .temperature(0.7)
            .max_tokens(100);

        assert_eq!(req.model, Some("llama3".to_string()));
        assert_eq!(req.temperature, Some(0.7));
        assert_eq!(req.max_tokens, Some(100));
    }

    #[test]
    fn test_cache_key_consistency() {
        let req1 = LLMRequest::simple("Test").model("llama3");
        let req2 = LLMRequest::simple("Test").model("llama3");
        assert_eq!(req1.cache_key(), req2.cache_key());
    }

    #[test]
    fn test_cache_key_includes_max_tokens() {
        let req1 = LLMRequest::simple("Test").max_tokens(50);
        let req2 = LLMRequest::simple("Test").max_tokens(500);
        assert_ne!(req1.cache_key(), req2.cache_key());
    }

    #[test]
    fn test_cache_key_includes_stop_sequences() {
        let mut req1 = LLMRequest::simple("Test");
        req1.stop_sequences = Some(vec!["END".to_string()]);
        let mut req2 = LLMRequest::simple("Test");
        req2.stop_sequences = Some(vec!["STOP".to_string()]);
        assert_ne!(req1.cache_key(), req2.cache_key());
    }

    #[test]
    fn test_response_creation() {
        let response = LLMResponse::new("Hello world", "gpt-4", 42);
        assert_eq!(response.content, "Hello world");
        assert_eq!(response.cached, false);
    }
}
