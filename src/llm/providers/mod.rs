//! Provider adapters
//!
//! Two capability ports: completions (prompt -> text) and embeddings
//! (text -> dense vector). A provider may implement either or both.

pub mod claude;
pub mod ollama;
pub mod openai;

pub use claude::ClaudeProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;

use super::{types::*, LLMError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Recognized provider backends, selectable by name from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    Ollama,
    OpenAI,
    Claude,
    Gemini,
}

impl ProviderType {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openai" => Some(Self::OpenAI),
            "claude" | "anthropic" => Some(Self::Claude),
            "gemini" | "google" => Some(Self::Gemini),
            _ => None,
        }
    }
}

/// A text-generation provider: prompt in, text out.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &LLMRequest) -> Result<LLMResponse, LLMError>;

    async fn list_models(&self) -> Result<Vec<String>, LLMError>;

    fn name(&self) -> &str;

    async fn health_check(&self) -> Result<bool, LLMError> {
        Ok(true)
    }
}

/// An embedding provider: text in, dense vector out.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one piece of text. `model`/`dimensions` override the
    /// provider's defaults for this call.
    async fn embed(
        &self,
        text: &str,
        model: Option<&str>,
        dimensions: Option<usize>,
    ) -> Result<EmbedResult, LLMError>;

    /// Embed many texts in one batch. The default implementation embeds
    /// sequentially; providers with a true batch endpoint should override.
    async fn embed_batch(
        &self,
        texts: &[String],
        model: Option<&str>,
        dimensions: Option<usize>,
    ) -> Result<Vec<EmbedResult>, LLMError> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text, model, dimensions).await?);
        }
        Ok(results)
    }

    async fn list_models(&self) -> Result<Vec<EmbeddingModelInfo>, LLMError>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_parse() {
        assert_eq!(ProviderType::parse("OpenAI"), Some(ProviderType::OpenAI));
        assert_eq!(ProviderType::parse("anthropic"), Some(ProviderType::Claude));
        assert_eq!(ProviderType::parse("nonsense"), None);
    }
}
