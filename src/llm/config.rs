//! LLM client configuration

use super::providers::ProviderType;
use serde::{Deserialize, Serialize};

/// Configuration for the completion and embedding clients: provider
/// endpoints/credentials, the default provider, and the fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub default_provider: ProviderType,
    pub fallback_chain: Vec<ProviderType>,
    pub max_tokens: usize,
    pub temperature: f32,
    pub use_cache: bool,
    pub privacy_mode: bool,

    pub ollama_base_url: String,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub google_api_key: Option<String>,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            default_provider: ProviderType::Ollama,
            fallback_chain: vec![],
            max_tokens: 2048,
            temperature: 0.7,
            use_cache: true,
            privacy_mode: false,
            ollama_base_url: "http://localhost:11434".to_string(),
            openai_api_key: None,
            anthropic_api_key: None,
            google_api_key: None,
        }
    }
}

impl LLMConfig {
    pub fn privacy_first() -> Self {
        Self {
            default_provider: ProviderType::Ollama,
            fallback_chain: vec![],
            privacy_mode: true,
            ..Default::default()
        }
    }

    pub fn cloud_first(api_key: impl Into<String>) -> Self {
        Self {
            default_provider: ProviderType::OpenAI,
            fallback_chain: vec![ProviderType::Ollama],
            privacy_mode: false,
            openai_api_key: Some(api_key.into()),
            ..Default::default()
        }
    }

    pub fn hybrid(api_key: impl Into<String>) -> Self {
        Self {
            default_provider: ProviderType::Ollama,
            fallback_chain: vec![ProviderType::OpenAI],
            privacy_mode: false,
            openai_api_key: Some(api_key.into()),
            ..Default::default()
        }
    }
}
