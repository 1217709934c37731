//! AI execution service: a model-name keyed registry of completion providers.
//!
//! Every provider adapts one external completion API to the same
//! `AiResponse` shape. Handlers never talk to a vendor API directly; they go
//! through `AiService::execute_prompt`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::Config;

pub mod anthropic;
mod http;
pub mod openai;
pub mod template;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

/// Upper bound on generated tokens for every provider call.
pub const MAX_OUTPUT_TOKENS: u32 = 2000;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("No provider found for model: {0}")]
    UnknownModel(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} rejected the API key (status {status})")]
    Auth { provider: &'static str, status: u16 },

    #[error("{provider} rate limit exceeded after {retries} attempts")]
    RateLimited {
        provider: &'static str,
        retries: u32,
    },

    #[error("{provider} API error (status {status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Uniform completion result returned by every provider.
#[derive(Debug, Clone, Serialize)]
pub struct AiResponse {
    pub content: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// A single external completion API bound to one concrete model.
#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn execute(&self, prompt: &str) -> Result<AiResponse, AiError>;
}

/// Registry of providers keyed by the public model name stored on prompts.
#[derive(Clone, Default)]
pub struct AiService {
    providers: BTreeMap<String, Arc<dyn AiProvider>>,
}

impl AiService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from whichever vendor keys are configured.
    pub fn from_config(config: &Config) -> Self {
        let mut service = Self::new();

        if let Some(key) = &config.openai_api_key {
            for (name, model) in [("gpt-4", "gpt-4"), ("gpt-3.5-turbo", "gpt-3.5-turbo")] {
                service.add_provider(
                    name,
                    OpenAiProvider::new(key.clone(), model).with_base_url(&config.openai_base_url),
                );
            }
        }

        if let Some(key) = &config.anthropic_api_key {
            for (name, model) in [
                ("claude-3-sonnet", "claude-3-sonnet-20240229"),
                ("claude-3-haiku", "claude-3-haiku-20240307"),
            ] {
                service.add_provider(
                    name,
                    AnthropicProvider::new(key.clone(), model)
                        .with_base_url(&config.anthropic_base_url),
                );
            }
        }

        info!("AI service ready with models: {:?}", service.available_models());
        service
    }

    pub fn add_provider(&mut self, name: impl Into<String>, provider: impl AiProvider + 'static) {
        self.providers.insert(name.into(), Arc::new(provider));
    }

    pub async fn execute_prompt(&self, model: &str, prompt: &str) -> Result<AiResponse, AiError> {
        let provider = self
            .providers
            .get(model)
            .ok_or_else(|| AiError::UnknownModel(model.to_string()))?;
        provider.execute(prompt).await
    }

    /// Registered model names in sorted order.
    pub fn available_models(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn is_available(&self, model: &str) -> bool {
        self.providers.contains_key(model)
    }
}

/// Catalog entry for a model the marketplace knows how to run.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub provider: &'static str,
    pub kind: &'static str,
}

pub const SUPPORTED_MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "gpt-4",
        name: "GPT-4",
        provider: "OpenAI",
        kind: "text",
    },
    ModelInfo {
        id: "gpt-3.5-turbo",
        name: "GPT-3.5 Turbo",
        provider: "OpenAI",
        kind: "text",
    },
    ModelInfo {
        id: "claude-3-sonnet",
        name: "Claude 3 Sonnet",
        provider: "Anthropic",
        kind: "text",
    },
    ModelInfo {
        id: "claude-3-haiku",
        name: "Claude 3 Haiku",
        provider: "Anthropic",
        kind: "text",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoProvider {
        model: &'static str,
    }

    #[async_trait]
    impl AiProvider for EchoProvider {
        async fn execute(&self, prompt: &str) -> Result<AiResponse, AiError> {
            Ok(AiResponse {
                content: format!("echo: {prompt}"),
                model: self.model.to_string(),
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn test_execute_prompt_dispatches_by_model_name() {
        let mut service = AiService::new();
        service.add_provider("echo-a", EchoProvider { model: "a-1" });
        service.add_provider("echo-b", EchoProvider { model: "b-1" });

        let response = service.execute_prompt("echo-b", "hello").await.unwrap();
        assert_eq!(response.content, "echo: hello");
        assert_eq!(response.model, "b-1");
    }

    #[tokio::test]
    async fn test_unknown_model_is_rejected() {
        let service = AiService::new();
        let err = service.execute_prompt("gpt-9", "hello").await.unwrap_err();
        assert!(matches!(err, AiError::UnknownModel(ref m) if m == "gpt-9"));
    }

    #[test]
    fn test_available_models_are_sorted() {
        let mut service = AiService::new();
        service.add_provider("zeta", EchoProvider { model: "z" });
        service.add_provider("alpha", EchoProvider { model: "a" });
        assert_eq!(service.available_models(), vec!["alpha", "zeta"]);
        assert!(service.is_available("alpha"));
        assert!(!service.is_available("beta"));
    }

    #[test]
    fn test_from_config_registers_only_configured_vendors() {
        let mut config = Config::for_tests();
        assert!(AiService::from_config(&config).available_models().is_empty());

        config.anthropic_api_key = Some("sk-ant-test".to_string());
        assert_eq!(
            AiService::from_config(&config).available_models(),
            vec!["claude-3-haiku", "claude-3-sonnet"]
        );

        config.openai_api_key = Some("sk-test".to_string());
        assert_eq!(AiService::from_config(&config).available_models().len(), 4);
    }

    #[test]
    fn test_catalog_ids_match_registry_names() {
        let mut config = Config::for_tests();
        config.openai_api_key = Some("sk-test".to_string());
        config.anthropic_api_key = Some("sk-ant-test".to_string());
        let service = AiService::from_config(&config);
        for model in SUPPORTED_MODELS {
            assert!(service.is_available(model.id), "{} not registered", model.id);
        }
    }
}
