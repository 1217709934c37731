use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::{build_client, post_json, RetryPolicy};
use super::{AiError, AiProvider, AiResponse, TokenUsage, MAX_OUTPUT_TOKENS};

const PROVIDER: &str = "OpenAI";
const TEMPERATURE: f32 = 0.7;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Chat Completions adapter bound to one OpenAI model.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    retry: RetryPolicy,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: impl Into<String>) -> Self {
        Self {
            client: build_client(),
            api_key,
            model: model.into(),
            base_url: "https://api.openai.com".to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    #[cfg(test)]
    fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    async fn execute(&self, prompt: &str) -> Result<AiResponse, AiError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: MAX_OUTPUT_TOKENS,
            temperature: TEMPERATURE,
        };
        let authorization = format!("Bearer {}", self.api_key);
        let url = format!("{}/v1/chat/completions", self.base_url);

        let response: ChatResponse = post_json(
            &self.client,
            PROVIDER,
            &url,
            &[("authorization", authorization.as_str())],
            &body,
            self.retry,
        )
        .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();

        Ok(AiResponse {
            content,
            model: self.model.clone(),
            usage: response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_execute_maps_first_choice_and_usage() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"model": "gpt-4", "max_tokens": 2000}"#
                    .to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "choices": [{"message": {"role": "assistant", "content": "hi!"}}],
                    "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
                }"#,
            )
            .create_async()
            .await;

        let provider = OpenAiProvider::new("sk-test".to_string(), "gpt-4").with_base_url(&server.url());
        let response = provider.execute("Say hi").await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "hi!");
        assert_eq!(response.model, "gpt-4");
        assert_eq!(
            response.usage,
            Some(TokenUsage {
                prompt_tokens: 3,
                completion_tokens: 2,
                total_tokens: 5
            })
        );
    }

    #[tokio::test]
    async fn test_execute_without_choices_returns_empty_content() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let provider = OpenAiProvider::new("sk-test".to_string(), "gpt-4").with_base_url(&server.url());
        let response = provider.execute("Say hi").await.unwrap();
        assert_eq!(response.content, "");
        assert!(response.usage.is_none());
    }

    #[tokio::test]
    async fn test_invalid_key_is_an_auth_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(401)
            .with_body(r#"{"error": {"message": "Incorrect API key provided"}}"#)
            .expect(1)
            .create_async()
            .await;

        let provider = OpenAiProvider::new("bad".to_string(), "gpt-4").with_base_url(&server.url());
        let err = provider.execute("Say hi").await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, AiError::Auth { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_persistent_429_becomes_rate_limited_after_retries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .expect(2)
            .create_async()
            .await;

        let provider = OpenAiProvider::new("sk-test".to_string(), "gpt-4")
            .with_base_url(&server.url())
            .with_retry(fast_retry());
        let err = provider.execute("Say hi").await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, AiError::RateLimited { retries: 2, .. }));
    }

    #[tokio::test]
    async fn test_bad_request_surfaces_vendor_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(400)
            .with_body(r#"{"error": {"message": "maximum context length exceeded"}}"#)
            .create_async()
            .await;

        let provider = OpenAiProvider::new("sk-test".to_string(), "gpt-4").with_base_url(&server.url());
        match provider.execute("Say hi").await.unwrap_err() {
            AiError::Api {
                status, message, ..
            } => {
                assert_eq!(status, 400);
                assert_eq!(message, "maximum context length exceeded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
