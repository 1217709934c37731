use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::{build_client, post_json, RetryPolicy};
use super::{AiError, AiProvider, AiResponse, TokenUsage, MAX_OUTPUT_TOKENS};

const PROVIDER: &str = "Anthropic";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl MessagesResponse {
    /// Text of the first block, empty when that block is not text.
    fn first_text(self) -> String {
        self.content
            .into_iter()
            .next()
            .filter(|b| b.block_type == "text")
            .and_then(|b| b.text)
            .unwrap_or_default()
    }
}

/// Messages API adapter bound to one Claude model.
#[derive(Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    retry: RetryPolicy,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: impl Into<String>) -> Self {
        Self {
            client: build_client(),
            api_key,
            model: model.into(),
            base_url: "https://api.anthropic.com".to_string(),
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
impl AiProvider for AnthropicProvider {
    async fn execute(&self, prompt: &str) -> Result<AiResponse, AiError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_OUTPUT_TOKENS,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };
        let url = format!("{}/v1/messages", self.base_url);

        let response: MessagesResponse = post_json(
            &self.client,
            PROVIDER,
            &url,
            &[
                ("x-api-key", self.api_key.as_str()),
                ("anthropic-version", ANTHROPIC_VERSION),
            ],
            &body,
            self.retry,
        )
        .await?;

        let usage = response.usage.as_ref().map(|u| TokenUsage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        });

        Ok(AiResponse {
            content: response.first_text(),
            model: self.model.clone(),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_execute_sums_input_and_output_tokens() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "sk-ant-test")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "content": [{"type": "text", "text": "Bonjour"}],
                    "usage": {"input_tokens": 12, "output_tokens": 4}
                }"#,
            )
            .create_async()
            .await;

        let provider = AnthropicProvider::new("sk-ant-test".to_string(), "claude-3-haiku-20240307")
            .with_base_url(&server.url());
        let response = provider.execute("Translate hello").await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "Bonjour");
        assert_eq!(response.model, "claude-3-haiku-20240307");
        assert_eq!(response.usage.unwrap().total_tokens, 16);
    }

    #[tokio::test]
    async fn test_non_text_first_block_yields_empty_content() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "content": [{"type": "tool_use", "id": "t1"}, {"type": "text", "text": "late"}],
                    "usage": {"input_tokens": 1, "output_tokens": 1}
                }"#,
            )
            .create_async()
            .await;

        let provider = AnthropicProvider::new("k".to_string(), "claude-3-sonnet-20240229")
            .with_base_url(&server.url());
        assert_eq!(provider.execute("x").await.unwrap().content, "");
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("POST", "/v1/messages")
            .with_status(529)
            .with_body(r#"{"error": {"message": "Overloaded"}}"#)
            .expect(3)
            .create_async()
            .await;

        let provider = AnthropicProvider::new("k".to_string(), "claude-3-sonnet-20240229")
            .with_base_url(&server.url())
            .with_retry(RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
            });
        let err = provider.execute("x").await.unwrap_err();

        failing.assert_async().await;
        match err {
            AiError::Api {
                status, message, ..
            } => {
                assert_eq!(status, 529);
                assert_eq!(message, "Overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
