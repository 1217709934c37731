//! Shared JSON-over-HTTP call used by every provider adapter.

use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use super::AiError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Retries 429 and 5xx responses with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn delay_before(&self, attempt: u32) -> Duration {
        // 1x, 2x, 4x ...
        self.base_delay * (1 << (attempt - 1))
    }
}

pub fn build_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .expect("Failed to build HTTP client")
}

/// Both vendors wrap errors as `{"error": {"message": ...}}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn error_message(body: String) -> String {
    serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}

pub async fn post_json<B, R>(
    client: &Client,
    provider: &'static str,
    url: &str,
    headers: &[(&'static str, &str)],
    body: &B,
    retry: RetryPolicy,
) -> Result<R, AiError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let mut last_error: Option<AiError> = None;

    for attempt in 0..retry.max_attempts {
        if attempt > 0 {
            let delay = retry.delay_before(attempt);
            warn!(
                "{provider} call attempt {attempt} failed, retrying after {}ms...",
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                last_error = Some(AiError::Http(e));
                continue;
            }
        };

        let status = response.status();

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(AiError::Auth {
                provider,
                status: status.as_u16(),
            });
        }

        if status.as_u16() == 429 {
            warn!("{provider} API returned 429");
            last_error = Some(AiError::RateLimited {
                provider,
                retries: attempt + 1,
            });
            continue;
        }

        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            warn!("{provider} API returned {status}: {body}");
            last_error = Some(AiError::Api {
                provider,
                status: status.as_u16(),
                message: error_message(body),
            });
            continue;
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Api {
                provider,
                status: status.as_u16(),
                message: error_message(body),
            });
        }

        debug!("{provider} call succeeded on attempt {}", attempt + 1);
        return Ok(response.json::<R>().await?);
    }

    Err(last_error.unwrap_or(AiError::RateLimited {
        provider,
        retries: retry.max_attempts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_each_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(1), Duration::from_secs(1));
        assert_eq!(policy.delay_before(2), Duration::from_secs(2));
        assert_eq!(policy.delay_before(3), Duration::from_secs(4));
    }

    #[test]
    fn test_error_message_prefers_vendor_envelope() {
        let body = r#"{"error": {"message": "model overloaded", "type": "overloaded_error"}}"#;
        assert_eq!(error_message(body.to_string()), "model overloaded");
        assert_eq!(error_message("plain text".to_string()), "plain text");
    }
}
