use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::ai::AiError;
use crate::rate_limit::RateLimitResult;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limit exceeded")]
    RateLimited(RateLimitResult),

    #[error("Model \"{model}\" is not available")]
    ModelUnavailable {
        model: String,
        available: Vec<String>,
    },

    #[error("AI error: {0}")]
    Ai(#[from] AiError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut details: Option<Value> = None;

        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::RateLimited(info) => {
                details = Some(json!({ "rate_limit_info": info }));
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "RATE_LIMITED",
                    "Rate limit exceeded. Please wait before running another prompt.".to_string(),
                )
            }
            AppError::ModelUnavailable { model, available } => {
                details = Some(json!({ "available_models": available }));
                (
                    StatusCode::BAD_REQUEST,
                    "MODEL_UNAVAILABLE",
                    format!(
                        "Model \"{model}\" is not available. Available models: {}",
                        available.join(", ")
                    ),
                )
            }
            AppError::Ai(e) => {
                tracing::error!("AI execution error: {e}");
                match e {
                    AiError::Auth { .. } => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "AI_UNAVAILABLE",
                        "AI service configuration error. Please try again later.".to_string(),
                    ),
                    AiError::RateLimited { .. } => (
                        StatusCode::TOO_MANY_REQUESTS,
                        "AI_RATE_LIMITED",
                        "AI service rate limit exceeded. Please try again in a few minutes."
                            .to_string(),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "AI_ERROR",
                        "Failed to execute prompt with AI service".to_string(),
                    ),
                }
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(details) = details {
            error["details"] = details;
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: AppError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_error_envelope() {
        let (status, body) = render(AppError::Validation("title too short".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["message"], "title too short");
        assert!(body["error"].get("details").is_none());
    }

    #[tokio::test]
    async fn test_model_unavailable_lists_available_models() {
        let (status, body) = render(AppError::ModelUnavailable {
            model: "gpt-9".into(),
            available: vec!["claude-3-haiku".into(), "gpt-4".into()],
        })
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"]["details"]["available_models"],
            json!(["claude-3-haiku", "gpt-4"])
        );
    }

    #[tokio::test]
    async fn test_rate_limited_carries_limit_info() {
        let info = RateLimitResult {
            success: false,
            limit: 5,
            remaining: 0,
            reset: chrono::Utc::now(),
        };
        let (status, body) = render(AppError::RateLimited(info)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["details"]["rate_limit_info"]["limit"], 5);
    }

    #[tokio::test]
    async fn test_ai_errors_map_to_distinct_statuses() {
        let (status, _) = render(AppError::Ai(AiError::Auth {
            provider: "OpenAI",
            status: 401,
        }))
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = render(AppError::Ai(AiError::RateLimited {
            provider: "OpenAI",
            retries: 3,
        }))
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        let (status, body) = render(AppError::Ai(AiError::Api {
            provider: "Anthropic",
            status: 400,
            message: "secret upstream detail".into(),
        }))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.to_string().contains("secret upstream detail"));
    }
}
