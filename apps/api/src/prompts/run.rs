//! Prompt execution: `POST /api/prompts/:id/run` sends a published prompt,
//! with the buyer's input substituted in, to the AI provider registered for
//! its model.

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::ai::template::{has_input_placeholders, substitute_input};
use crate::ai::TokenUsage;
use crate::auth::{AuthUser, MaybeUser};
use crate::errors::AppError;
use crate::models::prompt::{Prompt, PromptView};
use crate::prompts::handlers::prompt_not_found;
use crate::prompts::queries::fetch_view;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub input: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunPromptSummary {
    pub id: Uuid,
    pub title: String,
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct RunRateLimitInfo {
    pub remaining: u32,
    pub reset: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub success: bool,
    pub prompt: RunPromptSummary,
    pub input: String,
    pub output: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub rate_limit_info: RunRateLimitInfo,
}

#[derive(Debug, Serialize)]
pub struct RunPreview {
    #[serde(flatten)]
    pub prompt: PromptView,
    pub is_model_supported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_models: Option<Vec<String>>,
    pub has_input_placeholders: bool,
}

/// POST /api/prompts/:id/run
///
/// Body `{input}` is optional; an empty body runs the prompt with no input.
pub async fn handle_run_prompt(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<RunResponse>, AppError> {
    let input = parse_run_body(&body)?;
    let limit = state.rate_limiter.check(&user.id.to_string()).await;
    if !limit.success {
        info!("Run refused for user {}: rate limited", user.id);
        return Err(AppError::RateLimited(limit));
    }

    let prompt = load_runnable(&state, id).await?;
    let text = substitute_input(&prompt.content, &input);

    if !state.ai.is_available(&prompt.model) {
        return Err(AppError::ModelUnavailable {
            model: prompt.model,
            available: state.ai.available_models(),
        });
    }

    let response = state.ai.execute_prompt(&prompt.model, &text).await?;
    info!(
        "Ran prompt {} for user {} on {}",
        prompt.id, user.id, response.model
    );

    Ok(Json(RunResponse {
        success: true,
        prompt: RunPromptSummary {
            id: prompt.id,
            title: prompt.title,
            model: prompt.model,
        },
        input,
        output: response.content,
        model: response.model,
        usage: response.usage,
        rate_limit_info: RunRateLimitInfo {
            remaining: limit.remaining,
            reset: limit.reset,
        },
    }))
}

/// GET /api/prompts/:id/run
///
/// What a buyer needs before running: whether the model can be served and
/// whether the prompt takes input.
pub async fn handle_run_preview(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<Uuid>,
) -> Result<Json<RunPreview>, AppError> {
    let view = fetch_view(&state.db, id, viewer.id())
        .await?
        .ok_or_else(|| prompt_not_found(id))?;
    if !view.prompt.published {
        return Err(unpublished());
    }

    let is_model_supported = state.ai.is_available(&view.prompt.model);
    Ok(Json(RunPreview {
        has_input_placeholders: has_input_placeholders(&view.prompt.content),
        available_models: (!is_model_supported).then(|| state.ai.available_models()),
        is_model_supported,
        prompt: view,
    }))
}

async fn load_runnable(state: &AppState, id: Uuid) -> Result<Prompt, AppError> {
    let prompt: Prompt = sqlx::query_as("SELECT * FROM prompts WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| prompt_not_found(id))?;

    if !prompt.published {
        return Err(unpublished());
    }
    Ok(prompt)
}

fn unpublished() -> AppError {
    AppError::Forbidden("Prompt is not published".to_string())
}

fn parse_run_body(body: &[u8]) -> Result<String, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(String::new());
    }
    let req: RunRequest = serde_json::from_slice(body)
        .map_err(|_| AppError::Validation("Input must be a string".to_string()))?;
    Ok(req.input.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_body_input() {
        assert_eq!(parse_run_body(b"").unwrap(), "");
        assert_eq!(parse_run_body(b"{}").unwrap(), "");
        assert_eq!(parse_run_body(br#"{"input": null}"#).unwrap(), "");
        assert_eq!(parse_run_body(br#"{"input": "seo"}"#).unwrap(), "seo");
    }

    #[test]
    fn test_malformed_run_body_is_rejected() {
        let bodies: [&[u8]; 2] = [br#"{"input": 42}"#, b"{input"];
        for body in bodies {
            assert!(matches!(parse_run_body(body), Err(AppError::Validation(_))));
        }
    }
}
