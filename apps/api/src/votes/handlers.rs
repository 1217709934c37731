use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::auth::{AuthUser, MaybeUser};
use crate::errors::AppError;
use crate::models::prompt::PromptView;
use crate::prompts::handlers::prompt_not_found;
use crate::prompts::queries::fetch_view;
use crate::state::AppState;
use crate::votes::tally::{apply_vote, requested_value};

#[derive(Debug, Default, Deserialize)]
pub struct VoteRequest {
    pub value: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    #[serde(flatten)]
    pub prompt: PromptView,
    pub user_vote_value: i16,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct VoteStatus {
    pub is_voted: bool,
    pub user_vote_value: i16,
}

/// POST /api/prompts/:id/vote
///
/// Body `{value}` with value in {-1, 0, 1}; an empty body or omitted value
/// means upvote. The body is read as JSON whatever its content type.
/// Repeating the current vote removes it.
pub async fn handle_vote(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<VoteResponse>, AppError> {
    let requested = requested_value(parse_vote_body(&body)?)?;

    let user_vote_value = apply_vote(&state.db, id, user.id, requested)
        .await?
        .ok_or_else(|| prompt_not_found(id))?;
    debug!("User {} vote on {id} is now {user_vote_value}", user.id);

    let prompt = fetch_view(&state.db, id, Some(user.id))
        .await?
        .ok_or_else(|| prompt_not_found(id))?;

    Ok(Json(VoteResponse {
        prompt,
        user_vote_value,
    }))
}

/// GET /api/prompts/:id/vote
pub async fn handle_vote_status(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<Uuid>,
) -> Result<Json<VoteStatus>, AppError> {
    let Some(user_id) = viewer.id() else {
        return Ok(Json(VoteStatus {
            is_voted: false,
            user_vote_value: 0,
        }));
    };

    let value: Option<i16> =
        sqlx::query_scalar("SELECT value FROM votes WHERE user_id = $1 AND prompt_id = $2")
            .bind(user_id)
            .bind(id)
            .fetch_optional(&state.db)
            .await?;

    Ok(Json(VoteStatus {
        is_voted: value.is_some(),
        user_vote_value: value.unwrap_or(0),
    }))
}

/// Reads the requested value from a raw vote body. Only an empty body falls
/// back to the default; anything unparseable is rejected.
fn parse_vote_body(body: &[u8]) -> Result<Option<i64>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let req: VoteRequest = serde_json::from_slice(body)
        .map_err(|_| AppError::Validation("Vote value must be -1, 0 or 1".to_string()))?;
    Ok(req.value)
}
