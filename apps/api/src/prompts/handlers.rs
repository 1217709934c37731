use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::auth::{AuthUser, MaybeUser};
use crate::errors::AppError;
use crate::models::prompt::{Prompt, PromptView};
use crate::prompts::queries::{fetch_view, list_views, PromptFilter};
use crate::prompts::validation::{CreatePromptRequest, UpdatePromptRequest};
use crate::state::AppState;

/// GET /api/prompts
pub async fn handle_list_prompts(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(filter): Query<PromptFilter>,
) -> Result<Json<Vec<PromptView>>, AppError> {
    let prompts = list_views(&state.db, &filter, viewer.id()).await?;
    Ok(Json(prompts))
}

/// POST /api/prompts
pub async fn handle_create_prompt(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreatePromptRequest>,
) -> Result<(StatusCode, Json<PromptView>), AppError> {
    let new = req.validate()?;
    ensure_category_exists(&state.db, new.category_id).await?;

    let mut tx = state.db.begin().await?;
    let prompt_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO prompts
            (title, description, content, model, price, published, user_id, category_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(&new.title)
    .bind(&new.description)
    .bind(&new.content)
    .bind(&new.model)
    .bind(new.price)
    .bind(new.published)
    .bind(user.id)
    .bind(new.category_id)
    .fetch_one(&mut *tx)
    .await?;

    let view = fetch_view(&mut *tx, prompt_id, Some(user.id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Prompt {prompt_id} not found")))?;
    tx.commit().await?;

    info!("User {} created prompt {prompt_id}", user.id);
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/prompts/:id
pub async fn handle_get_prompt(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PromptView>, AppError> {
    let view = fetch_view(&state.db, id, viewer.id())
        .await?
        .ok_or_else(|| prompt_not_found(id))?;
    Ok(Json(view))
}

/// PATCH /api/prompts/:id
pub async fn handle_update_prompt(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePromptRequest>,
) -> Result<Json<PromptView>, AppError> {
    let changes = req.validate()?;
    load_owned(&state.db, id, user.id).await?;
    if let Some(category_id) = changes.category_id {
        ensure_category_exists(&state.db, category_id).await?;
    }

    sqlx::query(
        r#"
        UPDATE prompts SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            content = COALESCE($4, content),
            model = COALESCE($5, model),
            price = COALESCE($6, price),
            category_id = COALESCE($7, category_id),
            published = COALESCE($8, published),
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&changes.title)
    .bind(&changes.description)
    .bind(&changes.content)
    .bind(&changes.model)
    .bind(changes.price)
    .bind(changes.category_id)
    .bind(changes.published)
    .execute(&state.db)
    .await?;

    let view = fetch_view(&state.db, id, Some(user.id))
        .await?
        .ok_or_else(|| prompt_not_found(id))?;
    Ok(Json(view))
}

/// DELETE /api/prompts/:id
///
/// Votes and purchases referencing the prompt are removed by cascade.
pub async fn handle_delete_prompt(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    load_owned(&state.db, id, user.id).await?;

    sqlx::query("DELETE FROM prompts WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    info!("User {} deleted prompt {id}", user.id);
    Ok(Json(json!({ "success": true })))
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

pub(crate) fn prompt_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Prompt {id} not found"))
}

/// Loads a prompt for mutation: 404 when missing, 403 when owned by someone else.
async fn load_owned(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<Prompt, AppError> {
    let prompt: Prompt = sqlx::query_as("SELECT * FROM prompts WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| prompt_not_found(id))?;

    if prompt.user_id != user_id {
        return Err(AppError::Forbidden(
            "You can only modify your own prompts".to_string(),
        ));
    }
    Ok(prompt)
}

async fn ensure_category_exists(pool: &PgPool, category_id: Uuid) -> Result<(), AppError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM categories WHERE id = $1)")
        .bind(category_id)
        .fetch_one(pool)
        .await?;

    if exists {
        Ok(())
    } else {
        Err(AppError::Validation("Invalid category".to_string()))
    }
}
