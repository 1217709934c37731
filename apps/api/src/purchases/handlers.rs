use std::collections::HashMap;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::prompt::{Prompt, PromptView};
use crate::models::purchase::Purchase;
use crate::prompts::handlers::prompt_not_found;
use crate::prompts::queries::{fetch_view, fetch_views};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub prompt_id: Option<Uuid>,
}

/// A purchase together with the prompt it unlocked.
#[derive(Debug, Serialize)]
pub struct PurchaseView {
    #[serde(flatten)]
    pub purchase: Purchase,
    pub prompt: PromptView,
}

/// GET /api/purchases
///
/// The caller's purchases, newest first.
pub async fn handle_list_purchases(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<PurchaseView>>, AppError> {
    let purchases: Vec<Purchase> =
        sqlx::query_as("SELECT * FROM purchases WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user.id)
            .fetch_all(&state.db)
            .await?;

    let ids: Vec<Uuid> = purchases.iter().map(|p| p.prompt_id).collect();
    let mut views: HashMap<Uuid, PromptView> = fetch_views(&state.db, &ids, Some(user.id))
        .await?
        .into_iter()
        .map(|view| (view.prompt.id, view))
        .collect();

    let items = purchases
        .into_iter()
        .filter_map(|purchase| {
            let prompt = views.remove(&purchase.prompt_id)?;
            Some(PurchaseView { purchase, prompt })
        })
        .collect();

    Ok(Json(items))
}

/// POST /api/purchases
///
/// The price is copied from the prompt at purchase time. The unique
/// (user, prompt) constraint turns concurrent duplicates into 409s.
pub async fn handle_create_purchase(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<PurchaseView>), AppError> {
    let prompt_id = req
        .prompt_id
        .ok_or_else(|| AppError::Validation("prompt_id is required".to_string()))?;

    let prompt: Prompt = sqlx::query_as("SELECT * FROM prompts WHERE id = $1")
        .bind(prompt_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| prompt_not_found(prompt_id))?;

    if prompt.user_id == user.id {
        return Err(AppError::Validation(
            "You cannot purchase your own prompt".to_string(),
        ));
    }

    let purchase: Purchase = sqlx::query_as(
        r#"
        INSERT INTO purchases (user_id, prompt_id, price)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, prompt_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(prompt.id)
    .bind(prompt.price)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::Conflict("Prompt already purchased".to_string()))?;

    let view = fetch_view(&state.db, prompt.id, Some(user.id))
        .await?
        .ok_or_else(|| prompt_not_found(prompt.id))?;

    info!("User {} purchased prompt {} for {}", user.id, prompt.id, purchase.price);
    Ok((
        StatusCode::CREATED,
        Json(PurchaseView {
            purchase,
            prompt: view,
        }),
    ))
}
