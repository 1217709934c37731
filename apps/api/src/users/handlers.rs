use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::user::UserSummary;
use crate::state::AppState;

const MAX_NAME_CHARS: usize = 100;

#[derive(Debug, Serialize, FromRow)]
pub struct ProfileStats {
    /// Published prompts authored by the user.
    pub created_prompts: i64,
    pub purchased_prompts: i64,
    /// Upvotes (value 1) received across the user's prompts.
    pub total_upvotes: i64,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: UserSummary,
    pub stats: ProfileStats,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
}

/// GET /api/user/profile
pub async fn handle_get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let summary: UserSummary =
        sqlx::query_as("SELECT id, name, email, image FROM users WHERE id = $1")
            .bind(user.id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let stats: ProfileStats = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM prompts WHERE user_id = $1 AND published = TRUE) AS created_prompts,
            (SELECT COUNT(*) FROM purchases WHERE user_id = $1) AS purchased_prompts,
            (SELECT COUNT(*)
               FROM votes v
               JOIN prompts p ON p.id = v.prompt_id
              WHERE p.user_id = $1 AND v.value = 1) AS total_upvotes
        "#,
    )
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ProfileResponse {
        user: summary,
        stats,
    }))
}

/// PATCH /api/user/profile
///
/// Only the display name can be changed.
pub async fn handle_update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserSummary>, AppError> {
    let name = display_name(req.name.as_deref())?;

    let updated: UserSummary = sqlx::query_as(
        r#"
        UPDATE users SET name = $2, updated_at = now()
        WHERE id = $1
        RETURNING id, name, email, image
        "#,
    )
    .bind(user.id)
    .bind(&name)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(updated))
}

fn display_name(raw: Option<&str>) -> Result<String, AppError> {
    let name = raw.map(str::trim).unwrap_or_default();
    let len = name.chars().count();
    if len == 0 || len > MAX_NAME_CHARS {
        return Err(AppError::Validation(format!(
            "Name is required and must be at most {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_is_trimmed() {
        assert_eq!(display_name(Some("  Ada Lovelace ")).unwrap(), "Ada Lovelace");
    }

    #[test]
    fn test_display_name_bounds() {
        assert!(display_name(None).is_err());
        assert!(display_name(Some(" \t ")).is_err());
        assert!(display_name(Some("é".repeat(100).as_str())).is_ok());
        assert!(display_name(Some("é".repeat(101).as_str())).is_err());
    }
}
