use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use tracing::info;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::category::{Category, CategoryWithCount};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: Option<String>,
}

/// GET /api/categories
pub async fn handle_list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryWithCount>>, AppError> {
    let categories = sqlx::query_as::<_, CategoryWithCount>(
        r#"
        SELECT c.id, c.name, c.created_at,
               COUNT(p.id) AS prompt_count
        FROM categories c
        LEFT JOIN prompts p ON p.category_id = c.id AND p.published = TRUE
        GROUP BY c.id
        ORDER BY c.name ASC
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(categories))
}

/// POST /api/categories
pub async fn handle_create_category(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    let name = category_name(req.name.as_deref())?;

    let category: Category = sqlx::query_as(
        "INSERT INTO categories (name) VALUES ($1) ON CONFLICT (name) DO NOTHING RETURNING *",
    )
    .bind(&name)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::Conflict(format!("Category \"{name}\" already exists")))?;

    info!("User {} created category {}", user.id, category.name);
    Ok((StatusCode::CREATED, Json(category)))
}

fn category_name(raw: Option<&str>) -> Result<String, AppError> {
    let name = raw.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(AppError::Validation("Category name is required".to_string()));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_name_is_trimmed() {
        assert_eq!(category_name(Some("  Design ")).unwrap(), "Design");
    }

    #[test]
    fn test_blank_or_missing_name_is_rejected() {
        assert!(category_name(None).is_err());
        assert!(category_name(Some("   ")).is_err());
    }
}
