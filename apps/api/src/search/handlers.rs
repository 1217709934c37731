use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;
use tracing::info;
use uuid::Uuid;

use crate::auth::MaybeUser;
use crate::errors::AppError;
use crate::models::category::CategoryWithCount;
use crate::models::prompt::PromptView;
use crate::prompts::queries::{contains_pattern, search_views};
use crate::state::AppState;

const MIN_QUERY_CHARS: usize = 2;
const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;
/// Users and categories are secondary results and never exceed this many.
const SECONDARY_LIMIT: i64 = 10;

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    #[serde(rename = "type")]
    pub scope: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    All,
    Prompts,
    Users,
    Categories,
}

impl SearchScope {
    pub fn from_param(raw: Option<&str>) -> Self {
        match raw {
            Some("prompts") => Self::Prompts,
            Some("users") => Self::Users,
            Some("categories") => Self::Categories,
            _ => Self::All,
        }
    }

    fn includes(self, other: SearchScope) -> bool {
        self == Self::All || self == other
    }
}

fn clamp_limit(raw: Option<i64>) -> i64 {
    raw.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

#[derive(Debug, Serialize, FromRow)]
pub struct UserHit {
    pub id: Uuid,
    pub name: Option<String>,
    pub image: Option<String>,
    pub prompt_count: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct SearchResults {
    pub prompts: Vec<PromptView>,
    pub users: Vec<UserHit>,
    pub categories: Vec<CategoryWithCount>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct SearchLogRequest {
    pub query: Option<String>,
    pub result_count: Option<u64>,
}

/// GET /api/search?q=&type=&limit=
pub async fn handle_search(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResults>, AppError> {
    let query = params.q.as_deref().map(str::trim).unwrap_or_default();
    if query.chars().count() < MIN_QUERY_CHARS {
        return Ok(Json(SearchResults::default()));
    }

    let scope = SearchScope::from_param(params.scope.as_deref());
    let limit = clamp_limit(params.limit);
    let secondary_limit = limit.min(SECONDARY_LIMIT);
    let pattern = contains_pattern(query);

    let mut results = SearchResults::default();

    if scope.includes(SearchScope::Prompts) {
        results.prompts = search_views(&state.db, query, viewer.id(), limit).await?;
    }

    if scope.includes(SearchScope::Users) {
        results.users = sqlx::query_as::<_, UserHit>(
            r#"
            SELECT u.id, u.name, u.image,
                   COUNT(p.id) AS prompt_count
            FROM users u
            LEFT JOIN prompts p ON p.user_id = u.id AND p.published = TRUE
            WHERE u.name ILIKE $1 OR u.email ILIKE $1
            GROUP BY u.id
            ORDER BY u.name ASC
            LIMIT $2
            "#,
        )
        .bind(&pattern)
        .bind(secondary_limit)
        .fetch_all(&state.db)
        .await?;
    }

    if scope.includes(SearchScope::Categories) {
        results.categories = sqlx::query_as::<_, CategoryWithCount>(
            r#"
            SELECT c.id, c.name, c.created_at,
                   COUNT(p.id) AS prompt_count
            FROM categories c
            LEFT JOIN prompts p ON p.category_id = c.id AND p.published = TRUE
            WHERE c.name ILIKE $1
            GROUP BY c.id
            ORDER BY c.name ASC
            LIMIT $2
            "#,
        )
        .bind(&pattern)
        .bind(secondary_limit)
        .fetch_all(&state.db)
        .await?;
    }

    results.total = results.prompts.len() + results.users.len() + results.categories.len();
    Ok(Json(results))
}

/// POST /api/search
///
/// Records a search for analytics. Only logged; nothing is persisted.
pub async fn handle_log_search(
    viewer: MaybeUser,
    Json(req): Json<SearchLogRequest>,
) -> Json<Value> {
    info!(
        user = ?viewer.id(),
        query = req.query.as_deref().unwrap_or_default(),
        result_count = req.result_count,
        "Search performed"
    );
    Json(json!({ "success": true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_parsing() {
        assert_eq!(SearchScope::from_param(None), SearchScope::All);
        assert_eq!(SearchScope::from_param(Some("users")), SearchScope::Users);
        assert_eq!(SearchScope::from_param(Some("nonsense")), SearchScope::All);
    }

    #[test]
    fn test_all_scope_includes_every_list() {
        for scope in [SearchScope::Prompts, SearchScope::Users, SearchScope::Categories] {
            assert!(SearchScope::All.includes(scope));
        }
        assert!(SearchScope::Users.includes(SearchScope::Users));
        assert!(!SearchScope::Users.includes(SearchScope::Prompts));
    }

    #[test]
    fn test_limit_defaults_and_clamps() {
        assert_eq!(clamp_limit(None), 20);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(-5)), 1);
        assert_eq!(clamp_limit(Some(50)), 50);
        assert_eq!(clamp_limit(Some(10_000)), 100);
    }

    #[test]
    fn test_empty_results_serialize_with_zero_total() {
        let body = serde_json::to_value(SearchResults::default()).unwrap();
        assert_eq!(
            body,
            json!({ "prompts": [], "users": [], "categories": [], "total": 0 })
        );
    }
}
