//! Prompt view queries: a prompt joined with its author, category and vote
//! aggregates, personalized for one (optional) viewer.

use serde::Deserialize;
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::prompt::{PromptView, PromptViewRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Most upvoted first, newest breaking ties.
    Trending,
    Newest,
    Votes,
}

impl SortOrder {
    /// Unknown or missing values fall back to `Trending`.
    pub fn from_param(raw: Option<&str>) -> Self {
        match raw {
            Some("newest") => Self::Newest,
            Some("votes") => Self::Votes,
            _ => Self::Trending,
        }
    }

    fn order_by(self) -> &'static str {
        match self {
            Self::Trending => "p.upvote_count DESC, p.created_at DESC",
            Self::Newest => "p.created_at DESC",
            Self::Votes => "p.upvote_count DESC",
        }
    }
}

/// Query parameters accepted by `GET /api/prompts`.
#[derive(Debug, Default, Deserialize)]
pub struct PromptFilter {
    pub category_id: Option<Uuid>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub model: Option<String>,
    pub user_id: Option<Uuid>,
}

/// Builds a case-insensitive substring pattern for `ILIKE`, matching `%`, `_`
/// and `\` in the needle literally.
pub fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

/// Starts a prompt view query; callers append `WHERE` / `ORDER BY` clauses.
fn view_query(viewer: Option<Uuid>) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(
        r#"
        SELECT p.*,
               u.name AS author_name,
               u.image AS author_image,
               c.name AS category_name,
               (SELECT COUNT(*) FROM votes v WHERE v.prompt_id = p.id) AS vote_count,
               EXISTS (SELECT 1 FROM votes v WHERE v.prompt_id = p.id AND v.user_id = "#,
    );
    qb.push_bind(viewer);
    qb.push(
        r#") AS is_voted
        FROM prompts p
        JOIN users u ON u.id = p.user_id
        JOIN categories c ON c.id = p.category_id
        "#,
    );
    qb
}

pub async fn fetch_view<'c, E>(
    executor: E,
    prompt_id: Uuid,
    viewer: Option<Uuid>,
) -> Result<Option<PromptView>, sqlx::Error>
where
    E: PgExecutor<'c>,
{
    let mut qb = view_query(viewer);
    qb.push(" WHERE p.id = ").push_bind(prompt_id);

    let row = qb
        .build_query_as::<PromptViewRow>()
        .fetch_optional(executor)
        .await?;
    Ok(row.map(PromptView::from))
}

/// Views for the given ids, in no particular order.
pub async fn fetch_views(
    pool: &PgPool,
    prompt_ids: &[Uuid],
    viewer: Option<Uuid>,
) -> Result<Vec<PromptView>, sqlx::Error> {
    if prompt_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = view_query(viewer);
    qb.push(" WHERE p.id = ANY(")
        .push_bind(prompt_ids.to_vec())
        .push(")");

    let rows = qb.build_query_as::<PromptViewRow>().fetch_all(pool).await?;
    Ok(rows.into_iter().map(PromptView::from).collect())
}

/// Marketplace listing. Only published prompts are listed, except that an
/// author filtering on their own id also sees their unpublished drafts.
pub async fn list_views(
    pool: &PgPool,
    filter: &PromptFilter,
    viewer: Option<Uuid>,
) -> Result<Vec<PromptView>, sqlx::Error> {
    let mut qb = view_query(viewer);

    match filter.user_id {
        Some(author) if Some(author) == viewer => {
            qb.push(" WHERE p.user_id = ").push_bind(author);
        }
        Some(author) => {
            qb.push(" WHERE p.published = TRUE AND p.user_id = ")
                .push_bind(author);
        }
        None => {
            qb.push(" WHERE p.published = TRUE");
        }
    }

    if let Some(category_id) = filter.category_id {
        qb.push(" AND p.category_id = ").push_bind(category_id);
    }

    if let Some(model) = filter.model.as_deref().filter(|m| !m.is_empty()) {
        qb.push(" AND p.model = ").push_bind(model.to_string());
    }

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = contains_pattern(search);
        qb.push(" AND (p.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    let sort = SortOrder::from_param(filter.sort.as_deref());
    qb.push(" ORDER BY ").push(sort.order_by());

    let rows = qb.build_query_as::<PromptViewRow>().fetch_all(pool).await?;
    Ok(rows.into_iter().map(PromptView::from).collect())
}

/// Published prompts whose title, description, content or model contain `query`.
pub async fn search_views(
    pool: &PgPool,
    query: &str,
    viewer: Option<Uuid>,
    limit: i64,
) -> Result<Vec<PromptView>, sqlx::Error> {
    let pattern = contains_pattern(query);

    let mut qb = view_query(viewer);
    qb.push(" WHERE p.published = TRUE AND ");
    push_any_column_matches(&mut qb, &pattern);
    qb.push(" ORDER BY ").push(SortOrder::Trending.order_by());
    qb.push(" LIMIT ").push_bind(limit);

    let rows = qb.build_query_as::<PromptViewRow>().fetch_all(pool).await?;
    Ok(rows.into_iter().map(PromptView::from).collect())
}

fn push_any_column_matches(qb: &mut QueryBuilder<'static, Postgres>, pattern: &str) {
    qb.push("(");
    let mut columns = qb.separated(" OR ");
    for column in ["p.title", "p.description", "p.content", "p.model"] {
        columns
            .push(format!("{column} ILIKE "))
            .push_bind_unseparated(pattern.to_string());
    }
    qb.push(")");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_order_defaults_to_trending() {
        assert_eq!(SortOrder::from_param(None), SortOrder::Trending);
        assert_eq!(SortOrder::from_param(Some("trending")), SortOrder::Trending);
        assert_eq!(SortOrder::from_param(Some("bogus")), SortOrder::Trending);
        assert_eq!(SortOrder::from_param(Some("newest")), SortOrder::Newest);
        assert_eq!(SortOrder::from_param(Some("votes")), SortOrder::Votes);
    }

    #[test]
    fn test_trending_breaks_ties_by_recency() {
        assert_eq!(
            SortOrder::Trending.order_by(),
            "p.upvote_count DESC, p.created_at DESC"
        );
    }

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("seo"), "%seo%");
        assert_eq!(contains_pattern("100%"), "%100\\%%");
        assert_eq!(contains_pattern("snake_case"), "%snake\\_case%");
        assert_eq!(contains_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_view_query_binds_viewer_first() {
        let mut qb = view_query(None);
        qb.push(" WHERE p.id = ").push_bind(Uuid::nil());
        let sql = qb.sql();
        assert!(sql.contains("v.user_id = $1"));
        assert!(sql.contains("p.id = $2"));
    }

    #[test]
    fn test_search_matches_four_columns() {
        let mut qb = view_query(None);
        qb.push(" WHERE ");
        push_any_column_matches(&mut qb, "%x%");
        let sql = qb.sql();
        assert!(sql.contains("p.title ILIKE $2 OR p.description ILIKE $3"));
        assert!(sql.contains("p.model ILIKE $5)"));
    }
}
