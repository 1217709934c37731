use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::category::CategoryRef;
use crate::models::user::AuthorSummary;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Prompt {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub content: String,
    pub model: String,
    pub price: f64,
    pub published: bool,
    /// Cached `max(0, sum of vote values)`, maintained by the vote tally.
    pub upvote_count: i32,
    pub user_id: Uuid,
    pub category_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Flat row produced by the prompt view query (prompt joined with author,
/// category and vote aggregates for one viewer).
#[derive(Debug, Clone, FromRow)]
pub struct PromptViewRow {
    #[sqlx(flatten)]
    pub prompt: Prompt,
    pub author_name: Option<String>,
    pub author_image: Option<String>,
    pub category_name: String,
    pub vote_count: i64,
    pub is_voted: bool,
}

/// A prompt as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct PromptView {
    #[serde(flatten)]
    pub prompt: Prompt,
    pub user: AuthorSummary,
    pub category: CategoryRef,
    pub vote_count: i64,
    pub is_voted: bool,
}

impl From<PromptViewRow> for PromptView {
    fn from(row: PromptViewRow) -> Self {
        let user = AuthorSummary {
            id: row.prompt.user_id,
            name: row.author_name,
            image: row.author_image,
        };
        let category = CategoryRef {
            id: row.prompt.category_id,
            name: row.category_name,
        };
        Self {
            prompt: row.prompt,
            user,
            category,
            vote_count: row.vote_count,
            is_voted: row.is_voted,
        }
    }
}
