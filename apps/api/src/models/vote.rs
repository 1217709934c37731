use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One user's vote on one prompt. `value` is -1 or 1; a removed vote has no row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Vote {
    pub id: Uuid,
    pub user_id: Uuid,
    pub prompt_id: Uuid,
    pub value: i16,
    pub created_at: DateTime<Utc>,
}
