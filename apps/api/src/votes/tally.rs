//! Vote transitions and the prompt upvote counter.
//!
//! A vote change and the counter refresh run in one transaction that holds a
//! row lock on the prompt, so concurrent voters on the same prompt are
//! serialized and the counter always equals `max(0, sum of vote values)`.

use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::vote::Vote;

/// Sets `upvote_count` of prompt `$1` to the clamped sum of its vote values.
const RECOUNT_UPVOTES: &str = r#"
UPDATE prompts
SET upvote_count = (
    SELECT GREATEST(0, COALESCE(SUM(value), 0))::int
    FROM votes
    WHERE prompt_id = $1
)
WHERE id = $1
"#;

/// What to do with a user's vote row given their current vote and the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTransition {
    Nothing,
    Delete,
    Upsert(i16),
}

impl VoteTransition {
    pub fn plan(existing: Option<i16>, requested: i16) -> Self {
        match (existing, requested) {
            (None, 0) => Self::Nothing,
            (Some(_), 0) => Self::Delete,
            (Some(current), v) if current == v => Self::Delete,
            (_, v) => Self::Upsert(v),
        }
    }

    /// The caller's vote value after the transition; 0 when no row remains.
    pub fn resulting_value(self) -> i16 {
        match self {
            Self::Nothing | Self::Delete => 0,
            Self::Upsert(v) => v,
        }
    }
}

/// Parses the requested vote value: absent means an upvote.
pub fn requested_value(raw: Option<i64>) -> Result<i16, AppError> {
    match raw.unwrap_or(1) {
        v @ -1..=1 => Ok(v as i16),
        _ => Err(AppError::Validation(
            "Vote value must be -1, 0 or 1".to_string(),
        )),
    }
}

/// Applies a vote and refreshes the counter. Returns the caller's resulting
/// vote value, or `None` when the prompt does not exist.
pub async fn apply_vote(
    pool: &PgPool,
    prompt_id: Uuid,
    user_id: Uuid,
    requested: i16,
) -> Result<Option<i16>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM prompts WHERE id = $1 FOR UPDATE")
        .bind(prompt_id)
        .fetch_optional(&mut *tx)
        .await?;
    if locked.is_none() {
        return Ok(None);
    }

    let existing: Option<Vote> =
        sqlx::query_as("SELECT * FROM votes WHERE user_id = $1 AND prompt_id = $2")
            .bind(user_id)
            .bind(prompt_id)
            .fetch_optional(&mut *tx)
            .await?;

    let transition = VoteTransition::plan(existing.map(|v| v.value), requested);
    match transition {
        VoteTransition::Nothing => {}
        VoteTransition::Delete => {
            sqlx::query("DELETE FROM votes WHERE user_id = $1 AND prompt_id = $2")
                .bind(user_id)
                .bind(prompt_id)
                .execute(&mut *tx)
                .await?;
        }
        VoteTransition::Upsert(value) => {
            sqlx::query(
                r#"
                INSERT INTO votes (user_id, prompt_id, value)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, prompt_id) DO UPDATE SET value = EXCLUDED.value
                "#,
            )
            .bind(user_id)
            .bind(prompt_id)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
    }

    if transition != VoteTransition::Nothing {
        sqlx::query(RECOUNT_UPVOTES)
            .bind(prompt_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(Some(transition.resulting_value()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recount_clamps_vote_sum_at_zero() {
        let sql = RECOUNT_UPVOTES.split_whitespace().collect::<Vec<_>>().join(" ");
        assert!(sql.starts_with("UPDATE prompts SET upvote_count = ("));
        assert!(sql.contains(
            "SELECT GREATEST(0, COALESCE(SUM(value), 0))::int FROM votes WHERE prompt_id = $1 )"
        ));
        assert!(sql.ends_with("WHERE id = $1"));
    }

    #[test]
    fn test_transition_table() {
        use VoteTransition::*;
        let cases = [
            (None, 0, Nothing),
            (Some(1), 0, Delete),
            (Some(-1), 0, Delete),
            (Some(1), 1, Delete),
            (Some(-1), -1, Delete),
            (None, 1, Upsert(1)),
            (None, -1, Upsert(-1)),
            (Some(1), -1, Upsert(-1)),
            (Some(-1), 1, Upsert(1)),
        ];
        for (existing, requested, expected) in cases {
            assert_eq!(
                VoteTransition::plan(existing, requested),
                expected,
                "existing {existing:?}, requested {requested}"
            );
        }
    }

    #[test]
    fn test_resulting_value() {
        assert_eq!(VoteTransition::plan(Some(1), 1).resulting_value(), 0);
        assert_eq!(VoteTransition::plan(Some(1), -1).resulting_value(), -1);
        assert_eq!(VoteTransition::plan(None, 0).resulting_value(), 0);
    }

    #[test]
    fn test_requested_value_defaults_to_upvote() {
        assert_eq!(requested_value(None).unwrap(), 1);
        assert_eq!(requested_value(Some(0)).unwrap(), 0);
        assert_eq!(requested_value(Some(-1)).unwrap(), -1);
    }

    #[test]
    fn test_requested_value_out_of_range() {
        for raw in [2, -2, 100] {
            assert!(matches!(
                requested_value(Some(raw)),
                Err(AppError::Validation(_))
            ));
        }
    }
}
