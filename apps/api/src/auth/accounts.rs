//! User records behind sign-in: credentials upsert and OAuth account linking.

use sqlx::PgPool;
use tracing::info;

use crate::auth::oauth::{OAuthProfile, ProviderKind};
use crate::models::user::User;

/// Finds or creates the user for a development credentials sign-in.
/// An existing user keeps their name.
pub async fn upsert_credentials_user(
    pool: &PgPool,
    email: &str,
    name: &str,
) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, name)
        VALUES ($1, $2)
        ON CONFLICT (email) DO UPDATE
            SET name = COALESCE(users.name, EXCLUDED.name),
                updated_at = now()
        RETURNING *
        "#,
    )
    .bind(email)
    .bind(name)
    .fetch_one(pool)
    .await
}

/// Resolves the user for an OAuth identity:
/// an already linked account wins, then a user with the same email, then a new user.
/// `profile.email` is only present when the provider verified it, so an
/// unverified address always yields a new user.
pub async fn link_oauth_account(
    pool: &PgPool,
    provider: ProviderKind,
    profile: &OAuthProfile,
) -> Result<User, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let linked: Option<User> = sqlx::query_as(
        r#"
        SELECT u.*
        FROM accounts a
        JOIN users u ON u.id = a.user_id
        WHERE a.provider = $1 AND a.provider_account_id = $2
        "#,
    )
    .bind(provider.slug())
    .bind(&profile.provider_account_id)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(user) = linked {
        tx.commit().await?;
        return Ok(user);
    }

    let user: User = match &profile.email {
        Some(email) => {
            sqlx::query_as(
                r#"
                INSERT INTO users (name, email, image)
                VALUES ($1, $2, $3)
                ON CONFLICT (email) DO UPDATE
                    SET image = COALESCE(users.image, EXCLUDED.image),
                        updated_at = now()
                RETURNING *
                "#,
            )
            .bind(&profile.name)
            .bind(email)
            .bind(&profile.image)
            .fetch_one(&mut *tx)
            .await?
        }
        None => {
            sqlx::query_as("INSERT INTO users (name, image) VALUES ($1, $2) RETURNING *")
                .bind(&profile.name)
                .bind(&profile.image)
                .fetch_one(&mut *tx)
                .await?
        }
    };

    sqlx::query(
        "INSERT INTO accounts (user_id, provider, provider_account_id) VALUES ($1, $2, $3)",
    )
    .bind(user.id)
    .bind(provider.slug())
    .bind(&profile.provider_account_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        "Linked {} account {} to user {}",
        provider.slug(),
        profile.provider_account_id,
        user.id
    );
    Ok(user)
}
