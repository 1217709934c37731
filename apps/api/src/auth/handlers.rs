//! Axum route handlers for sign-in, sign-out and session inspection.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::{AppendHeaders, IntoResponse, Redirect},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::accounts::{link_oauth_account, upsert_credentials_user};
use crate::auth::extract::MaybeUser;
use crate::auth::oauth::OAuthError;
use crate::auth::session::{clear_cookie, read_cookie, set_cookie, SESSION_COOKIE};
use crate::errors::AppError;
use crate::models::user::UserSummary;
use crate::state::AppState;

const OAUTH_STATE_COOKIE: &str = "lazyprompt.oauth-state";
const OAUTH_STATE_TTL_SECS: i64 = 600;
const MAX_EMAIL_LEN: usize = 254;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub token: String,
    pub user: UserSummary,
    pub expires: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: UserSummary,
    pub expires: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ProviderInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub signin_url: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/auth/signin/credentials
///
/// Development-only sign-in by email. Disabled unless ENABLE_DEV_LOGIN is set.
pub async fn handle_credentials_signin(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !state.config.enable_dev_login {
        return Err(AppError::NotFound(
            "Credentials sign-in is disabled".to_string(),
        ));
    }

    let email = normalize_email(&req.email)?;
    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    let user = upsert_credentials_user(&state.db, &email, &name).await?;
    let user = UserSummary::from(user);
    let (token, claims) = state
        .sessions
        .issue(&user)
        .map_err(|e| AppError::Internal(e.into()))?;

    info!("Credentials sign-in for user {}", user.id);

    let cookie = session_cookie(&state, &token);
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(SignInResponse {
            token,
            user,
            expires: claims.expires_at(),
        }),
    ))
}

/// GET /api/auth/signin/:provider
///
/// Starts the OAuth flow: remembers a random state in a short-lived cookie and
/// redirects to the provider's consent screen.
pub async fn handle_oauth_signin(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let provider = state
        .oauth
        .get(&provider)
        .ok_or_else(|| AppError::NotFound(format!("Sign-in provider '{provider}' not found")))?;

    let nonce = Uuid::new_v4().simple().to_string();
    let cookie = set_cookie(
        OAUTH_STATE_COOKIE,
        &nonce,
        OAUTH_STATE_TTL_SECS,
        state.config.secure_cookies(),
    );

    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Redirect::to(&provider.authorize_url(&nonce)),
    ))
}

/// GET /api/auth/callback/:provider
///
/// Completes the OAuth flow, links or creates the user, and sets the session cookie.
pub async fn handle_oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let provider = state
        .oauth
        .get(&provider)
        .ok_or_else(|| AppError::NotFound(format!("Sign-in provider '{provider}' not found")))?;

    if let Some(error) = query.error {
        warn!("{} sign-in was refused: {error}", provider.kind.display_name());
        return Err(AppError::Unauthorized);
    }

    let expected_state = read_cookie(&headers, OAUTH_STATE_COOKIE).ok_or(AppError::Unauthorized)?;
    let (Some(code), Some(returned_state)) = (query.code, query.state) else {
        return Err(AppError::Unauthorized);
    };
    if returned_state != expected_state {
        warn!("OAuth state mismatch for {}", provider.kind.slug());
        return Err(AppError::Unauthorized);
    }

    let access_token = state
        .oauth
        .exchange_code(provider, &code)
        .await
        .map_err(oauth_failure)?;
    let profile = state
        .oauth
        .fetch_profile(provider, &access_token)
        .await
        .map_err(oauth_failure)?;

    let user = link_oauth_account(&state.db, provider.kind, &profile).await?;
    let (token, _) = state
        .sessions
        .issue(&UserSummary::from(user))
        .map_err(|e| AppError::Internal(e.into()))?;

    Ok((
        AppendHeaders([
            (header::SET_COOKIE, session_cookie(&state, &token)),
            (
                header::SET_COOKIE,
                clear_cookie(OAUTH_STATE_COOKIE, state.config.secure_cookies()),
            ),
        ]),
        Redirect::to("/"),
    ))
}

/// GET /api/auth/session
///
/// Returns the current session, or `null` when signed out.
pub async fn handle_session(user: MaybeUser) -> Json<Option<SessionResponse>> {
    Json(user.0.map(|u| SessionResponse {
        user: u.claims.user(),
        expires: u.claims.expires_at(),
    }))
}

/// POST /api/auth/signout
pub async fn handle_signout(State(state): State<AppState>) -> impl IntoResponse {
    (
        AppendHeaders([(
            header::SET_COOKIE,
            clear_cookie(SESSION_COOKIE, state.config.secure_cookies()),
        )]),
        Json(json!({ "success": true })),
    )
}

/// GET /api/auth/providers
pub async fn handle_providers(State(state): State<AppState>) -> Json<Vec<ProviderInfo>> {
    let mut providers: Vec<ProviderInfo> = state
        .oauth
        .enabled()
        .map(|kind| ProviderInfo {
            id: kind.slug(),
            name: kind.display_name(),
            signin_url: format!("/api/auth/signin/{}", kind.slug()),
        })
        .collect();

    if state.config.enable_dev_login {
        providers.push(ProviderInfo {
            id: "credentials",
            name: "Credentials",
            signin_url: "/api/auth/signin/credentials".to_string(),
        });
    }

    Json(providers)
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

fn session_cookie(state: &AppState, token: &str) -> String {
    set_cookie(
        SESSION_COOKIE,
        token,
        state.sessions.ttl().num_seconds(),
        state.config.secure_cookies(),
    )
}

fn oauth_failure(e: OAuthError) -> AppError {
    warn!("OAuth sign-in failed: {e}");
    AppError::Unauthorized
}

fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    let valid = email.len() <= MAX_EMAIL_LEN
        && matches!(
            email.split_once('@'),
            Some((local, domain)) if !local.is_empty() && domain.contains('.') && !domain.contains('@')
        );

    if valid {
        Ok(email)
    } else {
        Err(AppError::Validation("A valid email is required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email_trims_and_lowercases() {
        assert_eq!(
            normalize_email("  Test@Example.COM ").unwrap(),
            "test@example.com"
        );
    }

    #[test]
    fn test_normalize_email_rejects_invalid_addresses() {
        for raw in ["", "plainaddress", "@example.com", "a@b", "a@b@c.com"] {
            assert!(normalize_email(raw).is_err(), "{raw:?} should be rejected");
        }
    }
}
