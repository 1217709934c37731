use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::debug;
use uuid::Uuid;

use crate::auth::session::{token_from_headers, SessionClaims};
use crate::errors::AppError;
use crate::state::AppState;

/// The signed-in user. Rejects with 401 when no valid session is presented.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub claims: SessionClaims,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers).ok_or(AppError::Unauthorized)?;
        let claims = state.sessions.verify(token).map_err(|e| {
            debug!("Rejected session token: {e}");
            AppError::Unauthorized
        })?;

        Ok(AuthUser {
            id: claims.sub,
            claims,
        })
    }
}

/// Optional session for endpoints that personalize anonymous responses.
/// An invalid token is treated the same as no token.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthUser>);

impl MaybeUser {
    pub fn id(&self) -> Option<Uuid> {
        self.0.as_ref().map(|u| u.id)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(AuthUser::from_request_parts(parts, state).await.ok()))
    }
}
