//! Signed session tokens.
//!
//! Format: `base64url(header).base64url(claims).base64url(HMAC-SHA256)`, the
//! compact HS256 JWT layout. Tokens travel either as a bearer token or in the
//! `lazyprompt.session-token` cookie.

use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::user::UserSummary;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "lazyprompt.session-token";
const TOKEN_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("malformed session token")]
    Malformed,

    #[error("session token signature mismatch")]
    BadSignature,

    #[error("session token expired")]
    Expired,

    #[error("failed to encode session claims: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id.
    pub sub: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now)
    }

    pub fn user(&self) -> UserSummary {
        UserSummary {
            id: self.sub,
            name: self.name.clone(),
            email: self.email.clone(),
            image: self.image.clone(),
        }
    }
}

/// Issues and verifies session tokens with one shared secret.
#[derive(Clone)]
pub struct SessionKeys {
    secret: Arc<[u8]>,
    ttl: Duration,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            secret: Arc::from(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user: &UserSummary) -> Result<(String, SessionClaims), SessionError> {
        self.issue_at(user, Utc::now())
    }

    fn issue_at(
        &self,
        user: &UserSummary,
        now: DateTime<Utc>,
    ) -> Result<(String, SessionClaims), SessionError> {
        let claims = SessionClaims {
            sub: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            image: user.image.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        let header = URL_SAFE_NO_PAD.encode(TOKEN_HEADER);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signing_input = format!("{header}.{payload}");
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&signing_input).finalize().into_bytes());

        Ok((format!("{signing_input}.{signature}"), claims))
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionError> {
        self.verify_at(token, Utc::now())
    }

    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, SessionError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(SessionError::Malformed);
        };

        if header != URL_SAFE_NO_PAD.encode(TOKEN_HEADER) {
            return Err(SessionError::Malformed);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SessionError::Malformed)?;
        self.mac(&format!("{header}.{payload}"))
            .verify_slice(&signature)
            .map_err(|_| SessionError::BadSignature)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| SessionError::Malformed)?;
        let claims: SessionClaims =
            serde_json::from_slice(&payload).map_err(|_| SessionError::Malformed)?;

        if claims.exp <= now.timestamp() {
            return Err(SessionError::Expired);
        }
        Ok(claims)
    }

    fn mac(&self, signing_input: &str) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(signing_input.as_bytes());
        mac
    }
}

/// Bearer token wins over the session cookie.
pub fn token_from_headers(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    bearer.or_else(|| read_cookie(headers, SESSION_COOKIE))
}

pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
}

pub fn set_cookie(name: &str, value: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie =
        format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_cookie(name: &str, secure: bool) -> String {
    set_cookie(name, "", 0, secure)
}
