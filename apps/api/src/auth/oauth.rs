//! OAuth sign-in against GitHub and Google (authorization code flow).

use std::time::Duration;

use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;

use crate::config::{Config, OAuthCredentials};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} token exchange failed: {message}")]
    TokenExchange {
        provider: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    GitHub,
    Google,
}

impl ProviderKind {
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "github" => Some(Self::GitHub),
            "google" => Some(Self::Google),
            _ => None,
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::Google => "google",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::GitHub => "GitHub",
            Self::Google => "Google",
        }
    }

    fn authorize_endpoint(self) -> &'static str {
        match self {
            Self::GitHub => "https://github.com/login/oauth/authorize",
            Self::Google => "https://accounts.google.com/o/oauth2/v2/auth",
        }
    }

    fn token_endpoint(self) -> &'static str {
        match self {
            Self::GitHub => "https://github.com/login/oauth/access_token",
            Self::Google => "https://oauth2.googleapis.com/token",
        }
    }

    fn profile_endpoint(self) -> &'static str {
        match self {
            Self::GitHub => "https://api.github.com/user",
            Self::Google => "https://openidconnect.googleapis.com/v1/userinfo",
        }
    }

    fn scope(self) -> &'static str {
        match self {
            Self::GitHub => "read:user user:email",
            Self::Google => "openid email profile",
        }
    }
}

/// Identity returned by a provider after a successful sign-in.
///
/// `email` is set only when the provider vouches for the address, and is
/// lowercased. It is the only key used to attach a sign-in to an existing user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProfile {
    pub provider_account_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
}

fn normalized_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    (!email.is_empty()).then_some(email)
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    name: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// GitHub's public profile email is not guaranteed verified, so only the
/// verified primary address from `/user/emails` is trusted.
fn github_profile(user: GitHubUser, emails: &[GitHubEmail]) -> OAuthProfile {
    OAuthProfile {
        provider_account_id: user.id.to_string(),
        name: user.name.or(Some(user.login)),
        email: emails
            .iter()
            .find(|e| e.primary && e.verified)
            .and_then(|e| normalized_email(&e.email)),
        image: user.avatar_url,
    }
}

#[derive(Debug, Deserialize)]
struct GoogleUser {
    sub: String,
    name: Option<String>,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    picture: Option<String>,
}

impl From<GoogleUser> for OAuthProfile {
    fn from(user: GoogleUser) -> Self {
        let email = if user.email_verified {
            user.email.as_deref().and_then(normalized_email)
        } else {
            None
        };
        Self {
            provider_account_id: user.sub,
            name: user.name,
            email,
            image: user.picture,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OAuthProvider {
    pub kind: ProviderKind,
    credentials: OAuthCredentials,
    redirect_uri: String,
    token_url: String,
    profile_url: String,
}

impl OAuthProvider {
    fn new(kind: ProviderKind, credentials: OAuthCredentials, public_url: &str) -> Self {
        Self {
            kind,
            credentials,
            redirect_uri: format!("{public_url}/api/auth/callback/{}", kind.slug()),
            token_url: kind.token_endpoint().to_string(),
            profile_url: kind.profile_endpoint().to_string(),
        }
    }

    #[cfg(test)]
    fn with_api_base(mut self, base: &str) -> Self {
        self.token_url = format!("{base}/token");
        self.profile_url = format!("{base}/user");
        self
    }

    pub fn authorize_url(&self, state: &str) -> String {
        let mut params = vec![
            ("client_id", self.credentials.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("scope", self.kind.scope()),
            ("state", state),
        ];
        if self.kind == ProviderKind::Google {
            params.push(("response_type", "code"));
        }

        Url::parse_with_params(self.kind.authorize_endpoint(), &params)
            .map(String::from)
            .unwrap_or_else(|_| self.kind.authorize_endpoint().to_string())
    }
}

/// Configured OAuth providers plus the HTTP client used to talk to them.
#[derive(Clone)]
pub struct OAuthClients {
    http: Client,
    providers: Vec<OAuthProvider>,
}

impl OAuthClients {
    pub fn from_config(config: &Config) -> Self {
        let providers = [
            (ProviderKind::GitHub, &config.github),
            (ProviderKind::Google, &config.google),
        ]
        .into_iter()
        .filter_map(|(kind, creds)| {
            creds
                .clone()
                .map(|c| OAuthProvider::new(kind, c, &config.public_url))
        })
        .collect();

        Self {
            http: http_client(REQUEST_TIMEOUT),
            providers,
        }
    }

    pub fn get(&self, slug: &str) -> Option<&OAuthProvider> {
        let kind = ProviderKind::from_slug(slug)?;
        self.providers.iter().find(|p| p.kind == kind)
    }

    pub fn enabled(&self) -> impl Iterator<Item = ProviderKind> + '_ {
        self.providers.iter().map(|p| p.kind)
    }

    /// Trades an authorization code for an access token.
    pub async fn exchange_code(
        &self,
        provider: &OAuthProvider,
        code: &str,
    ) -> Result<String, OAuthError> {
        let form = [
            ("client_id", provider.credentials.client_id.as_str()),
            ("client_secret", provider.credentials.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", provider.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response: TokenResponse = self
            .http
            .post(provider.token_url.as_str())
            .header("accept", "application/json")
            .form(&form)
            .send()
            .await?
            .json()
            .await?;

        response.access_token.ok_or_else(|| OAuthError::TokenExchange {
            provider: provider.kind.display_name(),
            message: response
                .error_description
                .or(response.error)
                .unwrap_or_else(|| "no access token returned".to_string()),
        })
    }

    pub async fn fetch_profile(
        &self,
        provider: &OAuthProvider,
        access_token: &str,
    ) -> Result<OAuthProfile, OAuthError> {
        let profile = match provider.kind {
            ProviderKind::GitHub => {
                let user: GitHubUser = self.get_json(&provider.profile_url, access_token).await?;
                let emails: Vec<GitHubEmail> = self
                    .get_json(&format!("{}/emails", provider.profile_url), access_token)
                    .await?;
                github_profile(user, &emails)
            }
            ProviderKind::Google => self
                .get_json::<GoogleUser>(&provider.profile_url, access_token)
                .await?
                .into(),
        };
        Ok(profile)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, OAuthError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            // GitHub rejects requests without a user agent.
            .header("user-agent", "lazyprompt-api")
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .expect("Failed to build HTTP client")
}
