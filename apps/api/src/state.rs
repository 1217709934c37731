use std::sync::Arc;

use sqlx::PgPool;

use crate::ai::AiService;
use crate::auth::oauth::OAuthClients;
use crate::auth::session::SessionKeys;
use crate::config::Config;
use crate::rate_limit::RateLimiter;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub sessions: SessionKeys,
    pub oauth: OAuthClients,
    /// Model-name keyed AI providers. Built once at startup from the configured vendor keys.
    pub ai: Arc<AiService>,
    /// Pluggable limiter. Redis-backed when REDIS_URL is set, otherwise always allows.
    pub rate_limiter: Arc<dyn RateLimiter>,
}

#[cfg(test)]
impl AppState {
    /// State over a lazily connected pool: handlers that reject before
    /// touching the database can be exercised without Postgres.
    pub fn for_tests(config: Config) -> Self {
        let db = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .expect("lazy pool accepts a well-formed URL");

        AppState {
            db,
            sessions: SessionKeys::new(&config.session_secret, config.session_ttl_hours),
            oauth: OAuthClients::from_config(&config),
            ai: Arc::new(AiService::from_config(&config)),
            rate_limiter: Arc::new(crate::rate_limit::DisabledRateLimiter),
            config,
        }
    }
}
