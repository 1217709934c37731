mod ai;
mod auth;
mod categories;
mod config;
mod db;
mod errors;
mod models;
mod prompts;
mod purchases;
mod rate_limit;
mod routes;
mod search;
mod state;
mod users;
mod votes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::ai::AiService;
use crate::auth::oauth::OAuthClients;
use crate::auth::session::SessionKeys;
use crate::config::Config;
use crate::db::{create_pool, run_migrations};
use crate::rate_limit::{DisabledRateLimiter, RateLimiter, RedisRateLimiter};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},tower_http=info",
                env!("CARGO_CRATE_NAME"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting LazyPrompt API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL and bring the schema up to date
    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;

    let rate_limiter = build_rate_limiter(&config)?;
    let ai = Arc::new(AiService::from_config(&config));

    let oauth = OAuthClients::from_config(&config);
    info!(
        "Sign-in providers: {:?} (dev login: {})",
        oauth.enabled().map(|p| p.slug()).collect::<Vec<_>>(),
        config.enable_dev_login
    );

    let state = AppState {
        db,
        sessions: SessionKeys::new(&config.session_secret, config.session_ttl_hours),
        oauth,
        ai,
        rate_limiter,
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Redis-backed sliding window when REDIS_URL is set, otherwise no limiting.
fn build_rate_limiter(config: &Config) -> Result<Arc<dyn RateLimiter>> {
    let Some(url) = &config.redis_url else {
        info!("REDIS_URL not set, prompt runs are not rate limited");
        return Ok(Arc::new(DisabledRateLimiter));
    };

    let client = redis::Client::open(url.as_str())?;
    info!(
        "Rate limiting prompt runs to {} per {}s",
        config.rate_limit_requests, config.rate_limit_window_secs
    );
    Ok(Arc::new(RedisRateLimiter::new(
        client,
        config.rate_limit_requests,
        Duration::from_secs(config.rate_limit_window_secs),
    )))
}
