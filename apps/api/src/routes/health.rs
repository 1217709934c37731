use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
}

/// GET /health
///
/// Liveness only: answers without touching Postgres or Redis.
pub async fn health_handler() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        service: "lazyprompt-api",
    })
}
