pub mod health;
pub mod models;

use axum::{
    routing::{get, post},
    Router,
};

use crate::auth::handlers as auth;
use crate::categories::handlers as categories;
use crate::prompts::{handlers as prompts, run};
use crate::purchases::handlers as purchases;
use crate::search::handlers as search;
use crate::state::AppState;
use crate::users::handlers as users;
use crate::votes::handlers as votes;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Auth
        .route(
            "/api/auth/signin/credentials",
            post(auth::handle_credentials_signin),
        )
        .route("/api/auth/signin/:provider", get(auth::handle_oauth_signin))
        .route(
            "/api/auth/callback/:provider",
            get(auth::handle_oauth_callback),
        )
        .route("/api/auth/session", get(auth::handle_session))
        .route("/api/auth/signout", post(auth::handle_signout))
        .route("/api/auth/providers", get(auth::handle_providers))
        // Marketplace
        .route(
            "/api/categories",
            get(categories::handle_list_categories).post(categories::handle_create_category),
        )
        .route(
            "/api/prompts",
            get(prompts::handle_list_prompts).post(prompts::handle_create_prompt),
        )
        .route(
            "/api/prompts/:id",
            get(prompts::handle_get_prompt)
                .patch(prompts::handle_update_prompt)
                .delete(prompts::handle_delete_prompt),
        )
        .route(
            "/api/prompts/:id/vote",
            get(votes::handle_vote_status).post(votes::handle_vote),
        )
        .route(
            "/api/prompts/:id/run",
            get(run::handle_run_preview).post(run::handle_run_prompt),
        )
        .route(
            "/api/purchases",
            get(purchases::handle_list_purchases).post(purchases::handle_create_purchase),
        )
        .route(
            "/api/search",
            get(search::handle_search).post(search::handle_log_search),
        )
        .route(
            "/api/user/profile",
            get(users::handle_get_profile).patch(users::handle_update_profile),
        )
        .route("/api/models", get(models::handle_list_models))
        .with_state(state)
}
