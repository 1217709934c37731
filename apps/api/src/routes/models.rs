use axum::{extract::State, Json};
use serde::Serialize;

use crate::ai::{ModelInfo, SUPPORTED_MODELS};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ModelEntry {
    #[serde(flatten)]
    pub info: ModelInfo,
    /// Whether a provider for this model is configured on this deployment.
    pub available: bool,
}

/// GET /api/models
pub async fn handle_list_models(State(state): State<AppState>) -> Json<Vec<ModelEntry>> {
    Json(
        SUPPORTED_MODELS
            .iter()
            .map(|info| ModelEntry {
                info: *info,
                available: state.ai.is_available(info.id),
            })
            .collect(),
    )
}
