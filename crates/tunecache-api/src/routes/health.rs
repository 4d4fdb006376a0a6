//! `GET /health`: liveness plus a summary of the cache.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `ok` while the process is serving.
    pub status: String,
    /// Artifact directory.
    pub audio_dir: String,
    /// Entries in the cache index.
    pub cached_count: usize,
    /// Retention window in hours.
    pub cleanup_hours: u64,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
    ),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        audio_dir: state.artifacts.dir().display().to_string(),
        cached_count: state.index.len(),
        cleanup_hours: state.config.cleanup_hours,
    })
}
