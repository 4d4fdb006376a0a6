//! `GET /metadata/:video_id`: cached metadata for one key.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::routes::{path_key, TrackMetadataView};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/metadata/:video_id", get(get_metadata))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetadataResponse {
    pub video_id: String,
    pub metadata: TrackMetadataView,
    /// Stream path of the artifact.
    pub file: String,
    pub downloaded_at: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/metadata/{video_id}",
    params(
        ("video_id" = String, Path, description = "Cache key of the source")
    ),
    responses(
        (status = 200, description = "Cached metadata", body = MetadataResponse),
        (status = 404, description = "Not in cache", body = crate::error::ErrorBody),
    ),
    tag = "cache"
)]
pub async fn get_metadata(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Json<MetadataResponse>, AppError> {
    let not_cached = || AppError::NotFound("Not in cache".to_string());
    let key = path_key(&video_id).ok_or_else(not_cached)?;
    let entry = state.index.lookup(&key).ok_or_else(not_cached)?;

    Ok(Json(MetadataResponse {
        video_id: key.to_string(),
        metadata: TrackMetadataView::from(&entry.metadata),
        file: entry.stream_path(),
        downloaded_at: entry.fetched_at,
    }))
}
