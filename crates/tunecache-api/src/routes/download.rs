//! `GET|POST /download`: make sure the audio for a source URL is cached
//! and return its stream path.
//!
//! The URL comes from the `url` query parameter or, for POST, a JSON body
//! `{"url": ...}`. The query parameter wins when both are present. A body
//! that is missing or not JSON is treated as empty.

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::routes::TrackMetadataView;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/download", get(download_get).post(download_post))
}

/// Source URL, from the query string or a JSON body.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    /// Stream path, e.g. `/stream/<uuid>.mp3`.
    pub file: String,
    pub metadata: TrackMetadataView,
    /// True if served from cache without downloading.
    pub cached: bool,
    /// Cache key of the source.
    pub video_id: String,
}

#[utoipa::path(
    get,
    path = "/download",
    params(
        ("url" = String, Query, description = "Source URL to fetch")
    ),
    responses(
        (status = 200, description = "Audio is cached", body = DownloadResponse),
        (status = 400, description = "No URL provided", body = crate::error::ErrorBody),
        (status = 500, description = "Resolution or download failed", body = crate::error::ErrorBody),
    ),
    tag = "cache"
)]
pub async fn download_get(
    State(state): State<AppState>,
    query: Result<Query<DownloadRequest>, QueryRejection>,
) -> Result<Json<DownloadResponse>, AppError> {
    let query = extract_query(query)?;
    download(&state, query.url).await
}

#[utoipa::path(
    post,
    path = "/download",
    params(
        ("url" = Option<String>, Query, description = "Source URL; takes precedence over the body")
    ),
    request_body(content = DownloadRequest, description = "Source URL", content_type = "application/json"),
    responses(
        (status = 200, description = "Audio is cached", body = DownloadResponse),
        (status = 400, description = "No URL provided", body = crate::error::ErrorBody),
        (status = 500, description = "Resolution or download failed", body = crate::error::ErrorBody),
    ),
    tag = "cache"
)]
pub async fn download_post(
    State(state): State<AppState>,
    query: Result<Query<DownloadRequest>, QueryRejection>,
    body: Bytes,
) -> Result<Json<DownloadResponse>, AppError> {
    let query = extract_query(query)?;
    let url = query.url.or_else(|| {
        serde_json::from_slice::<DownloadRequest>(&body)
            .ok()
            .and_then(|b| b.url)
    });
    download(&state, url).await
}

/// Unwrap the query string, turning a malformed one into a structured 400.
fn extract_query(
    query: Result<Query<DownloadRequest>, QueryRejection>,
) -> Result<DownloadRequest, AppError> {
    query
        .map(|Query(q)| q)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

async fn download(state: &AppState, url: Option<String>) -> Result<Json<DownloadResponse>, AppError> {
    let url = url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::BadRequest("No URL provided".to_string()))?;

    let cached = match state.coordinator.ensure_cached(&url).await {
        Ok(cached) => cached,
        Err(e) => {
            state.metrics.record_fetch_failure();
            return Err(e.into());
        }
    };

    if cached.was_cached {
        state.metrics.record_cache_hit();
        tracing::info!(key = %cached.key, "Cache hit");
    } else {
        state.metrics.record_cache_miss();
        tracing::info!(key = %cached.key, title = %cached.entry.metadata.title, "Downloaded");
    }

    Ok(Json(DownloadResponse {
        file: cached.entry.stream_path(),
        metadata: TrackMetadataView::from(&cached.entry.metadata),
        cached: cached.was_cached,
        video_id: cached.key.to_string(),
    }))
}
