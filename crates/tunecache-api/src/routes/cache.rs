//! Cache enumeration and explicit eviction.
//!
//! - `GET /cache`: every entry, oldest first, with whether its file exists.
//! - `DELETE /cache/:video_id`: remove the artifact file, then the entry.

use axum::extract::{Path, State};
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::routes::path_key;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cache", get(list_cache))
        .route("/cache/:video_id", delete(delete_cached))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CacheItem {
    pub video_id: String,
    pub title: String,
    pub downloaded_at: DateTime<Utc>,
    /// Whether the artifact is still on disk.
    pub file_exists: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CacheListing {
    /// Number of entries.
    pub cached: usize,
    pub items: Vec<CacheItem>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteResponse {
    /// Key of the evicted entry.
    pub deleted: String,
}

#[utoipa::path(
    get,
    path = "/cache",
    responses(
        (status = 200, description = "All cache entries", body = CacheListing),
    ),
    tag = "cache"
)]
pub async fn list_cache(State(state): State<AppState>) -> Json<CacheListing> {
    let items: Vec<CacheItem> = state
        .index
        .snapshot_all()
        .into_iter()
        .map(|(key, entry)| CacheItem {
            file_exists: state.artifacts.exists(entry.artifact_path()),
            video_id: key.to_string(),
            title: entry.metadata.title,
            downloaded_at: entry.fetched_at,
        })
        .collect();
    Json(CacheListing {
        cached: items.len(),
        items,
    })
}

#[utoipa::path(
    delete,
    path = "/cache/{video_id}",
    params(
        ("video_id" = String, Path, description = "Cache key to evict")
    ),
    responses(
        (status = 200, description = "Entry and artifact removed", body = DeleteResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 500, description = "Artifact or index could not be updated", body = crate::error::ErrorBody),
    ),
    tag = "cache"
)]
pub async fn delete_cached(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let not_found = || AppError::NotFound("Not found".to_string());
    let key = path_key(&video_id).ok_or_else(not_found)?;

    let index = state.index.clone();
    let artifacts = state.artifacts.clone();
    let evict_key = key.clone();
    let evicted = tokio::task::spawn_blocking(move || index.evict(&evict_key, &artifacts))
        .await
        .map_err(|e| AppError::Internal(format!("eviction task failed: {e}")))??;

    match evicted {
        Some(_) => Ok(Json(DeleteResponse {
            deleted: key.to_string(),
        })),
        None => Err(not_found()),
    }
}
