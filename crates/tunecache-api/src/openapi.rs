//! # OpenAPI Specification Assembly
//!
//! Collects the utoipa-documented handlers into one OpenAPI document,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "tunecache",
        description = "Local audio cache in front of a media fetcher: resolve a source URL, cache its transcoded audio, and stream it with byte-range support.",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:5000", description = "Local development server"),
    ),
    paths(
        crate::routes::health::health,
        crate::routes::download::download_get,
        crate::routes::download::download_post,
        crate::routes::stream::stream_artifact,
        crate::routes::metadata::get_metadata,
        crate::routes::cache::list_cache,
        crate::routes::cache::delete_cached,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::routes::TrackMetadataView,
            crate::routes::health::HealthResponse,
            crate::routes::download::DownloadRequest,
            crate::routes::download::DownloadResponse,
            crate::routes::metadata::MetadataResponse,
            crate::routes::cache::CacheItem,
            crate::routes::cache::CacheListing,
            crate::routes::cache::DeleteResponse,
        ),
    ),
    tags(
        (name = "health", description = "Service status"),
        (name = "cache", description = "Download into the cache, inspect it, and evict entries"),
        (name = "stream", description = "Range-aware audio delivery"),
    )
)]
pub struct ApiDoc;

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
