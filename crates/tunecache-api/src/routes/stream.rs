//! `GET /stream/:filename`: serve an artifact, honoring `Range`.

use axum::extract::{Path, State};
use axum::http::header::RANGE;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::Router;

use crate::error::AppError;
use crate::state::AppState;
use crate::streaming::StreamResponse;

pub fn router() -> Router<AppState> {
    Router::new().route("/stream/:filename", get(stream_artifact))
}

#[utoipa::path(
    get,
    path = "/stream/{filename}",
    params(
        ("filename" = String, Path, description = "Artifact file name, e.g. `<uuid>.mp3`"),
        ("Range" = Option<String>, Header, description = "Single byte range, e.g. `bytes=1000-`")
    ),
    responses(
        (status = 200, description = "Whole artifact (audio/mpeg)"),
        (status = 206, description = "Requested byte range (audio/mpeg)"),
        (status = 403, description = "File name escapes the artifact directory", body = crate::error::ErrorBody),
        (status = 404, description = "No such artifact", body = crate::error::ErrorBody),
        (status = 416, description = "Range starts past the end of the artifact"),
    ),
    tag = "stream"
)]
pub async fn stream_artifact(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Result<StreamResponse, AppError> {
    let range = headers.get(RANGE).and_then(|v| v.to_str().ok());
    Ok(state.streamer.serve(&filename, range).await?)
}
