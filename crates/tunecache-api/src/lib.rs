//! # tunecache-api — HTTP Service
//!
//! Axum front end for the audio cache.
//!
//! ## API Surface
//!
//! | Method/Path                | Module                    |
//! |----------------------------|---------------------------|
//! | `GET /health`              | [`routes::health`]        |
//! | `GET\|POST /download`      | [`routes::download`]      |
//! | `GET /stream/:filename`    | [`routes::stream`]        |
//! | `GET /metadata/:video_id`  | [`routes::metadata`]      |
//! | `GET /cache`               | [`routes::cache`]         |
//! | `DELETE /cache/:video_id`  | [`routes::cache`]         |
//! | `GET /metrics`             | Prometheus text format    |
//! | `GET /openapi.json`        | [`openapi`]               |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! CorsLayer → TraceLayer → MetricsMiddleware → Handler
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod streaming;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assemble the application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let metrics = state.metrics.clone();

    Router::new()
        .merge(routes::health::router())
        .merge(routes::download::router())
        .merge(routes::stream::router())
        .merge(routes::metadata::router())
        .merge(routes::cache::router())
        .merge(openapi::router())
        .route("/metrics", get(prometheus_metrics))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(Extension(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /metrics: refresh cache gauges, then encode every metric in
/// Prometheus text exposition format.
async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = &state.metrics;
    let sweeps = state.sweep_stats();
    metrics.cache_entries().set(state.index.len() as i64);
    metrics
        .fetches_in_flight()
        .set(state.coordinator.in_flight() as i64);
    metrics.sweep_runs().set(sweeps.runs() as i64);
    metrics.sweep_removed_entries().set(sweeps.removed() as i64);
    metrics.sweep_failed_entries().set(sweeps.failed() as i64);

    match metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode Prometheus metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e).into_response()
        }
    }
}
