//! # Prometheus Metrics
//!
//! HTTP-level metrics (request counts, latency, errors) are recorded by
//! [`metrics_middleware`]. Cache outcome counters are pushed by the
//! download handler. Cache gauges (entries, in-flight fetches, sweep
//! totals) are refreshed on each `/metrics` scrape.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use prometheus::core::Collector;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Shared metrics state backed by a Prometheus registry.
#[derive(Clone)]
pub struct ApiMetrics {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,

    // HTTP middleware metrics
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_errors_total: IntCounterVec,

    // Cache outcomes
    cache_requests_total: IntCounterVec,
    fetch_failures_total: IntCounter,

    // Refreshed on scrape
    cache_entries: IntGauge,
    fetches_in_flight: IntGauge,
    sweep_runs: IntGauge,
    sweep_removed_entries: IntGauge,
    sweep_failed_entries: IntGauge,
}

impl std::fmt::Debug for ApiMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiMetrics")
            .field("requests", &self.requests())
            .field("errors", &self.errors())
            .finish()
    }
}

fn register<C: Collector + Clone + 'static>(registry: &Registry, collector: C) -> C {
    registry
        .register(Box::new(collector.clone()))
        .expect("metric can be registered");
    collector
}

impl ApiMetrics {
    /// Create a metrics instance with a fresh Prometheus registry.
    pub fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new("tunecache_http_requests_total", "Total HTTP requests"),
                &["method", "path", "status"],
            )
            .expect("metric can be created"),
        );
        let http_request_duration_seconds = register(
            &registry,
            HistogramVec::new(
                HistogramOpts::new(
                    "tunecache_http_request_duration_seconds",
                    "HTTP request duration in seconds",
                )
                .buckets(vec![
                    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0,
                ]),
                &["method", "path"],
            )
            .expect("metric can be created"),
        );
        let http_errors_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new("tunecache_http_errors_total", "Total HTTP errors (4xx and 5xx)"),
                &["method", "path", "status"],
            )
            .expect("metric can be created"),
        );
        let cache_requests_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new("tunecache_cache_requests_total", "Download requests by cache outcome"),
                &["result"],
            )
            .expect("metric can be created"),
        );
        let fetch_failures_total = register(
            &registry,
            IntCounter::new("tunecache_fetch_failures_total", "Failed downloads")
                .expect("metric can be created"),
        );
        let cache_entries = register(
            &registry,
            IntGauge::new("tunecache_cache_entries", "Entries in the cache index")
                .expect("metric can be created"),
        );
        let fetches_in_flight = register(
            &registry,
            IntGauge::new("tunecache_fetches_in_flight", "Downloads currently running")
                .expect("metric can be created"),
        );
        let sweep_runs = register(
            &registry,
            IntGauge::new("tunecache_sweep_runs", "Completed retention sweeps")
                .expect("metric can be created"),
        );
        let sweep_removed_entries = register(
            &registry,
            IntGauge::new(
                "tunecache_sweep_removed_entries",
                "Entries evicted by retention sweeps",
            )
            .expect("metric can be created"),
        );
        let sweep_failed_entries = register(
            &registry,
            IntGauge::new(
                "tunecache_sweep_failed_entries",
                "Expired entries skipped because their artifact could not be deleted",
            )
            .expect("metric can be created"),
        );

        Self {
            inner: Arc::new(Inner {
                registry,
                http_requests_total,
                http_request_duration_seconds,
                http_errors_total,
                cache_requests_total,
                fetch_failures_total,
                cache_entries,
                fetches_in_flight,
                sweep_runs,
                sweep_removed_entries,
                sweep_failed_entries,
            }),
        }
    }

    /// Total request count across all labels.
    pub fn requests(&self) -> u64 {
        sum_counters(&self.inner.http_requests_total)
    }

    /// Total error count across all labels.
    pub fn errors(&self) -> u64 {
        sum_counters(&self.inner.http_errors_total)
    }

    fn record_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.inner
            .http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();

        self.inner
            .http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);

        if status >= 400 {
            self.inner
                .http_errors_total
                .with_label_values(&[method, path, &status_str])
                .inc();
        }
    }

    pub fn record_cache_hit(&self) {
        self.inner.cache_requests_total.with_label_values(&["hit"]).inc();
    }

    pub fn record_cache_miss(&self) {
        self.inner.cache_requests_total.with_label_values(&["miss"]).inc();
    }

    pub fn record_fetch_failure(&self) {
        self.inner.fetch_failures_total.inc();
    }

    pub fn cache_hits(&self) -> u64 {
        self.inner.cache_requests_total.with_label_values(&["hit"]).get()
    }

    pub fn cache_misses(&self) -> u64 {
        self.inner.cache_requests_total.with_label_values(&["miss"]).get()
    }

    pub fn fetch_failures(&self) -> u64 {
        self.inner.fetch_failures_total.get()
    }

    pub fn cache_entries(&self) -> &IntGauge {
        &self.inner.cache_entries
    }

    pub fn fetches_in_flight(&self) -> &IntGauge {
        &self.inner.fetches_in_flight
    }

    pub fn sweep_runs(&self) -> &IntGauge {
        &self.inner.sweep_runs
    }

    pub fn sweep_removed_entries(&self) -> &IntGauge {
        &self.inner.sweep_removed_entries
    }

    pub fn sweep_failed_entries(&self) -> &IntGauge {
        &self.inner.sweep_failed_entries
    }

    /// Gather all metrics and encode to Prometheus text format.
    pub fn gather_and_encode(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| format!("failed to encode metrics: {e}"))?;
        String::from_utf8(buffer).map_err(|e| format!("metrics encoding produced invalid UTF-8: {e}"))
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn sum_counters(counter: &IntCounterVec) -> u64 {
    counter
        .collect()
        .iter()
        .flat_map(|mf| mf.get_metric())
        .map(|m| m.get_counter().get_value() as u64)
        .sum()
}

/// Collapse per-artifact and per-key path segments so label cardinality
/// stays bounded. Paths outside the route table share one label.
fn normalize_path(path: &str) -> String {
    const EXACT: [&str; 6] = ["/health", "/download", "/cache", "/metrics", "/openapi.json", "/"];
    const PREFIXES: [(&str, &str); 3] = [
        ("/stream/", "/stream/{filename}"),
        ("/metadata/", "/metadata/{video_id}"),
        ("/cache/", "/cache/{video_id}"),
    ];

    if EXACT.contains(&path) {
        return path.to_string();
    }
    PREFIXES
        .iter()
        .find(|(prefix, _)| path.starts_with(prefix))
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| "{unmatched}".to_string())
}

/// Middleware that records HTTP request metrics via Prometheus.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let metrics = request.extensions().get::<ApiMetrics>().cloned();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());
    let start = Instant::now();

    let response = next.run(request).await;

    if let Some(m) = metrics {
        let duration = start.elapsed().as_secs_f64();
        let status = response.status().as_u16();
        m.record_request(&method, &path, status, duration);
    }

    response
}
