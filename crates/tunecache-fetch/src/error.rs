//! Fetch error types.

use std::time::Duration;

use thiserror::Error;
use tunecache_core::CacheKey;

/// Failure reported by a [`MediaFetcher`](crate::MediaFetcher) implementation.
#[derive(Error, Debug, Clone)]
pub enum FetcherError {
    /// The fetch program could not be started.
    #[error("failed to launch {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// The fetch program exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    /// The fetch program produced output that could not be interpreted.
    #[error("unexpected output from {program}: {reason}")]
    Output { program: String, reason: String },

    /// The source is not supported or does not exist.
    #[error("unsupported source: {0}")]
    Unsupported(String),
}

/// Errors from [`FetchCoordinator`](crate::FetchCoordinator) operations.
///
/// `Clone` so that one fetch outcome can be handed to every caller waiting
/// on the same key.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// The source URL could not be mapped to a cache key.
    #[error("could not resolve {url}: {reason}")]
    Resolution { url: String, reason: String },

    /// Download or transcode failed.
    #[error("fetch failed for {key}: {reason}")]
    Fetch { key: CacheKey, reason: String },

    /// The fetch did not finish within the configured bound.
    #[error("fetch for {key} timed out after {after:?}")]
    Timeout { key: CacheKey, after: Duration },

    /// The fetch task ended without producing an outcome.
    #[error("fetch task for {key} aborted: {reason}")]
    Aborted { key: CacheKey, reason: String },
}
