//! # Range Streaming
//!
//! Serves stored artifacts with single-range HTTP semantics so players can
//! seek. [`parse_range`] decides what to send; [`RangeStreamer::serve`]
//! opens and positions the file; [`StreamResponse`] turns the result into
//! an HTTP response whose body is streamed from disk.
//!
//! | Request `Range`        | Outcome                                  |
//! |------------------------|------------------------------------------|
//! | absent                 | 200, whole file                          |
//! | `bytes=S-` / `bytes=S-E` | 206, `[S, min(E, size-1)]`             |
//! | `bytes=-N`             | 206, last `N` bytes                      |
//! | `S >= size`            | 416, `Content-Range: bytes */size`       |
//! | anything unparseable   | 200, whole file                          |

use std::io::{ErrorKind, SeekFrom};
use std::path::PathBuf;

use axum::body::Body;
use axum::http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use tunecache_store::{ArtifactStore, StoreError};

/// Inclusive byte range within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// What to send for a given `Range` header and file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    Full,
    Partial(ByteRange),
    Unsatisfiable,
}

/// Interpret a `Range` header against a file of `size` bytes.
///
/// Only a single `bytes` range is honored. Malformed headers fall back to
/// [`RangeOutcome::Full`] so playback still works without seeking.
pub fn parse_range(header: Option<&str>, size: u64) -> RangeOutcome {
    let Some(header) = header else {
        return RangeOutcome::Full;
    };
    let Some((unit, spec)) = header.trim().split_once('=') else {
        return RangeOutcome::Full;
    };
    if !unit.trim().eq_ignore_ascii_case("bytes") || spec.contains(',') {
        return RangeOutcome::Full;
    }
    let Some((start, end)) = spec.split_once('-') else {
        return RangeOutcome::Full;
    };
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        let Ok(suffix) = end.parse::<u64>() else {
            return RangeOutcome::Full;
        };
        if suffix == 0 || size == 0 {
            return RangeOutcome::Unsatisfiable;
        }
        return RangeOutcome::Partial(ByteRange {
            start: size.saturating_sub(suffix),
            end: size - 1,
        });
    }

    let Ok(start) = start.parse::<u64>() else {
        return RangeOutcome::Full;
    };
    let end = if end.is_empty() {
        None
    } else {
        match end.parse::<u64>() {
            Ok(end) if end >= start => Some(end),
            _ => return RangeOutcome::Full,
        }
    };
    if start >= size {
        return RangeOutcome::Unsatisfiable;
    }
    let last = size - 1;
    RangeOutcome::Partial(ByteRange {
        start,
        end: end.map_or(last, |e| e.min(last)),
    })
}

#[derive(Error, Debug)]
pub enum StreamError {
    /// The name tried to escape the artifact directory.
    #[error("forbidden file name {0:?}")]
    Forbidden(String),

    /// No artifact with that name.
    #[error("artifact {0:?} not found")]
    NotFound(String),

    #[error("failed to read artifact {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// An opened artifact ready to be sent.
#[derive(Debug)]
pub struct StreamResponse {
    file: File,
    size: u64,
    mime_type: &'static str,
    outcome: RangeOutcome,
}

impl StreamResponse {
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn outcome(&self) -> RangeOutcome {
        self.outcome
    }
}

impl IntoResponse for StreamResponse {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(self.mime_type));
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));

        let (status, body, content_range) = match self.outcome {
            RangeOutcome::Full => {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(self.size));
                (
                    StatusCode::OK,
                    Body::from_stream(ReaderStream::new(self.file)),
                    None,
                )
            }
            RangeOutcome::Partial(range) => {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(range.len()));
                (
                    StatusCode::PARTIAL_CONTENT,
                    Body::from_stream(ReaderStream::new(self.file.take(range.len()))),
                    Some(format!("bytes {}-{}/{}", range.start, range.end, self.size)),
                )
            }
            RangeOutcome::Unsatisfiable => {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(0u64));
                (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    Body::empty(),
                    Some(format!("bytes */{}", self.size)),
                )
            }
        };
        if let Some(value) = content_range.and_then(|v| HeaderValue::from_str(&v).ok()) {
            headers.insert(CONTENT_RANGE, value);
        }

        (status, headers, body).into_response()
    }
}

/// Serves artifacts from an [`ArtifactStore`] by public file name.
#[derive(Debug, Clone)]
pub struct RangeStreamer {
    artifacts: ArtifactStore,
}

impl RangeStreamer {
    pub fn new(artifacts: ArtifactStore) -> Self {
        Self { artifacts }
    }

    /// Open `file_name` and position it for `range`.
    pub async fn serve(
        &self,
        file_name: &str,
        range: Option<&str>,
    ) -> Result<StreamResponse, StreamError> {
        let path = self.artifacts.resolve_name(file_name).map_err(|e| match e {
            StoreError::Forbidden(name) => StreamError::Forbidden(name),
            other => StreamError::NotFound(other.to_string()),
        })?;

        let io_error = |source: std::io::Error| {
            if source.kind() == ErrorKind::NotFound {
                StreamError::NotFound(file_name.to_string())
            } else {
                StreamError::Io {
                    path: path.clone(),
                    source,
                }
            }
        };

        let mut file = File::open(&path).await.map_err(io_error)?;
        let meta = file.metadata().await.map_err(io_error)?;
        if !meta.is_file() {
            return Err(StreamError::NotFound(file_name.to_string()));
        }
        let size = meta.len();

        let outcome = parse_range(range, size);
        if let RangeOutcome::Partial(r) = outcome {
            file.seek(SeekFrom::Start(r.start)).await.map_err(io_error)?;
        }
        tracing::debug!(file = %file_name, size, ?outcome, "Streaming artifact");

        Ok(StreamResponse {
            file,
            size,
            mime_type: self.artifacts.format().mime_type,
            outcome,
        })
    }
}
