//! # Media Fetch Capability
//!
//! The contract tunecache consumes from whatever actually downloads and
//! transcodes media. Two operations:
//!
//! - [`MediaFetcher::probe`]: identify a source without downloading it.
//! - [`MediaFetcher::fetch`]: download and transcode into
//!   `<output_prefix>.<format extension>`.
//!
//! Implementations must be `Send + Sync` so they can be shared across
//! request tasks behind an `Arc`, and object-safe so the coordinator can
//! hold `Arc<dyn MediaFetcher>`.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tunecache_core::{AudioFormat, TrackMetadata};

use crate::error::FetcherError;

/// Result of probing a source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProbeInfo {
    /// Canonical identifier of the upstream item (e.g. the video id).
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Descriptive metadata returned by a completed fetch.
///
/// Every field is optional; missing values become empty / zero in the
/// cached [`TrackMetadata`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FetchedMedia {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
}

impl FetchedMedia {
    /// Convert into cached metadata, defaulting unknown fields.
    pub fn into_metadata(self) -> TrackMetadata {
        TrackMetadata {
            title: self.title.unwrap_or_default(),
            duration: self.duration.unwrap_or_default(),
            thumbnail: self.thumbnail.unwrap_or_default(),
            uploader: self.uploader.unwrap_or_default(),
        }
    }
}

/// External media fetch capability.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Identify `url` without downloading it.
    async fn probe(&self, url: &str) -> Result<ProbeInfo, FetcherError>;

    /// Download `url` and transcode it to `format`, writing
    /// `<output_prefix>.<format.extension>`.
    async fn fetch(
        &self,
        url: &str,
        output_prefix: &Path,
        format: AudioFormat,
    ) -> Result<FetchedMedia, FetcherError>;
}
