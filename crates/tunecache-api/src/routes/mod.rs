//! # API Route Modules
//!
//! - `health`: service status and cache size.
//! - `download`: resolve a source URL and make sure its audio is cached.
//! - `stream`: range-aware artifact delivery.
//! - `metadata`: cached metadata for one key.
//! - `cache`: enumerate the cache and delete single entries.
//!
//! Response bodies use camelCase keys.

pub mod cache;
pub mod download;
pub mod health;
pub mod metadata;
pub mod stream;

use serde::{Deserialize, Serialize};
use tunecache_core::{CacheKey, TrackMetadata};
use utoipa::ToSchema;

/// Parse a key taken from a URL path segment. Unlike [`CacheKey::new`], the
/// segment must already be canonical: `abc123%20` does not name `abc123`.
pub(crate) fn path_key(segment: &str) -> Option<CacheKey> {
    CacheKey::new(segment)
        .ok()
        .filter(|key| key.as_str() == segment)
}

/// Descriptive metadata of a cached track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TrackMetadataView {
    pub title: String,
    /// Duration in seconds.
    pub duration: f64,
    /// Thumbnail URL.
    pub thumbnail: String,
    pub uploader: String,
}

impl From<&TrackMetadata> for TrackMetadataView {
    fn from(meta: &TrackMetadata) -> Self {
        Self {
            title: meta.title.clone(),
            duration: meta.duration,
            thumbnail: meta.thumbnail.clone(),
            uploader: meta.uploader.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_key_requires_exact_segment() {
        assert_eq!(path_key("abc123").unwrap().as_str(), "abc123");
        assert!(path_key("abc123 ").is_none());
        assert!(path_key(" abc123").is_none());
        assert!(path_key("").is_none());
        assert!(path_key("a\\b").is_none());
    }
}
