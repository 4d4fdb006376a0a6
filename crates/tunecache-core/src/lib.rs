//! # tunecache-core — Foundational Types
//!
//! Shared domain primitives for every tunecache crate:
//!
//! - [`CacheKey`]: the canonical source identifier (e.g. a video id),
//!   validated at construction so it is always safe as a URL path segment.
//! - [`ArtifactId`]: a freshly minted token naming one stored artifact.
//!   Never reused, even when the same key is fetched again.
//! - [`CacheEntry`] / [`TrackMetadata`]: the record kept in the cache index.
//! - [`AudioFormat`]: the single transcode target (MP3).
//! - [`temporal`]: timestamp (de)serialization compatible with index files
//!   written by earlier versions of the service.

pub mod entry;
pub mod error;
pub mod format;
pub mod identity;
pub mod temporal;

pub use entry::{CacheEntry, TrackMetadata};
pub use error::ValidationError;
pub use format::AudioFormat;
pub use identity::{ArtifactId, CacheKey};
