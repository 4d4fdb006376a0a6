//! # tunecache-fetch — Cache Fill Coordination
//!
//! The media fetch itself (network download plus transcode) is an external
//! capability described by the [`MediaFetcher`] trait. [`YtDlpFetcher`]
//! implements it by driving the `yt-dlp` executable.
//!
//! [`FetchCoordinator`] turns a source URL into a cached artifact:
//!
//! ```text
//! url ──probe──▶ CacheKey ──lookup──▶ hit (file exists) ──▶ was_cached = true
//!                                   └─▶ miss ──▶ in-flight registry
//!                                                 ├─ attach to running fetch
//!                                                 └─ spawn fetch task ──▶ publish to CacheIndex
//! ```
//!
//! At most one fetch runs per key. The fetch executes without holding the
//! index lock; only the final publish takes it.

pub mod coordinator;
pub mod error;
pub mod fetcher;
#[cfg(any(test, feature = "stub"))]
pub mod stub;
pub mod ytdlp;

pub use coordinator::{CachedArtifact, FetchCoordinator, FetchSettings};
pub use error::{FetchError, FetcherError};
pub use fetcher::{FetchedMedia, MediaFetcher, ProbeInfo};
pub use ytdlp::YtDlpFetcher;
