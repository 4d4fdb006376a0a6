//! # tunecache-store — Artifact Storage and Cache Index
//!
//! Three pieces share responsibility for what is on disk:
//!
//! - [`ArtifactStore`]: the flat directory of transcoded audio files.
//!   Pure path, existence, and deletion operations.
//! - [`CacheIndex`]: the process-wide `key → entry` map. All lookups and
//!   mutations go through one `RwLock`; every mutation rewrites the whole
//!   index file.
//! - [`RetentionSweeper`]: the periodic task that evicts entries older
//!   than the retention window.
//!
//! ## Deletion Ordering
//!
//! An artifact file is removed *before* its index entry, and the index
//! entry is removed only if the file removal succeeded or the file was
//! already gone. Index removal is conditional on the entry still naming
//! the same [`ArtifactId`](tunecache_core::ArtifactId), so a concurrent
//! re-fetch that published a fresh artifact is never evicted by mistake.

pub mod artifact;
pub mod error;
pub mod index;
pub mod sweeper;

pub use artifact::{ArtifactStore, Removal};
pub use error::{PersistenceError, StoreError};
pub use index::{CacheIndex, Committed};
pub use sweeper::{RetentionSweeper, SweepReport, SweepStats};
