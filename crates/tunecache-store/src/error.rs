//! # Store Errors

use std::path::PathBuf;

use thiserror::Error;

/// Failure to rewrite the index file.
///
/// Never rolls back the in-memory mutation that triggered the write; the
/// in-memory index is authoritative for the life of the process.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Reading or writing the index file failed.
    #[error("index file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The index could not be encoded as JSON.
    #[error("failed to encode cache index: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors from artifact and index operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Artifact name attempted to escape the flat artifact directory.
    #[error("forbidden artifact name {0:?}")]
    Forbidden(String),

    /// Filesystem operation on an artifact failed.
    #[error("artifact I/O error at {path}: {source}")]
    Artifact {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The index mutation applied in memory but the index file was not rewritten.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
