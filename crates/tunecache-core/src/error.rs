//! # Validation Errors
//!
//! Errors raised when constructing domain primitives from untrusted input.

use thiserror::Error;

/// Domain primitive validation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Cache key is empty after trimming.
    #[error("cache key must not be empty")]
    EmptyKey,

    /// Cache key exceeds the maximum length.
    #[error("cache key too long: {len} bytes (max {max})")]
    KeyTooLong { len: usize, max: usize },

    /// Cache key contains a character that cannot appear in a path segment.
    #[error("cache key {key:?} contains forbidden character {ch:?}")]
    KeyForbiddenChar { key: String, ch: char },

    /// Artifact identifier is not a valid UUID.
    #[error("invalid artifact id {0:?}")]
    InvalidArtifactId(String),
}
