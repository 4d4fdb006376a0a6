//! # Identity Newtypes
//!
//! Two identifiers flow through the cache and must never be confused:
//!
//! - [`CacheKey`] identifies the upstream media item. It is what clients
//!   use in `/metadata/{videoId}` and `/cache/{videoId}`.
//! - [`ArtifactId`] identifies one stored file. It is what clients see in
//!   `/stream/{file}`. A re-fetch of the same key mints a new one, so a file
//!   name is never reused for different bytes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Maximum byte length of a [`CacheKey`].
pub const MAX_KEY_LEN: usize = 256;

/// Canonical identifier of an upstream media item.
///
/// Keys are produced by the fetch capability (e.g. a YouTube video id) and
/// end up as a URL path segment, so separators and control characters are
/// rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Validate and wrap a source identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        let key = raw.trim();
        if key.is_empty() {
            return Err(ValidationError::EmptyKey);
        }
        if key.len() > MAX_KEY_LEN {
            return Err(ValidationError::KeyTooLong {
                len: key.len(),
                max: MAX_KEY_LEN,
            });
        }
        if let Some(ch) = key
            .chars()
            .find(|c| *c == '/' || *c == '\\' || c.is_control())
        {
            return Err(ValidationError::KeyForbiddenChar {
                key: key.to_string(),
                ch,
            });
        }
        Ok(Self(key.to_string()))
    }

    /// Return the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CacheKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique token naming one stored artifact file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactId(Uuid);

impl ArtifactId {
    /// Mint a new random artifact identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an artifact identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// File name of the artifact with the given extension, e.g. `<uuid>.mp3`.
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{extension}", self.0)
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<String> for ArtifactId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Uuid::parse_str(&value)
            .map(Self)
            .map_err(|_| ValidationError::InvalidArtifactId(value))
    }
}

impl From<ArtifactId> for String {
    fn from(id: ArtifactId) -> Self {
        id.0.to_string()
    }
}

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn cache_key_accepts_video_ids() {
        let key = CacheKey::new("dQw4w9WgXcQ").unwrap();
        assert_eq!(key.as_str(), "dQw4w9WgXcQ");
        assert_eq!(key.to_string(), "dQw4w9WgXcQ");
    }

    #[test]
    fn cache_key_trims_whitespace() {
        let key = CacheKey::new("  abc123\n").unwrap();
        assert_eq!(key.as_str(), "abc123");
    }

    #[test]
    fn cache_key_rejects_empty() {
        assert_eq!(CacheKey::new("   "), Err(ValidationError::EmptyKey));
    }

    #[test]
    fn cache_key_rejects_separators() {
        assert!(matches!(
            CacheKey::new("a/b"),
            Err(ValidationError::KeyForbiddenChar { ch: '/', .. })
        ));
        assert!(matches!(
            CacheKey::new("a\\b"),
            Err(ValidationError::KeyForbiddenChar { ch: '\\', .. })
        ));
        assert!(CacheKey::new("a\u{0}b").is_err());
    }

    #[test]
    fn cache_key_rejects_overlong() {
        let long = "x".repeat(MAX_KEY_LEN + 1);
        assert!(matches!(
            CacheKey::new(long),
            Err(ValidationError::KeyTooLong { .. })
        ));
        assert!(CacheKey::new("x".repeat(MAX_KEY_LEN)).is_ok());
    }

    #[test]
    fn cache_key_deserialization_validates() {
        let ok: CacheKey = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(ok.as_str(), "abc");
        assert!(serde_json::from_str::<CacheKey>("\"../etc\"").is_err());
    }

    #[test]
    fn artifact_ids_are_unique() {
        let a = ArtifactId::new();
        let b = ArtifactId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn artifact_id_file_name() {
        let uuid = Uuid::parse_str("6f1c1f0e-3f55-4d0b-9a8e-0d6b0a8f2c11").unwrap();
        let id = ArtifactId::from_uuid(uuid);
        assert_eq!(
            id.file_name("mp3"),
            "6f1c1f0e-3f55-4d0b-9a8e-0d6b0a8f2c11.mp3"
        );
    }

    #[test]
    fn artifact_id_serializes_as_plain_string() {
        let id = ArtifactId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: ArtifactId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<ArtifactId>("\"not-a-uuid\"").is_err());
    }

    proptest! {
        #[test]
        fn accepted_keys_never_contain_separators(raw in "\\PC{0,64}") {
            if let Ok(key) = CacheKey::new(raw) {
                prop_assert!(!key.as_str().contains('/'));
                prop_assert!(!key.as_str().contains('\\'));
                prop_assert!(!key.as_str().is_empty());
            }
        }
    }
}
