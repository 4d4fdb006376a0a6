//! # Cache Entries
//!
//! A [`CacheEntry`] records one stored artifact for one [`CacheKey`]
//! (the key itself is the index map key, not a field). Entries are only
//! ever replaced wholesale; there are no partial updates.
//!
//! The serialized field names (`file`, `metadata`, `downloaded_at`,
//! `file_id`) match the on-disk index format used by earlier deployments.
//!
//! [`CacheKey`]: crate::CacheKey

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::identity::ArtifactId;

/// Descriptive metadata reported by the fetch capability.
///
/// Free-form and unvalidated. Every field defaults to empty / zero, and an
/// explicit JSON `null` is read as the default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    /// Duration in seconds.
    #[serde(default, deserialize_with = "null_as_default")]
    pub duration: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub thumbnail: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uploader: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One cached artifact and its descriptive metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Location of the stored artifact file.
    #[serde(rename = "file")]
    pub artifact_path: PathBuf,
    #[serde(default)]
    pub metadata: TrackMetadata,
    #[serde(rename = "downloaded_at", with = "crate::temporal")]
    pub fetched_at: DateTime<Utc>,
    #[serde(rename = "file_id")]
    pub artifact_id: ArtifactId,
}

impl CacheEntry {
    /// Build an entry for a freshly fetched artifact.
    pub fn new(
        artifact_id: ArtifactId,
        artifact_path: impl Into<PathBuf>,
        metadata: TrackMetadata,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            metadata,
            fetched_at,
            artifact_id,
        }
    }

    /// Whether the entry was fetched strictly before `cutoff`.
    pub fn is_expired(&self, cutoff: DateTime<Utc>) -> bool {
        self.fetched_at < cutoff
    }

    /// Path of the backing artifact file.
    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// Public file name of the artifact (the last path component).
    pub fn public_file_name(&self) -> String {
        self.artifact_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.artifact_id.to_string())
    }

    /// Client-facing stream path, e.g. `/stream/<uuid>.mp3`.
    pub fn stream_path(&self) -> String {
        format!("/stream/{}", self.public_file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample() -> CacheEntry {
        CacheEntry::new(
            ArtifactId::new(),
            "/var/audio/x.mp3",
            TrackMetadata {
                title: "Song".into(),
                duration: 212.0,
                thumbnail: "https://img/x.jpg".into(),
                uploader: "Artist".into(),
            },
            Utc::now(),
        )
    }

    #[test]
    fn stream_path_uses_file_name() {
        let entry = sample();
        assert_eq!(entry.public_file_name(), "x.mp3");
        assert_eq!(entry.stream_path(), "/stream/x.mp3");
    }

    #[test]
    fn expiry_is_strict() {
        let entry = sample();
        assert!(!entry.is_expired(entry.fetched_at));
        assert!(entry.is_expired(entry.fetched_at + Duration::seconds(1)));
        assert!(!entry.is_expired(entry.fetched_at - Duration::hours(1)));
    }

    #[test]
    fn serializes_with_index_field_names() {
        let entry = sample();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["file"], "/var/audio/x.mp3");
        assert_eq!(json["file_id"], entry.artifact_id.to_string());
        assert!(json["downloaded_at"].is_string());
        assert_eq!(json["metadata"]["title"], "Song");
    }

    #[test]
    fn reads_legacy_entry_with_nulls_and_naive_time() {
        let raw = serde_json::json!({
            "file": "./audio/6f1c1f0e-3f55-4d0b-9a8e-0d6b0a8f2c11.mp3",
            "metadata": {
                "title": null,
                "duration": 185,
                "thumbnail": "",
                "uploader": "Someone"
            },
            "downloaded_at": "2024-05-01T12:00:00.123456",
            "file_id": "6f1c1f0e-3f55-4d0b-9a8e-0d6b0a8f2c11"
        });
        let entry: CacheEntry = serde_json::from_value(raw).unwrap();
        assert_eq!(entry.metadata.title, "");
        assert_eq!(entry.metadata.duration, 185.0);
        assert_eq!(entry.metadata.uploader, "Someone");
        assert_eq!(
            entry.public_file_name(),
            "6f1c1f0e-3f55-4d0b-9a8e-0d6b0a8f2c11.mp3"
        );
    }

    #[test]
    fn missing_metadata_defaults() {
        let raw = serde_json::json!({
            "file": "a.mp3",
            "downloaded_at": "2025-01-01T00:00:00Z",
            "file_id": "6f1c1f0e-3f55-4d0b-9a8e-0d6b0a8f2c11"
        });
        let entry: CacheEntry = serde_json::from_value(raw).unwrap();
        assert_eq!(entry.metadata, TrackMetadata::default());
    }
}
