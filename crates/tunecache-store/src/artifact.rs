//! # Artifact Store
//!
//! Filesystem-backed storage for transcoded audio artifacts. The artifact
//! directory is a flat namespace: every file is named `<artifact-id>.<ext>`
//! and no subdirectory is ever legitimate, so [`ArtifactStore::resolve_name`]
//! rejects any client-supplied name that could traverse.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tunecache_core::{ArtifactId, AudioFormat};

use crate::error::StoreError;

/// Result of removing an artifact file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The file existed and was deleted.
    Deleted,
    /// The file was already absent.
    AlreadyAbsent,
}

/// Flat directory of stored artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    format: AudioFormat,
}

impl ArtifactStore {
    /// Open (creating if needed) the artifact directory for MP3 artifacts.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::with_format(dir, AudioFormat::MP3)
    }

    /// Open the artifact directory for the given target format.
    pub fn with_format(dir: impl Into<PathBuf>, format: AudioFormat) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Artifact {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir, format })
    }

    /// Root of the artifact directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Target format of stored artifacts.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Extension-less output path handed to the fetch capability. The
    /// capability appends the format extension when it writes the file.
    pub fn output_prefix(&self, id: &ArtifactId) -> PathBuf {
        self.dir.join(id.to_string())
    }

    /// Final path of the artifact for `id`.
    pub fn path_for(&self, id: &ArtifactId) -> PathBuf {
        self.dir.join(id.file_name(self.format.extension))
    }

    /// Map a client-supplied file name to a path inside the artifact directory.
    ///
    /// Fails with [`StoreError::Forbidden`] for names containing a path
    /// separator or a parent-directory sequence, whether or not a matching
    /// file exists.
    pub fn resolve_name(&self, name: &str) -> Result<PathBuf, StoreError> {
        if is_forbidden_name(name) {
            return Err(StoreError::Forbidden(name.to_string()));
        }
        Ok(self.dir.join(name))
    }

    /// Whether a regular file exists at `path`.
    pub fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Size of the artifact at `path` in bytes.
    pub fn size(&self, path: &Path) -> Result<u64, StoreError> {
        fs::metadata(path)
            .map(|m| m.len())
            .map_err(|source| StoreError::Artifact {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Delete the artifact at `path`. An already-absent file is not an error.
    pub fn remove(&self, path: &Path) -> Result<Removal, StoreError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(Removal::Deleted),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Removal::AlreadyAbsent),
            Err(source) => Err(StoreError::Artifact {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Best-effort removal of every file written under `id`'s output prefix,
    /// including intermediate downloads in other formats. Returns how many
    /// files were deleted.
    pub fn discard(&self, id: &ArtifactId) -> usize {
        let prefix = id.to_string();
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return 0;
        };
        entries
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
            .filter(|e| fs::remove_file(e.path()).is_ok())
            .count()
    }
}

fn is_forbidden_name(name: &str) -> bool {
    name.is_empty()
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
}
