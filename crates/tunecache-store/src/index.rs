//! # Cache Index
//!
//! Process-wide mapping from [`CacheKey`] to [`CacheEntry`], loaded once at
//! startup and rewritten in full after every mutation.
//!
//! ## Locking
//!
//! Lookups take the read side and mutations the write side of a single
//! `parking_lot::RwLock`, so index operations are linearizable. The lock is
//! synchronous and never held across an `.await`.
//!
//! ## Persistence
//!
//! Each mutation bumps a generation counter and serializes the whole map
//! while still holding the write lock, then releases it before touching the
//! filesystem. Writers serialize on a separate mutex that remembers the
//! last generation written; a writer holding an older snapshot than what is
//! already on disk skips its write. The file on disk is therefore always a
//! complete snapshot and never moves backwards, and slow disk I/O never
//! blocks readers.
//!
//! The file is written to a sibling temp file and renamed into place:
//!
//! ```text
//! { "version": 1, "entries": { "<key>": { "file": ..., "metadata": ..., ... } } }
//! ```
//!
//! A flat `{ "<key>": entry }` map, as written by earlier deployments, is
//! also accepted on load. Entries are decoded one at a time: an entry that
//! does not parse is skipped with a warning and the rest still load. Only a
//! file that is not a JSON object at all is moved aside.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tunecache_core::{ArtifactId, CacheEntry, CacheKey};

use crate::artifact::ArtifactStore;
use crate::error::{PersistenceError, StoreError};

/// Format version written into the index file.
pub const INDEX_VERSION: u32 = 1;

/// How often [`CacheIndex::evict`] retries when the entry is replaced
/// underneath it.
pub const EVICT_ATTEMPTS: usize = 3;

/// Outcome of an index mutation.
///
/// The in-memory change has always been applied. `persisted` reports
/// whether the index file was rewritten to match; callers decide whether a
/// persistence failure is fatal for their operation.
#[must_use]
#[derive(Debug)]
pub struct Committed<T> {
    pub value: T,
    pub persisted: Result<(), PersistenceError>,
}

impl<T> Committed<T> {
    fn clean(value: T) -> Self {
        Self {
            value,
            persisted: Ok(()),
        }
    }

    /// Treat a persistence failure as an error, discarding the value.
    pub fn into_result(self) -> Result<T, PersistenceError> {
        self.persisted.map(|()| self.value)
    }

    /// Transform the carried value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Committed<U> {
        Committed {
            value: f(self.value),
            persisted: self.persisted,
        }
    }
}

#[derive(Debug, Default)]
struct IndexState {
    entries: HashMap<CacheKey, CacheEntry>,
    generation: u64,
}

#[derive(Debug)]
struct Persister {
    path: PathBuf,
    /// Generation of the snapshot currently on disk.
    written: Mutex<u64>,
}

#[derive(Debug)]
struct Inner {
    state: RwLock<IndexState>,
    persister: Option<Persister>,
}

#[derive(Serialize)]
struct IndexDocument<'a> {
    version: u32,
    entries: BTreeMap<&'a str, &'a CacheEntry>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredIndex {
    Versioned {
        version: u32,
        entries: BTreeMap<String, serde_json::Value>,
    },
    Legacy(BTreeMap<String, serde_json::Value>),
}

/// Shared handle to the cache index. Clones refer to the same index.
#[derive(Debug, Clone)]
pub struct CacheIndex {
    inner: Arc<Inner>,
}

impl CacheIndex {
    /// An index with no backing file.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(IndexState::default()),
                persister: None,
            }),
        }
    }

    /// Load the index persisted at `path`.
    ///
    /// A missing file yields an empty index. A file that cannot be parsed is
    /// moved aside to `<path>.corrupt` and the index starts empty, so the
    /// next write does not silently destroy it. Any other read failure is
    /// returned.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => decode(&path, &bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(source) => return Err(PersistenceError::Io { path, source }),
        };

        tracing::info!(
            path = %path.display(),
            entries = entries.len(),
            "Loaded cache index"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                state: RwLock::new(IndexState {
                    entries,
                    generation: 0,
                }),
                persister: Some(Persister {
                    path,
                    written: Mutex::new(0),
                }),
            }),
        })
    }

    /// Location of the index file, if persistent.
    pub fn path(&self) -> Option<&Path> {
        self.inner.persister.as_ref().map(|p| p.path.as_path())
    }

    /// Generation of the snapshot last written to disk, if persistent.
    ///
    /// Starts at 0 on open and advances by one per index file rewrite.
    pub fn persisted_generation(&self) -> Option<u64> {
        self.inner.persister.as_ref().map(|p| *p.written.lock())
    }

    /// Retrieve the entry for `key`.
    ///
    /// A returned entry's artifact file may have been removed externally;
    /// callers treat "entry present, file missing" as a miss.
    pub fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.state.read().entries.get(key).cloned()
    }

    /// Whether an entry exists for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.state.read().entries.contains_key(key)
    }

    /// Insert or replace the entry for `key`, returning the previous entry.
    ///
    /// Replacement is atomic with respect to every other index operation.
    pub fn replace(&self, key: CacheKey, entry: CacheEntry) -> Committed<Option<CacheEntry>> {
        let mut state = self.inner.state.write();
        let previous = state.entries.insert(key, entry);
        let persisted = self.commit(state);
        Committed {
            value: previous,
            persisted,
        }
    }

    /// Insert or replace the entry for `key`.
    pub fn insert(&self, key: CacheKey, entry: CacheEntry) -> Committed<()> {
        self.replace(key, entry).map(|_| ())
    }

    /// Remove the entry for `key`. Returns whether it was present.
    ///
    /// The index file is rewritten only when an entry was removed.
    pub fn delete(&self, key: &CacheKey) -> Committed<bool> {
        let mut state = self.inner.state.write();
        if state.entries.remove(key).is_none() {
            return Committed::clean(false);
        }
        let persisted = self.commit(state);
        Committed {
            value: true,
            persisted,
        }
    }

    /// Remove the entry for `key` only if it still names `artifact_id`.
    pub fn remove_if_current(&self, key: &CacheKey, artifact_id: &ArtifactId) -> Committed<bool> {
        let mut state = self.inner.state.write();
        let current = state
            .entries
            .get(key)
            .is_some_and(|e| e.artifact_id == *artifact_id);
        if !current {
            return Committed::clean(false);
        }
        state.entries.remove(key);
        let persisted = self.commit(state);
        Committed {
            value: true,
            persisted,
        }
    }

    /// Conditionally remove several entries under one lock acquisition and
    /// at most one index rewrite. Each `(key, artifact_id)` pair is removed
    /// only if the entry still names that artifact. Returns the removed keys.
    pub fn remove_batch(&self, victims: &[(CacheKey, ArtifactId)]) -> Committed<Vec<CacheKey>> {
        if victims.is_empty() {
            return Committed::clean(Vec::new());
        }
        let mut state = self.inner.state.write();
        let mut removed = Vec::with_capacity(victims.len());
        for (key, artifact_id) in victims {
            let current = state
                .entries
                .get(key)
                .is_some_and(|e| e.artifact_id == *artifact_id);
            if current {
                state.entries.remove(key);
                removed.push(key.clone());
            }
        }
        if removed.is_empty() {
            return Committed::clean(removed);
        }
        let persisted = self.commit(state);
        Committed {
            value: removed,
            persisted,
        }
    }

    /// Immutable snapshot of every entry, oldest first.
    pub fn snapshot_all(&self) -> Vec<(CacheKey, CacheEntry)> {
        let mut all: Vec<_> = self
            .inner
            .state
            .read()
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect();
        all.sort_by(|(ka, a), (kb, b)| a.fetched_at.cmp(&b.fetched_at).then_with(|| ka.cmp(kb)));
        all
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.state.read().entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict `key`: delete its artifact file, then its index entry.
    ///
    /// Returns `Ok(None)` if the key is unknown. If the file cannot be
    /// removed the error is returned and the index entry is left in place.
    /// An already-absent file does not prevent index removal. The entry is
    /// removed only if it still names the artifact whose file was deleted;
    /// when a re-fetch replaced it in between, the new entry is evicted in
    /// turn, up to [`EVICT_ATTEMPTS`] times. `Ok(Some(_))` always means the
    /// returned entry is gone from the index.
    pub fn evict(
        &self,
        key: &CacheKey,
        artifacts: &ArtifactStore,
    ) -> Result<Option<CacheEntry>, StoreError> {
        for _ in 0..EVICT_ATTEMPTS {
            let Some(entry) = self.lookup(key) else {
                return Ok(None);
            };
            let removal = artifacts.remove(entry.artifact_path())?;
            let committed = self.remove_if_current(key, &entry.artifact_id);
            tracing::info!(
                key = %key,
                artifact = %entry.artifact_id,
                ?removal,
                removed = committed.value,
                "Evicted cache entry"
            );
            committed.persisted?;
            if committed.value {
                return Ok(Some(entry));
            }
        }
        tracing::warn!(key = %key, "Entry kept changing during eviction; giving up");
        Ok(None)
    }

    /// Rewrite the index file if it is behind the in-memory state.
    pub fn flush(&self) -> Result<(), PersistenceError> {
        let Some(persister) = &self.inner.persister else {
            return Ok(());
        };
        let state = self.inner.state.read();
        let generation = state.generation;
        if *persister.written.lock() >= generation {
            return Ok(());
        }
        let bytes = encode(&state.entries)?;
        drop(state);
        persister.write(generation, &bytes)
    }

    fn commit(&self, mut state: RwLockWriteGuard<'_, IndexState>) -> Result<(), PersistenceError> {
        let Some(persister) = &self.inner.persister else {
            return Ok(());
        };
        state.generation += 1;
        let generation = state.generation;
        let bytes = encode(&state.entries)?;
        drop(state);

        let result = persister.write(generation, &bytes);
        if let Err(e) = &result {
            tracing::error!(error = %e, generation, "Failed to persist cache index");
        }
        result
    }
}

impl Persister {
    fn write(&self, generation: u64, bytes: &[u8]) -> Result<(), PersistenceError> {
        let mut written = self.written.lock();
        if *written >= generation {
            return Ok(());
        }
        write_atomic(&self.path, bytes).map_err(|source| PersistenceError::Io {
            path: self.path.clone(),
            source,
        })?;
        *written = generation;
        Ok(())
    }
}

fn encode(entries: &HashMap<CacheKey, CacheEntry>) -> Result<Vec<u8>, PersistenceError> {
    let doc = IndexDocument {
        version: INDEX_VERSION,
        entries: entries.iter().map(|(k, e)| (k.as_str(), e)).collect(),
    };
    Ok(serde_json::to_vec_pretty(&doc)?)
}

fn decode(path: &Path, bytes: &[u8]) -> Result<HashMap<CacheKey, CacheEntry>, PersistenceError> {
    let raw = match serde_json::from_slice::<StoredIndex>(bytes) {
        Ok(StoredIndex::Versioned { version, entries }) => {
            if version > INDEX_VERSION {
                tracing::warn!(
                    version,
                    supported = INDEX_VERSION,
                    "Cache index written by a newer version; loading best-effort"
                );
            }
            entries
        }
        Ok(StoredIndex::Legacy(entries)) => entries,
        Err(e) => {
            let aside = sibling(path, "corrupt");
            tracing::warn!(
                path = %path.display(),
                moved_to = %aside.display(),
                error = %e,
                "Cache index unreadable; starting empty"
            );
            fs::rename(path, &aside).map_err(|source| PersistenceError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            return Ok(HashMap::new());
        }
    };

    let mut entries = HashMap::with_capacity(raw.len());
    for (raw_key, value) in raw {
        let key = match CacheKey::new(raw_key.as_str()) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(key = %raw_key, error = %e, "Skipping invalid index key");
                continue;
            }
        };
        match serde_json::from_value::<CacheEntry>(value) {
            Ok(entry) => {
                entries.insert(key, entry);
            }
            Err(e) => tracing::warn!(key = %raw_key, error = %e, "Skipping unreadable index entry"),
        }
    }
    Ok(entries)
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = sibling(path, "tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tunecache_core::TrackMetadata;

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s).unwrap()
    }

    fn entry(title: &str) -> CacheEntry {
        let id = ArtifactId::new();
        CacheEntry::new(
            id,
            format!("/audio/{id}.mp3"),
            TrackMetadata {
                title: title.to_string(),
                ..TrackMetadata::default()
            },
            Utc::now(),
        )
    }

    fn read_doc(path: &Path) -> serde_json::Value {
        serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
    }

    #[test]
    fn lookup_insert_delete() {
        let index = CacheIndex::in_memory();
        assert!(index.lookup(&key("a")).is_none());

        index.insert(key("a"), entry("A")).into_result().unwrap();
        assert_eq!(index.lookup(&key("a")).unwrap().metadata.title, "A");
        assert!(index.contains(&key("a")));
        assert_eq!(index.len(), 1);

        assert!(index.delete(&key("a")).into_result().unwrap());
        assert!(!index.delete(&key("a")).into_result().unwrap());
        assert!(index.is_empty());
    }

    #[test]
    fn replace_returns_previous_entry() {
        let index = CacheIndex::in_memory();
        let first = entry("first");
        let prev = index.replace(key("a"), first.clone()).into_result().unwrap();
        assert!(prev.is_none());

        let prev = index.replace(key("a"), entry("second")).into_result().unwrap();
        assert_eq!(prev, Some(first));
        assert_eq!(index.lookup(&key("a")).unwrap().metadata.title, "second");
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn remove_if_current_ignores_replaced_entries() {
        let index = CacheIndex::in_memory();
        let old = entry("old");
        index.insert(key("a"), old.clone()).into_result().unwrap();
        index.insert(key("a"), entry("new")).into_result().unwrap();

        assert!(!index.remove_if_current(&key("a"), &old.artifact_id).value);
        assert!(index.contains(&key("a")));

        let current = index.lookup(&key("a")).unwrap();
        assert!(index.remove_if_current(&key("a"), &current.artifact_id).value);
        assert!(!index.contains(&key("a")));
    }

    #[test]
    fn snapshot_is_sorted_oldest_first_and_detached() {
        let index = CacheIndex::in_memory();
        let mut older = entry("older");
        older.fetched_at = Utc::now() - Duration::hours(5);
        index.insert(key("new"), entry("newer")).into_result().unwrap();
        index.insert(key("old"), older).into_result().unwrap();

        let snapshot = index.snapshot_all();
        assert_eq!(snapshot[0].0, key("old"));
        assert_eq!(snapshot[1].0, key("new"));

        index.delete(&key("old")).into_result().unwrap();
        assert_eq!(snapshot.len(), 2, "snapshot must not observe later mutations");
    }

    #[test]
    fn every_mutation_rewrites_the_whole_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache.json");
        let index = CacheIndex::open(&path).unwrap();
        assert!(!path.exists(), "opening must not create the file");

        index.insert(key("a"), entry("A")).into_result().unwrap();
        index.insert(key("b"), entry("B")).into_result().unwrap();
        let doc = read_doc(&path);
        assert_eq!(doc["version"], INDEX_VERSION);
        assert_eq!(doc["entries"].as_object().unwrap().len(), 2);

        index.delete(&key("a")).into_result().unwrap();
        let doc = read_doc(&path);
        let entries = doc["entries"].as_object().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("b"));
        assert!(!sibling(&path, "tmp").exists());
    }

    #[test]
    fn reopen_restores_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache.json");
        let stored = entry("persisted");
        {
            let index = CacheIndex::open(&path).unwrap();
            index.insert(key("abc123"), stored.clone()).into_result().unwrap();
        }
        let reopened = CacheIndex::open(&path).unwrap();
        let loaded = reopened.lookup(&key("abc123")).unwrap();
        assert_eq!(loaded.artifact_id, stored.artifact_id);
        assert_eq!(loaded.metadata, stored.metadata);
        assert_eq!(loaded.fetched_at.timestamp(), stored.fetched_at.timestamp());
    }

    #[test]
    fn loads_legacy_flat_map() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache.json");
        let legacy = serde_json::json!({
            "abc123": {
                "file": "./audio/6f1c1f0e-3f55-4d0b-9a8e-0d6b0a8f2c11.mp3",
                "metadata": {"title": "Old", "duration": 10, "thumbnail": "", "uploader": "U"},
                "downloaded_at": "2024-05-01T12:00:00.123456",
                "file_id": "6f1c1f0e-3f55-4d0b-9a8e-0d6b0a8f2c11"
            }
        });
        fs::write(&path, serde_json::to_vec(&legacy).unwrap()).unwrap();

        let index = CacheIndex::open(&path).unwrap();
        assert_eq!(index.lookup(&key("abc123")).unwrap().metadata.title, "Old");
    }

    #[test]
    fn corrupt_file_is_moved_aside() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache.json");
        fs::write(&path, b"{ not json").unwrap();

        let index = CacheIndex::open(&path).unwrap();
        assert!(index.is_empty());
        assert!(!path.exists());
        assert_eq!(fs::read(sibling(&path, "corrupt")).unwrap(), b"{ not json");
    }

    #[test]
    fn invalid_keys_are_skipped_on_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache.json");
        let e = entry("x");
        let doc = serde_json::json!({
            "version": 1,
            "entries": { "ok": e, "../bad": e }
        });
        fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        let index = CacheIndex::open(&path).unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.contains(&key("ok")));
    }

    #[test]
    fn persistence_failure_keeps_in_memory_mutation() {
        let tmp = tempfile::tempdir().unwrap();
        // The index path is a directory, so every write fails.
        let path = tmp.path().join("cache.json");
        fs::create_dir(&path).unwrap();
        let index = CacheIndex {
            inner: Arc::new(Inner {
                state: RwLock::new(IndexState::default()),
                persister: Some(Persister {
                    path,
                    written: Mutex::new(0),
                }),
            }),
        };

        let committed = index.insert(key("a"), entry("A"));
        assert!(committed.persisted.is_err());
        assert!(index.contains(&key("a")));
        assert!(index.flush().is_err());
    }

    #[test]
    fn flush_is_noop_when_clean() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache.json");
        let index = CacheIndex::open(&path).unwrap();
        index.flush().unwrap();
        assert!(!path.exists());

        index.insert(key("a"), entry("A")).into_result().unwrap();
        fs::remove_file(&path).unwrap();
        index.flush().unwrap();
        assert!(!path.exists(), "already-written generation is not rewritten");
    }

    #[test]
    fn remove_batch_flushes_once_for_many() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache.json");
        let index = CacheIndex::open(&path).unwrap();
        let a = entry("a");
        let b = entry("b");
        index.insert(key("a"), a.clone()).into_result().unwrap();
        index.insert(key("b"), b.clone()).into_result().unwrap();
        index.insert(key("c"), entry("c")).into_result().unwrap();
        let before = index.persisted_generation().unwrap();
        assert_eq!(before, 3);

        let removed = index
            .remove_batch(&[
                (key("a"), a.artifact_id),
                (key("b"), b.artifact_id),
                (key("c"), ArtifactId::new()),
                (key("zzz"), ArtifactId::new()),
            ])
            .into_result()
            .unwrap();
        assert_eq!(removed, vec![key("a"), key("b")]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.persisted_generation(), Some(before + 1));
        assert_eq!(read_doc(&path)["entries"].as_object().unwrap().len(), 1);
    }

    #[test]
    fn remove_batch_without_matches_does_not_write() {
        let tmp = tempfile::tempdir().unwrap();
        let index = CacheIndex::open(tmp.path().join("cache.json")).unwrap();
        index.insert(key("a"), entry("a")).into_result().unwrap();
        let before = index.persisted_generation().unwrap();

        let removed = index
            .remove_batch(&[(key("a"), ArtifactId::new())])
            .into_result()
            .unwrap();
        assert!(removed.is_empty());
        assert_eq!(index.persisted_generation(), Some(before));
    }

    #[test]
    fn one_unreadable_entry_does_not_discard_the_rest() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache.json");
        let good = entry("good");
        let mut bad = serde_json::to_value(entry("bad")).unwrap();
        bad["file_id"] = serde_json::json!("not-a-uuid");
        let doc = serde_json::json!({
            "version": 1,
            "entries": { "good": good, "bad": bad, "worse": 42 }
        });
        fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        let index = CacheIndex::open(&path).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup(&key("good")).unwrap().artifact_id, good.artifact_id);
        assert!(path.exists());
        assert!(!sibling(&path, "corrupt").exists());
    }

    #[test]
    fn non_object_document_is_moved_aside() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache.json");
        fs::write(&path, b"[1, 2, 3]").unwrap();

        let index = CacheIndex::open(&path).unwrap();
        assert!(index.is_empty());
        assert!(sibling(&path, "corrupt").exists());
    }

    #[test]
    fn evict_removes_file_and_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::open(tmp.path().join("audio")).unwrap();
        let index = CacheIndex::open(tmp.path().join("cache.json")).unwrap();
        let id = ArtifactId::new();
        let path = artifacts.path_for(&id);
        fs::write(&path, b"mp3").unwrap();
        index
            .insert(key("abc"), CacheEntry::new(id, &path, TrackMetadata::default(), Utc::now()))
            .into_result()
            .unwrap();

        let evicted = index.evict(&key("abc"), &artifacts).unwrap();
        assert_eq!(evicted.unwrap().artifact_id, id);
        assert!(index.lookup(&key("abc")).is_none());
        assert!(!path.exists());
    }

    #[test]
    fn evict_with_missing_file_still_removes_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::open(tmp.path()).unwrap();
        let index = CacheIndex::in_memory();
        let id = ArtifactId::new();
        index
            .insert(
                key("gone"),
                CacheEntry::new(id, artifacts.path_for(&id), TrackMetadata::default(), Utc::now()),
            )
            .into_result()
            .unwrap();

        assert!(index.evict(&key("gone"), &artifacts).unwrap().is_some());
        assert!(index.is_empty());
    }

    #[test]
    fn evict_unknown_key_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::open(tmp.path()).unwrap();
        let index = CacheIndex::in_memory();
        assert!(index.evict(&key("nope"), &artifacts).unwrap().is_none());
    }

    #[test]
    fn evict_keeps_entry_when_file_removal_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::open(tmp.path()).unwrap();
        let index = CacheIndex::in_memory();
        // A non-empty directory at the artifact path cannot be removed as a file.
        let id = ArtifactId::new();
        let path = artifacts.path_for(&id);
        fs::create_dir(&path).unwrap();
        fs::write(path.join("inner"), b"x").unwrap();
        index
            .insert(key("stuck"), CacheEntry::new(id, &path, TrackMetadata::default(), Utc::now()))
            .into_result()
            .unwrap();

        assert!(matches!(
            index.evict(&key("stuck"), &artifacts),
            Err(StoreError::Artifact { .. })
        ));
        assert!(index.contains(&key("stuck")));
    }

    #[test]
    fn concurrent_writers_leave_a_complete_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache.json");
        let index = CacheIndex::open(&path).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let index = index.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let k = key(&format!("t{t}-{i}"));
                        let _ = index.insert(k, entry("x"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let doc = read_doc(&path);
        assert_eq!(doc["entries"].as_object().unwrap().len(), 200);
        assert_eq!(CacheIndex::open(&path).unwrap().len(), 200);
    }
}
