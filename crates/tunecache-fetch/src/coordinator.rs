//! # Fetch Coordinator
//!
//! Resolves source URLs to cache keys and fills the cache on a miss, with
//! at most one fetch in flight per key.
//!
//! ## In-Flight Registry
//!
//! A miss registers a shared future for its key and spawns the fetch as its
//! own task. Later callers for the same key attach to that future instead
//! of starting another fetch. The spawned task owns the download: a caller
//! that disconnects does not cancel it, and the task always publishes its
//! result before releasing the registry slot. A second check of the index
//! under the registry lock closes the window between a caller's miss and a
//! just-finished fetch.
//!
//! Lock order is registry then index. The fetch task never holds both.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tunecache_core::{ArtifactId, CacheEntry, CacheKey};
use tunecache_store::{ArtifactStore, CacheIndex};

use crate::error::FetchError;
use crate::fetcher::MediaFetcher;

/// Default upper bound on one download plus transcode.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(600);

/// Default upper bound on resolving a URL to its key.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Time bounds for fetch operations.
#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    pub fetch_timeout: Duration,
    pub probe_timeout: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// A cache entry guaranteed to have had its artifact on disk at return time.
#[derive(Debug, Clone)]
pub struct CachedArtifact {
    pub key: CacheKey,
    pub entry: CacheEntry,
    /// True if the entry was served from cache without any fetch.
    pub was_cached: bool,
}

type FetchOutcome = Result<CacheEntry, FetchError>;
type PendingFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// Deduplicating cache-fill front end over a [`MediaFetcher`].
#[derive(Clone)]
pub struct FetchCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    fetcher: Arc<dyn MediaFetcher>,
    index: CacheIndex,
    artifacts: ArtifactStore,
    settings: FetchSettings,
    in_flight: Mutex<HashMap<CacheKey, PendingFetch>>,
}

impl std::fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("settings", &self.inner.settings)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl FetchCoordinator {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        index: CacheIndex,
        artifacts: ArtifactStore,
        settings: FetchSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                index,
                artifacts,
                settings,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn index(&self) -> &CacheIndex {
        &self.inner.index
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.inner.artifacts
    }

    /// Number of keys with a fetch currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    /// Map a source URL to its cache key without downloading.
    pub async fn resolve(&self, url: &str) -> Result<CacheKey, FetchError> {
        let resolution = |reason: String| FetchError::Resolution {
            url: url.to_string(),
            reason,
        };
        let probe = tokio::time::timeout(
            self.inner.settings.probe_timeout,
            self.inner.fetcher.probe(url),
        )
        .await
        .map_err(|_| {
            resolution(format!(
                "probe timed out after {:?}",
                self.inner.settings.probe_timeout
            ))
        })?
        .map_err(|e| resolution(e.to_string()))?;

        CacheKey::new(probe.id).map_err(|e| resolution(e.to_string()))
    }

    /// The entry for `key`, if present and its artifact still exists.
    pub fn cached(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.cached(key)
    }

    /// Make sure the media at `url` is cached, fetching it if needed.
    ///
    /// Concurrent calls for the same key share one fetch and observe the
    /// same outcome. A failed or timed-out fetch leaves no entry behind.
    pub async fn ensure_cached(&self, url: &str) -> Result<CachedArtifact, FetchError> {
        let key = self.resolve(url).await?;

        if let Some(entry) = self.cached(&key) {
            tracing::debug!(key = %key, "Cache hit");
            return Ok(CachedArtifact {
                key,
                entry,
                was_cached: true,
            });
        }

        let pending = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.get(&key).cloned() {
                Some(pending) => {
                    tracing::debug!(key = %key, "Joining in-flight fetch");
                    pending
                }
                None => {
                    if let Some(entry) = self.inner.cached(&key) {
                        return Ok(CachedArtifact {
                            key,
                            entry,
                            was_cached: true,
                        });
                    }
                    let pending = self.start_fetch(key.clone(), url.to_string());
                    in_flight.insert(key.clone(), pending.clone());
                    pending
                }
            }
        };

        let entry = pending.await?;
        Ok(CachedArtifact {
            key,
            entry,
            was_cached: false,
        })
    }

    fn start_fetch(&self, key: CacheKey, url: String) -> PendingFetch {
        let slot = SlotRelease {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
        };
        let task = tokio::spawn(async move {
            let outcome = slot.inner.download(&slot.key, &url).await;
            drop(slot);
            outcome
        });

        async move {
            task.await.unwrap_or_else(|e| {
                Err(FetchError::Aborted {
                    key,
                    reason: e.to_string(),
                })
            })
        }
        .boxed()
        .shared()
    }
}

/// Frees a registry slot when the fetch task ends, including by panic.
struct SlotRelease {
    inner: Arc<Inner>,
    key: CacheKey,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        self.inner.in_flight.lock().remove(&self.key);
    }
}

impl Inner {
    fn cached(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.index
            .lookup(key)
            .filter(|entry| self.artifacts.exists(entry.artifact_path()))
    }

    /// Run one fetch to completion. Filesystem work after the fetcher
    /// returns (publishing, removing the superseded file, discarding
    /// partial output) runs on the blocking pool.
    async fn download(self: &Arc<Self>, key: &CacheKey, url: &str) -> FetchOutcome {
        let artifact_id = ArtifactId::new();
        let prefix = self.artifacts.output_prefix(&artifact_id);
        let path = self.artifacts.path_for(&artifact_id);
        let timeout = self.settings.fetch_timeout;
        let started = Instant::now();
        tracing::info!(key = %key, artifact = %artifact_id, "Fetching");

        let fetched = tokio::time::timeout(
            timeout,
            self.fetcher.fetch(url, &prefix, self.artifacts.format()),
        )
        .await;

        let media = match fetched {
            Ok(Ok(media)) => media,
            Ok(Err(e)) => {
                self.abandon(artifact_id).await;
                tracing::warn!(key = %key, error = %e, "Fetch failed");
                return Err(FetchError::Fetch {
                    key: key.clone(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                self.abandon(artifact_id).await;
                tracing::warn!(key = %key, timeout_secs = timeout.as_secs(), "Fetch timed out");
                return Err(FetchError::Timeout {
                    key: key.clone(),
                    after: timeout,
                });
            }
        };

        if !self.artifacts.exists(&path) {
            self.abandon(artifact_id).await;
            return Err(FetchError::Fetch {
                key: key.clone(),
                reason: format!("no artifact produced at {}", path.display()),
            });
        }

        let entry = CacheEntry::new(artifact_id, path, media.into_metadata(), Utc::now());
        let inner = Arc::clone(self);
        let (publish_key, publish_entry) = (key.clone(), entry.clone());
        tokio::task::spawn_blocking(move || inner.publish(publish_key, publish_entry))
            .await
            .map_err(|e| FetchError::Aborted {
                key: key.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            key = %key,
            artifact = %artifact_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetched"
        );
        Ok(entry)
    }

    /// Make `entry` the current one for `key` and drop the file it replaces.
    fn publish(&self, key: CacheKey, entry: CacheEntry) {
        let committed = self.index.replace(key.clone(), entry);
        if let Err(e) = &committed.persisted {
            tracing::error!(key = %key, error = %e, "Cache index not persisted after fetch");
        }
        if let Some(previous) = committed.value {
            if let Err(e) = self.artifacts.remove(previous.artifact_path()) {
                tracing::warn!(key = %key, error = %e, "Could not remove replaced artifact");
            }
        }
    }

    async fn abandon(&self, artifact_id: ArtifactId) {
        let artifacts = self.artifacts.clone();
        match tokio::task::spawn_blocking(move || artifacts.discard(&artifact_id)).await {
            Ok(0) => {}
            Ok(removed) => {
                tracing::debug!(artifact = %artifact_id, removed, "Discarded partial output");
            }
            Err(e) => tracing::warn!(artifact = %artifact_id, error = %e, "Discard task failed"),
        }
    }
}
