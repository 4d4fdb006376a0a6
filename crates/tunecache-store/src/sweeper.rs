//! # Retention Sweeper
//!
//! Periodically evicts cache entries whose `fetched_at` is older than the
//! retention window. Runs as a Tokio task alongside live traffic and stops
//! when its [`CancellationToken`] is cancelled.
//!
//! A sweep works from an immutable snapshot of the index. For each expired
//! entry it deletes the artifact file first; entries whose file cannot be
//! deleted are logged and skipped. The remaining expired entries are then
//! removed through [`CacheIndex::remove_batch`], which rewrites the index
//! file once and leaves alone any entry that was re-fetched since the
//! snapshot was taken.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::artifact::ArtifactStore;
use crate::index::CacheIndex;

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Outcome of a single sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries in the snapshot.
    pub examined: usize,
    /// Entries older than the cutoff.
    pub expired: usize,
    /// Entries removed from the index.
    pub removed: usize,
    /// Expired entries skipped because their artifact could not be deleted.
    pub failed: usize,
}

/// Cumulative sweep counters, shared with whoever reports them.
#[derive(Debug, Clone, Default)]
pub struct SweepStats {
    inner: Arc<StatsInner>,
}

#[derive(Debug, Default)]
struct StatsInner {
    runs: AtomicU64,
    removed: AtomicU64,
    failed: AtomicU64,
}

impl SweepStats {
    fn record(&self, report: &SweepReport) {
        self.inner.runs.fetch_add(1, Ordering::Relaxed);
        self.inner
            .removed
            .fetch_add(report.removed as u64, Ordering::Relaxed);
        self.inner
            .failed
            .fetch_add(report.failed as u64, Ordering::Relaxed);
    }

    /// Completed sweeps.
    pub fn runs(&self) -> u64 {
        self.inner.runs.load(Ordering::Relaxed)
    }

    /// Entries removed across all sweeps.
    pub fn removed(&self) -> u64 {
        self.inner.removed.load(Ordering::Relaxed)
    }

    /// Entries skipped across all sweeps.
    pub fn failed(&self) -> u64 {
        self.inner.failed.load(Ordering::Relaxed)
    }
}

/// Time-based eviction over a [`CacheIndex`] and its [`ArtifactStore`].
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    index: CacheIndex,
    artifacts: ArtifactStore,
    retention: Duration,
    interval: Duration,
    stats: SweepStats,
}

impl RetentionSweeper {
    /// Create a sweeper evicting entries older than `retention`, running
    /// every [`DEFAULT_SWEEP_INTERVAL`].
    pub fn new(index: CacheIndex, artifacts: ArtifactStore, retention: Duration) -> Self {
        Self {
            index,
            artifacts,
            retention,
            interval: DEFAULT_SWEEP_INTERVAL,
            stats: SweepStats::default(),
        }
    }

    /// Override the sweep interval. Clamped to at least one second.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_secs(1));
        self
    }

    /// Configured retention window.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Shared cumulative counters.
    pub fn stats(&self) -> SweepStats {
        self.stats.clone()
    }

    /// Run one sweep against `now`.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let cutoff = chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|window| now.checked_sub_signed(window));
        let snapshot = self.index.snapshot_all();
        let mut report = SweepReport {
            examined: snapshot.len(),
            ..SweepReport::default()
        };
        let Some(cutoff) = cutoff else {
            self.stats.record(&report);
            return report;
        };

        let mut victims = Vec::new();
        for (key, entry) in snapshot.iter().filter(|(_, e)| e.is_expired(cutoff)) {
            report.expired += 1;
            match self.artifacts.remove(entry.artifact_path()) {
                Ok(removal) => {
                    tracing::debug!(key = %key, artifact = %entry.artifact_id, ?removal, "Expired artifact removed");
                    victims.push((key.clone(), entry.artifact_id));
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(key = %key, error = %e, "Cleanup failed for expired entry; skipping");
                }
            }
        }

        let committed = self.index.remove_batch(&victims);
        report.removed = committed.value.len();
        if let Err(e) = committed.persisted {
            tracing::error!(error = %e, "Cache index not persisted after sweep");
        }

        if report.removed > 0 {
            tracing::info!(
                removed = report.removed,
                failed = report.failed,
                "Cleanup: evicted expired artifacts"
            );
        }
        self.stats.record(&report);
        report
    }

    /// Spawn the periodic sweep loop on the current Tokio runtime.
    ///
    /// The first sweep runs one full interval after spawning. Each sweep
    /// runs on the blocking pool because it deletes files.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(
                retention_secs = self.retention.as_secs(),
                interval_secs = self.interval.as_secs(),
                "Retention sweeper started"
            );

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let sweeper = self.clone();
                        let run = tokio::task::spawn_blocking(move || sweeper.sweep(Utc::now()));
                        if let Err(e) = run.await {
                            tracing::error!(error = %e, "Retention sweep panicked");
                        }
                    }
                }
            }
            tracing::info!("Retention sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tunecache_core::{ArtifactId, CacheEntry, CacheKey, TrackMetadata};

    struct Fixture {
        _tmp: tempfile::TempDir,
        index: CacheIndex,
        artifacts: ArtifactStore,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::open(tmp.path().join("audio")).unwrap();
        let index = CacheIndex::open(tmp.path().join("cache.json")).unwrap();
        Fixture {
            _tmp: tmp,
            index,
            artifacts,
        }
    }

    fn add(f: &Fixture, key: &str, age: chrono::Duration) -> CacheEntry {
        let id = ArtifactId::new();
        let path = f.artifacts.path_for(&id);
        fs::write(&path, b"audio").unwrap();
        let entry = CacheEntry::new(id, path, TrackMetadata::default(), Utc::now() - age);
        f.index
            .insert(CacheKey::new(key).unwrap(), entry.clone())
            .into_result()
            .unwrap();
        entry
    }

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn expired_entries_are_removed_and_fresh_survive() {
        let f = fixture();
        let old = add(&f, "old", chrono::Duration::hours(25));
        let fresh = add(&f, "fresh", chrono::Duration::hours(1));
        let sweeper = RetentionSweeper::new(f.index.clone(), f.artifacts.clone(), DAY);

        let report = sweeper.sweep(Utc::now());
        assert_eq!(
            report,
            SweepReport {
                examined: 2,
                expired: 1,
                removed: 1,
                failed: 0
            }
        );
        assert!(f.index.lookup(&CacheKey::new("old").unwrap()).is_none());
        assert!(!old.artifact_path().exists());
        assert!(f.index.lookup(&CacheKey::new("fresh").unwrap()).is_some());
        assert!(fresh.artifact_path().exists());
        assert_eq!(sweeper.stats().removed(), 1);
        assert_eq!(sweeper.stats().runs(), 1);
    }

    #[test]
    fn missing_artifact_does_not_block_eviction() {
        let f = fixture();
        let old = add(&f, "old", chrono::Duration::hours(48));
        fs::remove_file(old.artifact_path()).unwrap();
        let sweeper = RetentionSweeper::new(f.index.clone(), f.artifacts.clone(), DAY);

        let report = sweeper.sweep(Utc::now());
        assert_eq!(report.removed, 1);
        assert!(f.index.is_empty());
    }

    #[test]
    fn undeletable_artifact_is_skipped_without_aborting() {
        let f = fixture();
        let id = ArtifactId::new();
        let stuck_path = f.artifacts.path_for(&id);
        fs::create_dir(&stuck_path).unwrap();
        fs::write(stuck_path.join("x"), b"x").unwrap();
        f.index
            .insert(
                CacheKey::new("stuck").unwrap(),
                CacheEntry::new(
                    id,
                    &stuck_path,
                    TrackMetadata::default(),
                    Utc::now() - chrono::Duration::hours(48),
                ),
            )
            .into_result()
            .unwrap();
        add(&f, "old", chrono::Duration::hours(48));

        let sweeper = RetentionSweeper::new(f.index.clone(), f.artifacts.clone(), DAY);
        let report = sweeper.sweep(Utc::now());
        assert_eq!(report.expired, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.removed, 1);
        assert!(f.index.contains(&CacheKey::new("stuck").unwrap()));
        assert!(!f.index.contains(&CacheKey::new("old").unwrap()));
    }

    #[test]
    fn refetched_entry_survives_a_stale_snapshot() {
        let f = fixture();
        let old = add(&f, "song", chrono::Duration::hours(48));
        let key = CacheKey::new("song").unwrap();

        // Simulate a re-fetch landing between snapshot and removal.
        let victims = vec![(key.clone(), old.artifact_id)];
        let fresh = add(&f, "song", chrono::Duration::zero());
        let removed = f.index.remove_batch(&victims).into_result().unwrap();

        assert!(removed.is_empty());
        assert_eq!(f.index.lookup(&key).unwrap().artifact_id, fresh.artifact_id);
    }

    #[test]
    fn sweep_persists_removals() {
        let f = fixture();
        add(&f, "old", chrono::Duration::hours(30));
        add(&f, "fresh", chrono::Duration::minutes(5));
        let sweeper = RetentionSweeper::new(f.index.clone(), f.artifacts.clone(), DAY);
        sweeper.sweep(Utc::now());

        let reopened = CacheIndex::open(f.index.path().unwrap()).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.contains(&CacheKey::new("fresh").unwrap()));
    }

    #[test]
    fn sweep_rewrites_the_index_once() {
        let f = fixture();
        for k in ["a", "b", "c", "d"] {
            add(&f, k, chrono::Duration::hours(30));
        }
        add(&f, "fresh", chrono::Duration::minutes(5));
        let before = f.index.persisted_generation().unwrap();
        let sweeper = RetentionSweeper::new(f.index.clone(), f.artifacts.clone(), DAY);

        let report = sweeper.sweep(Utc::now());
        assert_eq!(report.removed, 4);
        assert_eq!(f.index.persisted_generation(), Some(before + 1));

        let again = sweeper.sweep(Utc::now());
        assert_eq!(again.removed, 0);
        assert_eq!(f.index.persisted_generation(), Some(before + 1));
    }

    #[test]
    fn interval_is_clamped() {
        let f = fixture();
        let sweeper = RetentionSweeper::new(f.index, f.artifacts, DAY).with_interval(Duration::ZERO);
        assert_eq!(sweeper.interval, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn spawned_sweeper_runs_on_interval_and_stops_on_cancel() {
        let f = fixture();
        add(&f, "old", chrono::Duration::hours(48));
        let sweeper = RetentionSweeper::new(f.index.clone(), f.artifacts.clone(), DAY)
            .with_interval(Duration::from_secs(1));
        let stats = sweeper.stats();
        let cancel = CancellationToken::new();
        let handle = sweeper.spawn(cancel.clone());

        assert_eq!(stats.runs(), 0, "first sweep waits one interval");
        for _ in 0..60 {
            if stats.runs() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(stats.runs() >= 1);
        assert!(f.index.is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
