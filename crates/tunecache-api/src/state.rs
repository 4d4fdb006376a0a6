//! # Application State
//!
//! Everything a handler needs, built once at startup and cloned into each
//! request. All members are cheap `Arc`-backed handles onto the same
//! underlying cache.

use std::sync::Arc;

use tunecache_fetch::{FetchCoordinator, MediaFetcher};
use tunecache_store::{ArtifactStore, CacheIndex, RetentionSweeper, StoreError, SweepStats};

use crate::config::AppConfig;
use crate::middleware::metrics::ApiMetrics;
use crate::streaming::RangeStreamer;

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub index: CacheIndex,
    pub artifacts: ArtifactStore,
    pub coordinator: FetchCoordinator,
    pub streamer: RangeStreamer,
    pub sweeper: RetentionSweeper,
    pub metrics: ApiMetrics,
}

impl AppState {
    /// Open the artifact directory and load the cache index described by
    /// `config`, wiring `fetcher` in as the media fetch capability.
    pub fn new(config: AppConfig, fetcher: Arc<dyn MediaFetcher>) -> Result<Self, StoreError> {
        let artifacts = ArtifactStore::open(&config.audio_dir)?;
        let index = CacheIndex::open(&config.cache_file)?;
        Ok(Self::from_parts(config, fetcher, index, artifacts))
    }

    /// Assemble state around an already-open index and artifact store.
    pub fn from_parts(
        config: AppConfig,
        fetcher: Arc<dyn MediaFetcher>,
        index: CacheIndex,
        artifacts: ArtifactStore,
    ) -> Self {
        let coordinator = FetchCoordinator::new(
            fetcher,
            index.clone(),
            artifacts.clone(),
            config.fetch_settings(),
        );
        let sweeper = RetentionSweeper::new(index.clone(), artifacts.clone(), config.retention())
            .with_interval(config.sweep_interval());
        Self {
            streamer: RangeStreamer::new(artifacts.clone()),
            config: Arc::new(config),
            index,
            artifacts,
            coordinator,
            sweeper,
            metrics: ApiMetrics::new(),
        }
    }

    /// Cumulative counters of the retention sweeper.
    pub fn sweep_stats(&self) -> SweepStats {
        self.sweeper.stats()
    }
}
