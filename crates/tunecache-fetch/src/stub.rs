//! In-process [`MediaFetcher`] double.
//!
//! Serves a fixed catalogue of URLs, writes the configured bytes as the
//! artifact, and counts calls so tests can assert deduplication.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tunecache_core::AudioFormat;

use crate::error::FetcherError;
use crate::fetcher::{FetchedMedia, MediaFetcher, ProbeInfo};

/// One catalogue item.
#[derive(Debug, Clone)]
pub struct StubMedia {
    pub id: String,
    pub title: String,
    pub duration: f64,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct StubFetcher {
    catalogue: Mutex<HashMap<String, StubMedia>>,
    delay: Duration,
    failing: AtomicBool,
    skip_write: AtomicBool,
    probes: AtomicUsize,
    fetches: AtomicUsize,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `url` as resolving to `id` with the given artifact bytes.
    pub fn with_media(self, url: &str, id: &str, title: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.catalogue.lock().insert(
            url.to_string(),
            StubMedia {
                id: id.to_string(),
                title: title.to_string(),
                duration: 180.0,
                bytes: bytes.into(),
            },
        );
        self
    }

    /// Sleep this long inside every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make subsequent fetches fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make subsequent fetches report success without writing a file.
    pub fn set_skip_write(&self, skip: bool) {
        self.skip_write.store(skip, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn media(&self, url: &str) -> Result<StubMedia, FetcherError> {
        self.catalogue
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| FetcherError::Unsupported(url.to_string()))
    }
}

#[async_trait]
impl MediaFetcher for StubFetcher {
    async fn probe(&self, url: &str) -> Result<ProbeInfo, FetcherError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let media = self.media(url)?;
        Ok(ProbeInfo {
            id: media.id,
            title: Some(media.title),
        })
    }

    async fn fetch(
        &self,
        url: &str,
        output_prefix: &Path,
        format: AudioFormat,
    ) -> Result<FetchedMedia, FetcherError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let media = self.media(url)?;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetcherError::Failed {
                program: "stub".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "ERROR: Video unavailable".to_string(),
            });
        }
        if !self.skip_write.load(Ordering::SeqCst) {
            let mut path = output_prefix.as_os_str().to_os_string();
            path.push(".");
            path.push(format.extension);
            tokio::fs::write(&path, &media.bytes)
                .await
                .map_err(|e| FetcherError::Output {
                    program: "stub".to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(FetchedMedia {
            title: Some(media.title),
            duration: Some(media.duration),
            thumbnail: None,
            uploader: Some("Stub Uploader".to_string()),
        })
    }
}
