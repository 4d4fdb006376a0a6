//! # yt-dlp Fetcher
//!
//! [`MediaFetcher`] implementation that shells out to the `yt-dlp`
//! executable. Both operations ask for `--dump-single-json` and read the
//! info document from stdout; the fetch additionally extracts audio and
//! transcodes it with the configured codec and bitrate.
//!
//! The child process is killed if the calling future is dropped, so a
//! coordinator timeout does not leave orphaned downloads behind.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::process::Command;
use tunecache_core::AudioFormat;

use crate::error::FetcherError;
use crate::fetcher::{FetchedMedia, MediaFetcher, ProbeInfo};

/// Default executable name, resolved through `PATH`.
pub const DEFAULT_PROGRAM: &str = "yt-dlp";

/// Fetcher backed by the `yt-dlp` command-line tool.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    program: PathBuf,
    verbose: bool,
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl YtDlpFetcher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            verbose: false,
        }
    }

    /// Let yt-dlp print warnings and progress to stderr.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn quiet_args(&self) -> Vec<OsString> {
        if self.verbose {
            Vec::new()
        } else {
            vec!["--quiet".into(), "--no-warnings".into()]
        }
    }

    fn probe_args(&self, url: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--dump-single-json".into(),
            "--skip-download".into(),
            "--no-playlist".into(),
        ];
        args.extend(self.quiet_args());
        args.push("--".into());
        args.push(url.into());
        args
    }

    fn fetch_args(&self, url: &str, output_prefix: &Path, format: AudioFormat) -> Vec<OsString> {
        let mut template = output_prefix.as_os_str().to_os_string();
        template.push(".%(ext)s");

        let mut args: Vec<OsString> = vec![
            "-f".into(),
            "bestaudio/best".into(),
            "-x".into(),
            "--audio-format".into(),
            format.codec.into(),
            "--audio-quality".into(),
            format!("{}K", format.quality_kbps).into(),
            "-o".into(),
            template,
            "--dump-single-json".into(),
            "--no-simulate".into(),
            "--no-playlist".into(),
            "--no-progress".into(),
        ];
        args.extend(self.quiet_args());
        args.push("--".into());
        args.push(url.into());
        args
    }

    async fn run<T: DeserializeOwned>(&self, args: Vec<OsString>) -> Result<T, FetcherError> {
        let program = self.program.display().to_string();
        tracing::debug!(program = %program, ?args, "Running fetch program");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FetcherError::Spawn {
                program: program.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetcherError::Failed {
                program,
                status: output.status.to_string(),
                stderr: last_line(&stderr).to_string(),
            });
        }

        parse_info(&output.stdout).map_err(|reason| FetcherError::Output { program, reason })
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn probe(&self, url: &str) -> Result<ProbeInfo, FetcherError> {
        self.run(self.probe_args(url)).await
    }

    async fn fetch(
        &self,
        url: &str,
        output_prefix: &Path,
        format: AudioFormat,
    ) -> Result<FetchedMedia, FetcherError> {
        self.run(self.fetch_args(url, output_prefix, format)).await
    }
}

/// yt-dlp prints the info document as the last non-empty stdout line.
fn parse_info<T: DeserializeOwned>(stdout: &[u8]) -> Result<T, String> {
    let text = String::from_utf8_lossy(stdout);
    let line = last_line(&text);
    if line.is_empty() {
        return Err("empty output".to_string());
    }
    serde_json::from_str(line).map_err(|e| e.to_string())
}

fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
}
