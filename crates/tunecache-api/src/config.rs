//! # Service Configuration
//!
//! Every setting is a command-line flag with an environment variable
//! fallback, so deployments that only set `AUDIO_DIR`, `CACHE_FILE`,
//! `CLEANUP_HOURS`, `DEBUG_MODE`, `HOST` and `PORT` keep working.

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::FalseyValueParser;
use clap::{Parser, ValueEnum};
use tunecache_fetch::FetchSettings;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// tunecache: local audio cache and range streaming server.
#[derive(Parser, Debug, Clone)]
#[command(name = "tunecache", version, about, long_about = None)]
pub struct AppConfig {
    /// Address to listen on.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Directory holding transcoded audio artifacts.
    #[arg(long, env = "AUDIO_DIR", default_value = "./audio")]
    pub audio_dir: PathBuf,

    /// Path of the persisted cache index.
    #[arg(long, env = "CACHE_FILE", default_value = "./cache.json")]
    pub cache_file: PathBuf,

    /// Retention window in hours; older entries are evicted.
    #[arg(long, env = "CLEANUP_HOURS", default_value_t = 24)]
    pub cleanup_hours: u64,

    /// Seconds between retention sweeps.
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value_t = 3600)]
    pub sweep_interval_secs: u64,

    /// Upper bound on a single download plus transcode, in seconds.
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 600)]
    pub fetch_timeout_secs: u64,

    /// yt-dlp executable.
    #[arg(long, env = "YTDLP_PATH", default_value = "yt-dlp")]
    pub ytdlp_path: PathBuf,

    /// Debug logging and verbose fetcher output. From the environment,
    /// `false`, `no`, `off`, `0` and the empty string (any case) disable it.
    #[arg(long, env = "DEBUG_MODE", value_parser = FalseyValueParser::new())]
    pub debug: bool,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            audio_dir: PathBuf::from("./audio"),
            cache_file: PathBuf::from("./cache.json"),
            cleanup_hours: 24,
            sweep_interval_secs: 3600,
            fetch_timeout_secs: 600,
            ytdlp_path: PathBuf::from("yt-dlp"),
            debug: false,
            log_format: LogFormat::Text,
        }
    }
}

impl AppConfig {
    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.cleanup_hours.saturating_mul(60 * 60))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            ..FetchSettings::default()
        }
    }

    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub fn default_log_filter(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}
