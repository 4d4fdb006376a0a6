//! # tunecache — Binary Entry Point
//!
//! Loads configuration, opens the cache, starts the retention sweeper, and
//! serves HTTP until SIGINT/SIGTERM. On shutdown the sweeper is stopped and
//! the cache index is flushed one last time.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tunecache_api::config::{AppConfig, LogFormat};
use tunecache_api::state::AppState;
use tunecache_fetch::YtDlpFetcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::parse();
    init_tracing(&config);

    tracing::info!(
        addr = %config.bind_addr(),
        audio_dir = %config.audio_dir.display(),
        cleanup_hours = config.cleanup_hours,
        "tunecache starting"
    );

    let fetcher = YtDlpFetcher::new(&config.ytdlp_path).verbose(config.debug);
    let state = AppState::new(config.clone(), Arc::new(fetcher))
        .context("failed to open the audio cache")?;

    let cancel = CancellationToken::new();
    let sweeper = state.sweeper.clone().spawn(cancel.clone());
    let index = state.index.clone();

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;
    tracing::info!("tunecache listening on {}", config.bind_addr());

    axum::serve(listener, tunecache_api::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cancel.cancel();
    if let Err(e) = sweeper.await {
        tracing::error!(error = %e, "Retention sweeper did not stop cleanly");
    }
    index.flush().context("final cache index flush failed")?;
    tracing::info!("tunecache stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_log_filter()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
