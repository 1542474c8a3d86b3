//! Range server (chunkplay-server) - Main entry point
//!
//! Serves one audio track in fixed-duration chunks over HTTP byte ranges.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;

use chunkplay_common::config::{load_toml_config, resolve_config_file};
use chunkplay_common::logging::init_tracing;
use chunkplay_server::api::{self, AppContext};
use chunkplay_server::config::{Config, ConfigOverrides, FileConfig};
use chunkplay_server::TrackStore;

/// Command-line arguments for chunkplay-server
#[derive(Parser, Debug)]
#[command(name = "chunkplay-server")]
#[command(about = "Serves an audio track in byte-range chunks")]
#[command(version)]
struct Args {
    /// Port to listen on [default: 8080]
    #[arg(short, long, env = "CHUNKPLAY_PORT")]
    port: Option<u16>,

    /// Directory holding tracks.json and the audio files [default: tracks]
    #[arg(long, env = "CHUNKPLAY_TRACKS_DIR")]
    tracks_dir: Option<PathBuf>,

    /// Catalog file [default: <tracks-dir>/tracks.json]
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Track served on `/` [default: first catalog entry]
    #[arg(short, long)]
    track: Option<String>,

    /// Duration of one chunk in seconds [default: 15]
    #[arg(long)]
    chunk_secs: Option<u64>,

    /// Answer 404/400 for unknown tracks and malformed ranges instead of 500
    #[arg(long)]
    strict_status: bool,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("chunkplay_server=debug,tower_http=debug");

    let args = Args::parse();

    let config_file = resolve_config_file(args.config.as_deref(), "CHUNKPLAY_SERVER_CONFIG", "server");
    let file_config: FileConfig =
        load_toml_config(config_file.as_deref()).context("Failed to load config file")?;

    let config = Config::resolve(
        ConfigOverrides {
            port: args.port,
            tracks_dir: args.tracks_dir,
            catalog_file: args.catalog,
            track: args.track,
            chunk_secs: args.chunk_secs,
            strict_status: args.strict_status.then_some(true),
        },
        file_config,
    )?;

    let store = Arc::new(match &config.catalog_file {
        Some(catalog) => TrackStore::with_catalog(&config.tracks_dir, catalog),
        None => TrackStore::new(&config.tracks_dir),
    });

    let names = store.list().await.context("Failed to read track catalog")?;
    let track = match config.track.clone() {
        Some(track) => track,
        None => match names.first() {
            Some(first) => first.clone(),
            None => bail!("Catalog in {} is empty", config.tracks_dir.display()),
        },
    };

    let meta = store
        .lookup(&track)
        .await
        .with_context(|| format!("Failed to resolve track '{}'", track))?;
    info!(
        "Serving '{}' ({} bytes, {}s, {} B/s) in {}s chunks",
        meta.name, meta.size, meta.duration_secs, meta.bytes_per_second, config.chunk_secs
    );

    let ctx = AppContext {
        store,
        track: Arc::from(track.as_str()),
        chunk_secs: config.chunk_secs,
        strict_status: config.strict_status,
    };

    info!("Starting server at port {}", config.port);
    api::server::run(config.port, ctx, shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
