//! Streaming client (chunkplay-client) - Main entry point
//!
//! Probes the server, then plays the track while fetching it chunk by chunk.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use chunkplay_client::app;
use chunkplay_client::config::{ClientConfig, ConfigOverrides, FileConfig};
use chunkplay_common::config::{load_toml_config, resolve_config_file};
use chunkplay_common::logging::init_tracing;

/// Command-line arguments for chunkplay-client
#[derive(Parser, Debug)]
#[command(name = "chunkplay-client")]
#[command(about = "Plays an audio track while streaming it in byte-range chunks")]
#[command(version)]
struct Args {
    /// Server URL [default: http://localhost:8080/]
    #[arg(short, long, env = "CHUNKPLAY_SERVER_URL")]
    server_url: Option<String>,

    /// Seconds between two chunk fetches [default: 5]
    #[arg(short, long)]
    interval_secs: Option<u64>,

    /// Retries for a failed fetch before giving up [default: 0]
    #[arg(long)]
    max_retries: Option<u32>,

    /// Delay before the first retry, doubled per attempt [default: 500]
    #[arg(long)]
    retry_backoff_ms: Option<u64>,

    /// Per-request timeout in seconds [default: none]
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("chunkplay_client=debug");

    let args = Args::parse();

    let config_file = resolve_config_file(args.config.as_deref(), "CHUNKPLAY_CLIENT_CONFIG", "client");
    let file_config: FileConfig =
        load_toml_config(config_file.as_deref()).context("Failed to load config file")?;

    let config = ClientConfig::resolve(
        ConfigOverrides {
            server_url: args.server_url,
            interval_secs: args.interval_secs,
            max_retries: args.max_retries,
            retry_backoff_ms: args.retry_backoff_ms,
            timeout_secs: args.timeout_secs,
        },
        file_config,
    )?;

    info!("Streaming from {}", config.server_url);
    let summary = app::run(config).await.context("Streaming failed")?;

    info!(
        "Done: session {}, {} bytes in {} chunks, {} samples played",
        summary.prefetch.session_id,
        summary.prefetch.bytes_loaded,
        summary.prefetch.chunks,
        summary.playback.samples
    );
    Ok(())
}
