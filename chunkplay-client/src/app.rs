//! Client orchestration
//!
//! probe -> buffer -> first chunk -> prefetcher task + playback thread.
//! Playback ending shuts the prefetcher down; a fatal prefetch error cancels
//! playback and is returned.

use crate::buffer::{BufferReader, StreamingBuffer};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::playback::{CpalSink, PlaybackDriver, PlaybackStats, SymphoniaDecoder};
use crate::prefetch::{PrefetchPolicy, PrefetchSummary, Prefetcher};
use crate::session::ClientSession;
use std::sync::atomic::Ordering;
use tokio::sync::watch;
use tracing::{error, info};

/// What one streamed track amounted to
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub prefetch: PrefetchSummary,
    pub playback: PlaybackStats,
}

/// Stream the track at `config.server_url` to the default audio device.
pub async fn run(config: ClientConfig) -> Result<RunSummary> {
    run_with(config, play_to_device).await
}

fn play_to_device(reader: BufferReader, driver: PlaybackDriver) -> Result<PlaybackStats> {
    let mut decoder = SymphoniaDecoder::new(reader)?;
    let mut sink = CpalSink::new()?;
    driver.run(&mut decoder, &mut sink)
}

/// Same as [`run`] with a custom playback stage.
///
/// `playback` runs on a blocking thread and owns the buffer's read half.
pub async fn run_with<P>(config: ClientConfig, playback: P) -> Result<RunSummary>
where
    P: FnOnce(BufferReader, PlaybackDriver) -> Result<PlaybackStats> + Send + 'static,
{
    let session = ClientSession::connect(&config).await?;
    let info = session.info();

    let (writer, reader) = StreamingBuffer::for_track_size(info.total_size).split();

    let mut prefetcher = Prefetcher::new(session, writer, PrefetchPolicy::from(&config));
    let first = prefetcher.fetch_next().await?;
    info!("First chunk loaded ({} bytes), starting playback", first);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut prefetch = prefetcher.spawn(shutdown_rx);

    let driver = PlaybackDriver::new();
    let cancel = driver.cancel_handle();
    let mut playing = tokio::task::spawn_blocking(move || playback(reader, driver));

    tokio::select! {
        played = &mut playing => {
            let _ = shutdown_tx.send(true);
            let fetched = prefetch.await?;

            // A failed download also breaks playback; report the download error.
            match (played?, fetched) {
                (Ok(playback), Ok(prefetch)) => Ok(RunSummary { prefetch, playback }),
                (_, Err(e)) => Err(e),
                (Err(e), Ok(_)) => Err(e),
            }
        }
        fetched = &mut prefetch => {
            match fetched? {
                Ok(prefetch) => {
                    info!(
                        "Track fully loaded ({} bytes in {} chunks), waiting for playback",
                        prefetch.bytes_loaded, prefetch.chunks
                    );
                    let playback = playing.await??;
                    Ok(RunSummary { prefetch, playback })
                }
                Err(e) => {
                    error!("Prefetch failed, stopping playback: {}", e);
                    cancel.store(true, Ordering::Release);
                    let _ = playing.await;
                    Err(e)
                }
            }
        }
    }
}
