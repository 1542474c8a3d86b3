//! Playback: decode from the streaming buffer and feed the audio device
//!
//! The driver only talks to the two traits below. Production code plugs in
//! [`SymphoniaDecoder`] and [`CpalSink`]; tests plug in fakes.

pub mod decoder;
pub mod output;
pub mod ring_buffer;

pub use decoder::SymphoniaDecoder;
pub use output::CpalSink;

use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// PCM layout produced by a decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Source of interleaved f32 PCM
pub trait PcmDecoder {
    fn spec(&self) -> AudioSpec;

    /// Next block of interleaved samples; `None` at end of stream.
    ///
    /// May block while the underlying byte stream is waiting for data.
    fn next_samples(&mut self) -> Result<Option<Vec<f32>>>;
}

/// Destination for interleaved f32 PCM
pub trait PlayerSink {
    fn start(&mut self, spec: AudioSpec) -> Result<()>;

    /// Blocks until every sample has been accepted.
    fn write(&mut self, samples: &[f32]) -> Result<()>;

    /// Blocks until everything written so far has been played.
    fn drain(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Decoded blocks handed to the sink
    pub blocks: u64,
    /// Interleaved samples handed to the sink
    pub samples: u64,
    pub cancelled: bool,
}

/// Pumps a decoder into a sink until end of stream or cancellation
pub struct PlaybackDriver {
    cancel: Arc<AtomicBool>,
}

impl Default for PlaybackDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackDriver {
    pub fn new() -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops the pump at the next block boundary when set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Play the whole stream.
    ///
    /// The sink is stopped on every path; the first decoder or sink error is returned.
    pub fn run<D, S>(&self, decoder: &mut D, sink: &mut S) -> Result<PlaybackStats>
    where
        D: PcmDecoder + ?Sized,
        S: PlayerSink + ?Sized,
    {
        let spec = decoder.spec();
        info!(
            "Starting playback: {} Hz, {} channels",
            spec.sample_rate, spec.channels
        );
        sink.start(spec)?;

        let pumped = self.pump(decoder, sink);
        let drained = match &pumped {
            Ok(stats) if !stats.cancelled => sink.drain(),
            _ => Ok(()),
        };
        let stopped = sink.stop();

        let stats = pumped?;
        drained?;
        if let Err(e) = stopped {
            warn!("Failed to stop audio sink: {}", e);
        }

        info!(
            "Playback finished: {} blocks, {} samples{}",
            stats.blocks,
            stats.samples,
            if stats.cancelled { " (cancelled)" } else { "" }
        );
        Ok(stats)
    }

    fn pump<D, S>(&self, decoder: &mut D, sink: &mut S) -> Result<PlaybackStats>
    where
        D: PcmDecoder + ?Sized,
        S: PlayerSink + ?Sized,
    {
        let mut stats = PlaybackStats::default();

        loop {
            if self.cancel.load(Ordering::Acquire) {
                debug!("Playback cancelled after {} blocks", stats.blocks);
                stats.cancelled = true;
                return Ok(stats);
            }

            let Some(samples) = decoder.next_samples()? else {
                debug!("End of stream after {} blocks", stats.blocks);
                return Ok(stats);
            };

            if samples.is_empty() {
                continue;
            }

            sink.write(&samples)?;
            stats.blocks += 1;
            stats.samples += samples.len() as u64;
        }
    }
}
