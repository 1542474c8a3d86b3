//! MP3 decoding from the streaming buffer using symphonia
//!
//! The byte source is forward-only: symphonia reads through `ReadOnlySource`,
//! which blocks whenever the prefetcher has not delivered the next bytes yet.
//! End of stream is only reported once the buffer writer has finished.
//!
//! Output is always interleaved stereo f32: mono is duplicated, wider layouts
//! are folded down by averaging the even channels into left and the odd ones into right.

use super::{AudioSpec, PcmDecoder};
use crate::buffer::BufferReader;
use crate::error::{Error, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Rate assumed when the stream does not announce one before the first packet
const FALLBACK_SAMPLE_RATE: u32 = 44_100;

/// Channel count of every block returned by the decoder
pub const OUTPUT_CHANNELS: u16 = 2;

pub struct SymphoniaDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    sample_buf: Option<SampleBuffer<f32>>,
}

impl SymphoniaDecoder {
    /// Probe the stream and set up an mp3 decoder.
    ///
    /// Blocks until enough bytes have arrived to identify the format.
    pub fn new(reader: BufferReader) -> Result<Self> {
        Self::with_extension(reader, "mp3")
    }

    pub fn with_extension(reader: BufferReader, extension: &str) -> Result<Self> {
        let source = ReadOnlySource::new(reader);
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        let mut hint = Hint::new();
        hint.with_extension(extension);

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or_else(|| {
            warn!("Stream has no sample rate, assuming {} Hz", FALLBACK_SAMPLE_RATE);
            FALLBACK_SAMPLE_RATE
        });

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        debug!(
            "Decoder ready: track {}, {} Hz, source channels {:?}",
            track_id,
            sample_rate,
            track.codec_params.channels.map(|c| c.count())
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            sample_buf: None,
        })
    }
}

impl PcmDecoder for SymphoniaDecoder {
    fn spec(&self) -> AudioSpec {
        AudioSpec {
            sample_rate: self.sample_rate,
            channels: OUTPUT_CHANNELS,
        }
    }

    fn next_samples(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("Reached end of stream");
                    return Ok(None);
                }
                Err(e) => return Err(Error::Decode(format!("Failed to read packet: {}", e))),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(e) => return Err(Error::Decode(format!("Decode error: {}", e))),
            };

            let spec = *decoded.spec();
            let capacity = decoded.capacity() as u64;
            let needs_alloc = self
                .sample_buf
                .as_ref()
                .map_or(true, |buf| buf.capacity() < decoded.capacity() * spec.channels.count());
            if needs_alloc {
                self.sample_buf = None;
            }

            let buf = self
                .sample_buf
                .get_or_insert_with(|| SampleBuffer::new(capacity, spec));
            buf.copy_interleaved_ref(decoded);

            return Ok(Some(to_stereo(buf.samples(), spec.channels.count())));
        }
    }
}

/// Fold interleaved samples with `channels` channels into interleaved stereo.
pub fn to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        2 => samples.to_vec(),
        _ => {
            // Even channels go left, odd right; odd counts give the left side one more.
            let left_count = channels.div_ceil(2) as f32;
            let right_count = (channels / 2) as f32;
            let mut stereo = Vec::with_capacity(samples.len() / channels * 2);
            for frame in samples.chunks_exact(channels) {
                let (mut left, mut right) = (0.0f32, 0.0f32);
                for (ch, &sample) in frame.iter().enumerate() {
                    if ch % 2 == 0 {
                        left += sample;
                    } else {
                        right += sample;
                    }
                }
                stereo.push(left / left_count);
                stereo.push(right / right_count);
            }
            stereo
        }
    }
}
