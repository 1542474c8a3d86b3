//! Audio output using cpal
//!
//! The decode thread pushes frames into a lock-free ring; the cpal callback
//! pops them and plays silence on underrun. Once the writer has signalled end
//! of input and the callback finds the ring empty, it sends one completion
//! message that `drain()` waits for.

use super::ring_buffer::{Frame, FrameConsumer, FrameProducer, FrameRing};
use super::{AudioSpec, PlayerSink};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Pause between two attempts to push into a full ring
const FULL_RING_BACKOFF: Duration = Duration::from_millis(2);

/// Poll period of `drain()` while checking the stream error flag
const DRAIN_POLL: Duration = Duration::from_millis(100);

/// Slack added to the ring duration before `drain()` gives up
const DRAIN_SLACK: Duration = Duration::from_secs(2);

/// State that only exists while a stream is running
struct ActiveStream {
    stream: Stream,
    producer: FrameProducer,
    input_done: Arc<AtomicBool>,
    drained_rx: Receiver<()>,
    sample_rate: u32,
}

/// Default output device fed through a frame ring
pub struct CpalSink {
    device: Device,
    ring_capacity: Option<usize>,
    error_flag: Arc<AtomicBool>,
    active: Option<ActiveStream>,
}

impl CpalSink {
    /// Open the default output device.
    pub fn new() -> Result<Self> {
        Self::with_ring_capacity(None)
    }

    pub fn with_ring_capacity(ring_capacity: Option<usize>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;

        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using default audio device: {}", name);

        Ok(Self {
            device,
            ring_capacity,
            error_flag: Arc::new(AtomicBool::new(false)),
            active: None,
        })
    }

    /// Pick a device configuration for `spec`.
    ///
    /// Prefers a stereo config covering the decoded sample rate in a format the
    /// callback can produce; otherwise falls back to the device default.
    fn best_config(&self, spec: AudioSpec) -> Result<(StreamConfig, SampleFormat)> {
        let rate = cpal::SampleRate(spec.sample_rate);

        let mut supported = self
            .device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported.find(|config| {
            config.channels() == 2
                && config.min_sample_rate() <= rate
                && config.max_sample_rate() >= rate
                && matches!(
                    config.sample_format(),
                    SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
                )
        });

        if let Some(config) = preferred {
            let sample_format = config.sample_format();
            return Ok((config.with_sample_rate(rate).config(), sample_format));
        }

        let fallback = self
            .device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;

        if fallback.sample_rate() != rate {
            warn!(
                "Device cannot play {} Hz, using {} Hz (pitch will differ)",
                spec.sample_rate,
                fallback.sample_rate().0
            );
        }

        let sample_format = fallback.sample_format();
        Ok((fallback.config(), sample_format))
    }

    fn build_stream<T>(
        &self,
        config: &StreamConfig,
        mut consumer: FrameConsumer,
        input_done: Arc<AtomicBool>,
        drained_tx: mpsc::Sender<()>,
    ) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = config.channels as usize;
        let error_flag = Arc::clone(&self.error_flag);
        let mut signalled = false;

        self.device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    for out in data.chunks_mut(channels) {
                        let done = input_done.load(Ordering::Acquire);
                        let frame = match consumer.pop(!done) {
                            Some(frame) => frame,
                            None => {
                                if done && !signalled {
                                    signalled = true;
                                    let _ = drained_tx.send(());
                                }
                                Frame::SILENCE
                            }
                        };
                        write_frame(out, frame);
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    fn check_stream(&self) -> Result<()> {
        if self.error_flag.load(Ordering::SeqCst) {
            return Err(Error::AudioOutput("audio stream reported an error".to_string()));
        }
        Ok(())
    }

    fn active(&mut self) -> Result<&mut ActiveStream> {
        self.active
            .as_mut()
            .ok_or_else(|| Error::AudioOutput("audio stream not started".to_string()))
    }
}

/// Write one stereo frame into a device frame of any width.
fn write_frame<T>(out: &mut [T], frame: Frame)
where
    T: SizedSample + FromSample<f32>,
{
    let left = frame.left.clamp(-1.0, 1.0);
    let right = frame.right.clamp(-1.0, 1.0);

    match out.len() {
        0 => {}
        1 => out[0] = T::from_sample((left + right) / 2.0),
        _ => {
            out[0] = T::from_sample(left);
            out[1] = T::from_sample(right);
            for extra in &mut out[2..] {
                *extra = T::from_sample(0.0f32);
            }
        }
    }
}

impl PlayerSink for CpalSink {
    fn start(&mut self, spec: AudioSpec) -> Result<()> {
        if spec.channels != 2 {
            return Err(Error::AudioOutput(format!(
                "expected interleaved stereo input, got {} channels",
                spec.channels
            )));
        }

        let (config, sample_format) = self.best_config(spec)?;
        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}",
            config.sample_rate.0, config.channels, sample_format
        );

        let (producer, consumer) = FrameRing::new(self.ring_capacity).split();
        let input_done = Arc::new(AtomicBool::new(false));
        let (drained_tx, drained_rx) = mpsc::channel();
        let done = Arc::clone(&input_done);

        let stream = match sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(&config, consumer, done, drained_tx)?,
            SampleFormat::I16 => self.build_stream::<i16>(&config, consumer, done, drained_tx)?,
            SampleFormat::U16 => self.build_stream::<u16>(&config, consumer, done, drained_tx)?,
            other => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;
        info!("Audio stream started");

        self.active = Some(ActiveStream {
            stream,
            producer,
            input_done,
            drained_rx,
            sample_rate: config.sample_rate.0,
        });
        Ok(())
    }

    fn write(&mut self, samples: &[f32]) -> Result<()> {
        self.check_stream()?;
        let error_flag = Arc::clone(&self.error_flag);
        let active = self.active()?;

        for pair in samples.chunks(2) {
            let frame = match pair {
                [left, right] => Frame::from_stereo(*left, *right),
                [mono] => Frame::from_stereo(*mono, *mono),
                _ => continue,
            };
            while !active.producer.push(frame) {
                if error_flag.load(Ordering::SeqCst) {
                    return Err(Error::AudioOutput("audio stream reported an error".to_string()));
                }
                std::thread::sleep(FULL_RING_BACKOFF);
            }
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        let error_flag = Arc::clone(&self.error_flag);
        let active = self.active()?;
        active.input_done.store(true, Ordering::Release);

        let queued = active.producer.occupied_len() as u64;
        let budget = Duration::from_millis(queued * 1000 / u64::from(active.sample_rate.max(1)))
            + DRAIN_SLACK;
        let deadline = Instant::now() + budget;
        debug!("Draining {} queued frames (budget {:?})", queued, budget);

        loop {
            match active.drained_rx.recv_timeout(DRAIN_POLL) {
                Ok(()) => {
                    let stats = active.producer.stats();
                    debug!(
                        "Audio drained (underruns: {}, full-ring waits: {})",
                        stats.underruns, stats.overruns
                    );
                    return Ok(());
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::AudioOutput("audio callback went away".to_string()));
                }
                Err(RecvTimeoutError::Timeout) => {
                    if error_flag.load(Ordering::SeqCst) {
                        return Err(Error::AudioOutput(
                            "audio stream reported an error".to_string(),
                        ));
                    }
                    if Instant::now() >= deadline {
                        return Err(Error::AudioOutput(format!(
                            "audio did not drain within {:?}",
                            budget
                        )));
                    }
                }
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(active) = self.active.take() {
            info!("Stopping audio stream");
            active
                .stream
                .pause()
                .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)))?;
        }
        Ok(())
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
