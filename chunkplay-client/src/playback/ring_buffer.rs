//! Lock-free ring buffer between the decode thread and the audio callback
//!
//! Single producer (decode thread) and single consumer (cpal callback).
//! The consumer never blocks; an empty ring means the callback plays silence.

use ringbuf::{traits::*, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Default capacity in frames (~0.5s at 44.1kHz)
pub const DEFAULT_CAPACITY: usize = 22_050;

/// One stereo sample pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub left: f32,
    pub right: f32,
}

impl Frame {
    pub const SILENCE: Frame = Frame {
        left: 0.0,
        right: 0.0,
    };

    pub fn from_stereo(left: f32, right: f32) -> Self {
        Self { left, right }
    }
}

/// Frame ring shared by the decode thread and the audio callback
pub struct FrameRing {
    buffer: HeapRb<Frame>,
    underruns: Arc<AtomicU64>,
    overruns: Arc<AtomicU64>,
}

impl FrameRing {
    pub fn new(capacity: Option<usize>) -> Self {
        let capacity = capacity.unwrap_or(DEFAULT_CAPACITY).max(1);
        debug!("Creating frame ring with capacity: {} frames", capacity);

        Self {
            buffer: HeapRb::new(capacity),
            underruns: Arc::new(AtomicU64::new(0)),
            overruns: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn split(self) -> (FrameProducer, FrameConsumer) {
        let (prod, cons) = self.buffer.split();

        let producer = FrameProducer {
            producer: prod,
            overruns: Arc::clone(&self.overruns),
            underruns: Arc::clone(&self.underruns),
        };
        let consumer = FrameConsumer {
            consumer: cons,
            underruns: self.underruns,
        };

        (producer, consumer)
    }
}

/// Producer half (decode thread)
pub struct FrameProducer {
    producer: ringbuf::HeapProd<Frame>,
    overruns: Arc<AtomicU64>,
    underruns: Arc<AtomicU64>,
}

impl FrameProducer {
    /// Push a frame; `false` when the ring is full.
    pub fn push(&mut self, frame: Frame) -> bool {
        match self.producer.try_push(frame) {
            Ok(()) => true,
            Err(_) => {
                let count = self.overruns.fetch_add(1, Ordering::Relaxed) + 1;
                if count % 1000 == 0 {
                    trace!("Frame ring full (total: {})", count);
                }
                false
            }
        }
    }

    pub fn occupied_len(&self) -> usize {
        self.producer.occupied_len()
    }

    pub fn capacity(&self) -> usize {
        self.producer.capacity().into()
    }

    pub fn stats(&self) -> RingStats {
        RingStats {
            underruns: self.underruns.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            capacity: self.capacity(),
            occupied: self.occupied_len(),
        }
    }
}

/// Consumer half (audio callback)
pub struct FrameConsumer {
    consumer: ringbuf::HeapCons<Frame>,
    underruns: Arc<AtomicU64>,
}

impl FrameConsumer {
    /// Pop a frame; `None` on underrun.
    ///
    /// `playing` says whether audio is expected right now. Underruns while
    /// playing are logged at warn level every 1000th occurrence.
    pub fn pop(&mut self, playing: bool) -> Option<Frame> {
        match self.consumer.try_pop() {
            Some(frame) => Some(frame),
            None => {
                let count = self.underruns.fetch_add(1, Ordering::Relaxed) + 1;
                if count % 1000 == 0 {
                    if playing {
                        warn!("Frame ring underrun during playback (total: {})", count);
                    } else {
                        trace!("Frame ring underrun while idle (total: {})", count);
                    }
                }
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RingStats {
    pub underruns: u64,
    pub overruns: u64,
    pub capacity: usize,
    pub occupied: usize,
}
