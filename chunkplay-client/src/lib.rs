//! # chunkplay client
//!
//! Streams one audio track from a chunkplay server and plays it while it
//! downloads:
//! - `session`: metadata probe and ranged chunk fetches
//! - `buffer`: append-only byte buffer between network and decoder
//! - `prefetch`: periodic fetch task
//! - `playback`: decoder and audio sink driven by `PlaybackDriver`
//! - `app`: wires the pieces together

pub mod app;
pub mod buffer;
pub mod config;
pub mod error;
pub mod playback;
pub mod prefetch;
pub mod session;

pub use buffer::{BufferReader, BufferWriter, ReadOutcome, StreamingBuffer};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use session::{ClientSession, TrackInfo};
