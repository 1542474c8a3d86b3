//! Wire protocol shared by the range server and the streaming client
//!
//! The protocol is plain HTTP/1.1:
//! - `HEAD /` answers `Content-Length: <chunk bytes>` and
//!   `Content-Range: bytes 0-<chunk bytes>/<total bytes>`
//! - `GET /` with `Range: bytes=<offset>-` answers `206 Partial Content` carrying
//!   one fixed-duration chunk starting at `offset`
//!
//! Content-Range end positions are exclusive (`bytes <offset>-<offset + n>/<total>`).
//! Both sides agree on that, so it is kept even though RFC 7233 uses inclusive ends.

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Default server port
pub const DEFAULT_PORT: u16 = 8080;

/// Default duration of one chunk in seconds
pub const DEFAULT_CHUNK_SECS: u64 = 15;

/// Default period between two prefetches on the client
pub const DEFAULT_PREFETCH_INTERVAL_SECS: u64 = 5;

/// Default server URL used by the client
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080/";

/// MIME type of the streamed audio when the catalog says `mp3`
pub const AUDIO_MPEG: &str = "audio/mpeg";

/// Byte rate of a track, derived from its file size and duration.
///
/// `bytes_per_second = size / duration_secs` with integer (floor) division.
/// The value is fixed for the lifetime of the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackRate {
    /// Total file size in bytes
    pub size: u64,
    /// Track duration in whole seconds (never zero)
    pub duration_secs: u64,
}

impl TrackRate {
    /// Build a rate, rejecting a zero duration.
    pub fn new(size: u64, duration_secs: u64) -> Result<Self> {
        if duration_secs == 0 {
            return Err(Error::InvalidInput(
                "track duration must be at least one second".to_string(),
            ));
        }
        Ok(Self { size, duration_secs })
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.size / self.duration_secs
    }

    /// Bytes in a full chunk of `chunk_secs` seconds, ignoring end-of-file.
    pub fn nominal_chunk_len(&self, chunk_secs: u64) -> u64 {
        chunk_secs.saturating_mul(self.bytes_per_second())
    }

    /// Bytes actually served for a chunk starting at `offset`.
    ///
    /// Clamped to what remains in the file; zero at or past end-of-file.
    pub fn chunk_len_at(&self, offset: u64, chunk_secs: u64) -> u64 {
        self.nominal_chunk_len(chunk_secs)
            .min(self.size.saturating_sub(offset))
    }
}

/// Parsed `Range` request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRequest {
    /// First requested byte
    pub start: u64,
    /// Requested end, if the client sent one. The server serves a fixed-duration
    /// chunk regardless.
    pub end: Option<u64>,
}

impl RangeRequest {
    /// Header value asking for everything from `offset` onward.
    pub fn open_ended(offset: u64) -> String {
        format!("bytes={}-", offset)
    }
}

impl FromStr for RangeRequest {
    type Err = Error;

    /// Parse `bytes=<start>-` or `bytes=<start>-<end>`.
    fn from_str(value: &str) -> Result<Self> {
        let spec = value
            .trim()
            .strip_prefix("bytes=")
            .ok_or_else(|| Error::InvalidInput(format!("unsupported range unit: {}", value)))?;

        let (start, end) = spec
            .split_once('-')
            .ok_or_else(|| Error::InvalidInput(format!("missing '-' in range: {}", value)))?;

        let start = start
            .trim()
            .parse::<u64>()
            .map_err(|e| Error::InvalidInput(format!("bad range start '{}': {}", start, e)))?;

        let end = match end.trim() {
            "" => None,
            end => Some(
                end.parse::<u64>()
                    .map_err(|e| Error::InvalidInput(format!("bad range end '{}': {}", end, e)))?,
            ),
        };

        Ok(Self { start, end })
    }
}

/// `Content-Range` header value: `bytes <start>-<end>/<total>` with exclusive `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ContentRange {
    /// Range describing `len` bytes served from `start`.
    pub fn for_chunk(start: u64, len: u64, total: u64) -> Self {
        Self {
            start,
            end: start + len,
            total,
        }
    }

    /// Number of bytes covered by the range.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

impl FromStr for ContentRange {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let spec = value
            .trim()
            .strip_prefix("bytes ")
            .ok_or_else(|| Error::InvalidInput(format!("unsupported content-range: {}", value)))?;

        let (range, total) = spec
            .split_once('/')
            .ok_or_else(|| Error::InvalidInput(format!("missing total in content-range: {}", value)))?;
        let (start, end) = range
            .split_once('-')
            .ok_or_else(|| Error::InvalidInput(format!("missing '-' in content-range: {}", value)))?;

        let parse = |field: &str, name: &str| {
            field
                .trim()
                .parse::<u64>()
                .map_err(|e| Error::InvalidInput(format!("bad content-range {} '{}': {}", name, field, e)))
        };

        let parsed = Self {
            start: parse(start, "start")?,
            end: parse(end, "end")?,
            total: parse(total, "total")?,
        };

        if parsed.end < parsed.start {
            return Err(Error::InvalidInput(format!(
                "content-range end before start: {}",
                value
            )));
        }

        Ok(parsed)
    }
}

/// MIME type for a catalog format tag.
pub fn content_type_for(format: &str) -> &'static str {
    match format.to_ascii_lowercase().as_str() {
        "mp3" => AUDIO_MPEG,
        "flac" => "audio/flac",
        "ogg" | "oga" => "audio/ogg",
        "wav" => "audio/wav",
        "m4a" | "aac" => "audio/mp4",
        _ => "application/octet-stream",
    }
}
