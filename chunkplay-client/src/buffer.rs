//! Append-only byte buffer shared by the prefetcher and the decoder
//!
//! The prefetcher owns the [`BufferWriter`] and appends each downloaded chunk.
//! The decoder owns the [`BufferReader`] and consumes bytes in append order.
//! Splitting enforces one writer and one reader; neither half is `Clone`.
//!
//! Reads distinguish "nothing buffered yet" from "track finished":
//! - [`BufferReader::try_read`] reports [`ReadOutcome::Pending`] vs [`ReadOutcome::Finished`]
//! - the blocking [`Read`] impl waits while pending and returns `Ok(0)` only once the
//!   writer has finished, so the decoder never sees a transient end-of-stream

use std::io::{self, Read};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

/// Period after which a blocked reader re-checks state even without a notification
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Largest up-front reservation taken from an advertised track size
pub const MAX_PREALLOCATION: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
enum WriterState {
    Open,
    Finished,
    Aborted(String),
}

struct State {
    data: Vec<u8>,
    writer: WriterState,
}

struct Shared {
    state: Mutex<State>,
    data_available: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Growable byte store bridging network chunks and the decoder
pub struct StreamingBuffer {
    shared: Arc<Shared>,
}

impl StreamingBuffer {
    /// Create a buffer pre-sized for `capacity` bytes.
    ///
    /// The capacity is a hint (the probed track size); appends past it still succeed.
    pub fn with_capacity(capacity: usize) -> Self {
        debug!("Creating streaming buffer with capacity {} bytes", capacity);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    data: Vec::with_capacity(capacity),
                    writer: WriterState::Open,
                }),
                data_available: Condvar::new(),
            }),
        }
    }

    /// Create a buffer for a track the server says is `total_size` bytes long.
    ///
    /// The reservation is capped at [`MAX_PREALLOCATION`]; the buffer grows past it on demand.
    pub fn for_track_size(total_size: u64) -> Self {
        let capacity = usize::try_from(total_size)
            .unwrap_or(usize::MAX)
            .min(MAX_PREALLOCATION);
        Self::with_capacity(capacity)
    }

    /// Split into the writer half (prefetcher) and the reader half (decoder).
    pub fn split(self) -> (BufferWriter, BufferReader) {
        let writer = BufferWriter {
            shared: Arc::clone(&self.shared),
        };
        let reader = BufferReader {
            shared: self.shared,
            cursor: 0,
        };
        (writer, reader)
    }
}

/// Write half: append-only
pub struct BufferWriter {
    shared: Arc<Shared>,
}

impl BufferWriter {
    /// Append bytes after everything already buffered and wake the reader.
    pub fn append(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }

        let len = {
            let mut state = self.shared.lock();
            state.data.extend_from_slice(bytes);
            state.data.len()
        };
        trace!("Appended {} bytes, buffer now {} bytes", bytes.len(), len);

        self.shared.data_available.notify_all();
    }

    /// Mark the stream complete: the reader gets end-of-stream once it catches up.
    pub fn finish(&mut self) {
        self.close(WriterState::Finished);
    }

    /// Mark the stream failed: the reader gets an error once it catches up.
    pub fn abort(&mut self, reason: impl Into<String>) {
        self.close(WriterState::Aborted(reason.into()));
    }

    fn close(&mut self, next: WriterState) {
        {
            let mut state = self.shared.lock();
            if state.writer != WriterState::Open {
                return;
            }
            debug!("Streaming buffer closed as {:?} at {} bytes", next, state.data.len());
            state.writer = next;
        }
        self.shared.data_available.notify_all();
    }

    /// Bytes appended so far
    pub fn len(&self) -> usize {
        self.shared.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_finished(&self) -> bool {
        self.shared.lock().writer == WriterState::Finished
    }
}

impl Drop for BufferWriter {
    /// A writer dropped without `finish()` means the download died.
    fn drop(&mut self) {
        self.abort("buffer writer dropped before the track completed");
    }
}

/// Result of a non-blocking read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes copied and the cursor advanced (0 only for an empty destination)
    Data(usize),
    /// Cursor is at the current end; more bytes may still arrive
    Pending,
    /// Cursor is at the end and the writer finished
    Finished,
    /// Cursor is at the end and the writer aborted
    Aborted(String),
}

/// Read half: sequential, forward-only cursor
pub struct BufferReader {
    shared: Arc<Shared>,
    cursor: usize,
}

impl BufferReader {
    /// Copy available bytes at the cursor into `dst` without blocking.
    pub fn try_read(&mut self, dst: &mut [u8]) -> ReadOutcome {
        let shared = Arc::clone(&self.shared);
        let state = shared.lock();
        self.read_locked(&state, dst)
    }

    fn read_locked(&mut self, state: &State, dst: &mut [u8]) -> ReadOutcome {
        let available = state.data.len() - self.cursor;
        if available > 0 && !dst.is_empty() {
            let n = available.min(dst.len());
            dst[..n].copy_from_slice(&state.data[self.cursor..self.cursor + n]);
            self.cursor += n;
            return ReadOutcome::Data(n);
        }

        match &state.writer {
            _ if available > 0 => ReadOutcome::Data(0),
            WriterState::Open => ReadOutcome::Pending,
            WriterState::Finished => ReadOutcome::Finished,
            WriterState::Aborted(reason) => ReadOutcome::Aborted(reason.clone()),
        }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Bytes buffered but not yet consumed
    pub fn available(&self) -> usize {
        self.shared.lock().data.len() - self.cursor
    }
}

impl Read for BufferReader {
    /// Blocks while the buffer is drained but the writer is still open.
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }

        let shared = Arc::clone(&self.shared);
        let mut state = shared.lock();
        let mut waits = 0u32;
        loop {
            match self.read_locked(&state, dst) {
                ReadOutcome::Data(n) => {
                    if waits > 0 {
                        trace!("Reader resumed at {} after {} waits", self.cursor, waits);
                    }
                    return Ok(n);
                }
                ReadOutcome::Finished => return Ok(0),
                ReadOutcome::Aborted(reason) => {
                    return Err(io::Error::new(io::ErrorKind::ConnectionAborted, reason));
                }
                ReadOutcome::Pending => {
                    if waits == 0 {
                        debug!("Reader waiting for data at {}", self.cursor);
                    }
                    waits += 1;
                    state = shared
                        .data_available
                        .wait_timeout(state, WAIT_SLICE)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }
}
