//! Periodic chunk prefetcher
//!
//! Fetches the next chunk once per interval, appends it to the streaming
//! buffer and advances the session. The task ends when the track is complete,
//! on shutdown, or on the first fatal error.

use crate::buffer::BufferWriter;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::session::{Chunk, ClientSession};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Scheduling and retry settings for the prefetcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchPolicy {
    pub interval: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl From<&ClientConfig> for PrefetchPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            interval: config.interval,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
        }
    }
}

/// Outcome of a finished prefetch task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchSummary {
    pub session_id: Uuid,
    pub bytes_loaded: u64,
    pub chunks: u64,
    pub complete: bool,
}

pub struct Prefetcher {
    session: ClientSession,
    writer: BufferWriter,
    policy: PrefetchPolicy,
    chunks: u64,
}

impl Prefetcher {
    pub fn new(session: ClientSession, writer: BufferWriter, policy: PrefetchPolicy) -> Self {
        Self {
            session,
            writer,
            policy,
            chunks: 0,
        }
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    /// Fetch one chunk at the current offset and append it.
    ///
    /// Returns the number of bytes appended; 0 once the track is complete.
    pub async fn fetch_next(&mut self) -> Result<usize> {
        if self.session.is_complete() {
            self.writer.finish();
            return Ok(0);
        }

        let offset = self.session.bytes_loaded();
        let chunk = self.fetch_with_retry(offset).await?;
        let n = chunk.len();

        self.writer.append(&chunk.bytes);
        self.session.advance(n as u64);
        self.chunks += 1;

        info!(
            "Prefetched {} ({} bytes), loaded {} of {}",
            chunk.range,
            n,
            self.session.bytes_loaded(),
            self.session.info().total_size
        );

        if self.session.is_complete() {
            self.writer.finish();
        }

        Ok(n)
    }

    async fn fetch_with_retry(&self, offset: u64) -> Result<Chunk> {
        let mut attempt = 0u32;
        loop {
            match self.session.fetch_chunk(offset).await {
                Ok(chunk) => return Ok(chunk),
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.retry_backoff.saturating_mul(1u32 << attempt.min(16));
                    attempt += 1;
                    warn!(
                        "Fetch at {} failed ({}), retry {}/{} in {:?}",
                        offset, e, attempt, self.policy.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run until the track is complete or `shutdown` flips to `true`.
    ///
    /// The first tick fires one full interval after start; the caller fetches
    /// the first chunk itself.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<PrefetchSummary> {
        let period = self.policy.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!("Prefetcher for session {} every {:?}", self.session.id(), period);

        loop {
            if self.session.is_complete() {
                self.writer.finish();
                break;
            }
            if *shutdown.borrow() {
                info!("Prefetcher shutting down before track completed");
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.fetch_next().await {
                        error!("Prefetch failed at {}: {}", self.session.bytes_loaded(), e);
                        self.writer.abort(e.to_string());
                        return Err(e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("Shutdown sender dropped, stopping prefetcher");
                        break;
                    }
                }
            }
        }

        Ok(self.summary())
    }

    /// Run on the current tokio runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<Result<PrefetchSummary>> {
        let span = info_span!("prefetch", session = %self.session.id());
        tokio::spawn(self.run(shutdown).instrument(span))
    }

    fn summary(&self) -> PrefetchSummary {
        PrefetchSummary {
            session_id: self.session.id(),
            bytes_loaded: self.session.bytes_loaded(),
            chunks: self.chunks,
            complete: self.session.is_complete(),
        }
    }
}
