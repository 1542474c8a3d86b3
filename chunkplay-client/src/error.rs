//! Error types for chunkplay-client
//!
//! Network and 5xx failures are classified as transient so the prefetcher
//! can retry them when configured to. Everything else is fatal.

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for chunkplay-client
#[derive(Error, Debug)]
pub enum Error {
    /// Server answered with headers or ranges the client cannot use
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Transport failure (connect, timeout, broken body)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Server answered with an unexpected status
    #[error("HTTP status {0}")]
    Http(StatusCode),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A background task panicked or was cancelled
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Http(status) => status.is_server_error(),
            _ => false,
        }
    }
}

impl From<chunkplay_common::Error> for Error {
    fn from(err: chunkplay_common::Error) -> Self {
        match err {
            chunkplay_common::Error::Io(e) => Error::Io(e),
            chunkplay_common::Error::Config(msg) => Error::Config(msg),
            chunkplay_common::Error::InvalidInput(msg) => Error::Protocol(msg),
        }
    }
}

/// Convenience Result type using chunkplay-client Error
pub type Result<T> = std::result::Result<T, Error>;
