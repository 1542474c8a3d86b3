//! Error types for chunkplay-server

use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the range server
#[derive(Error, Debug)]
pub enum Error {
    /// Track name absent from the catalog
    #[error("Track not found: {0}")]
    NotFound(String),

    /// Backing audio file could not be stat'ed, opened, or read
    #[error("Storage error on {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Catalog unreadable, not valid JSON, or holding an unusable entry
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Malformed `Range` header
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),
}

impl Error {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Storage {
            path: path.into(),
            source,
        }
    }

    /// Status code sent to the client for this error.
    ///
    /// Every failure is a 500 unless `strict` is set, in which case unknown
    /// tracks map to 404 and malformed ranges to 400.
    pub fn status_code(&self, strict: bool) -> StatusCode {
        match self {
            Error::NotFound(_) if strict => StatusCode::NOT_FOUND,
            Error::InvalidRange(_) if strict => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<chunkplay_common::Error> for Error {
    fn from(err: chunkplay_common::Error) -> Self {
        match err {
            chunkplay_common::Error::InvalidInput(msg) => Error::InvalidRange(msg),
            chunkplay_common::Error::Config(msg) => Error::Config(msg),
            chunkplay_common::Error::Io(e) => Error::Config(e.to_string()),
        }
    }
}

/// Convenience Result type using the server Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_everything_is_500_by_default() {
        let errors = [
            Error::NotFound("a".into()),
            Error::InvalidRange("bytes=x-".into()),
            Error::Catalog("bad json".into()),
            Error::storage("/tmp/a.mp3", std::io::Error::from(std::io::ErrorKind::NotFound)),
        ];
        for err in &errors {
            assert_eq!(err.status_code(false), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn test_strict_mode_distinguishes_client_errors() {
        assert_eq!(Error::NotFound("a".into()).status_code(true), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::InvalidRange("x".into()).status_code(true),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Catalog("x".into()).status_code(true),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
