//! Track catalog and chunk reads
//!
//! The catalog is a JSON map from track name to `{ "format": "mp3", "length": <seconds> }`
//! stored as `tracks.json` next to the audio files. The audio file for a track is
//! `<tracks_dir>/<name>.<format>`.
//!
//! Nothing is cached: every lookup re-reads the catalog and re-stats the file, so
//! the advertised size always matches what is on disk right now.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use chunkplay_common::protocol::content_type_for;
use chunkplay_common::TrackRate;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, trace};

/// File name of the catalog inside the tracks directory
pub const CATALOG_FILE_NAME: &str = "tracks.json";

/// One catalog entry as persisted on disk
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Container/codec tag, also the file extension (e.g. "mp3")
    pub format: String,
    /// Duration in whole seconds
    pub length: u64,
}

/// Resolved metadata for one track: catalog entry plus live file stat
#[derive(Debug, Clone)]
pub struct TrackMetadata {
    pub name: String,
    pub path: PathBuf,
    pub format: String,
    /// Current file size in bytes
    pub size: u64,
    pub duration_secs: u64,
    /// `size / duration_secs`, floored
    pub bytes_per_second: u64,
    /// File modification time, when the platform reports one
    pub modified: Option<DateTime<Utc>>,
}

impl TrackMetadata {
    pub fn rate(&self) -> TrackRate {
        TrackRate {
            size: self.size,
            duration_secs: self.duration_secs,
        }
    }

    /// Bytes served for a chunk of `chunk_secs` starting at `offset`.
    pub fn chunk_len_at(&self, offset: u64, chunk_secs: u64) -> u64 {
        self.rate().chunk_len_at(offset, chunk_secs)
    }

    pub fn content_type(&self) -> &'static str {
        content_type_for(&self.format)
    }
}

/// Catalog-backed track lookup
#[derive(Debug, Clone)]
pub struct TrackStore {
    tracks_dir: PathBuf,
    catalog_file: PathBuf,
}

impl TrackStore {
    /// Store using `<tracks_dir>/tracks.json` as its catalog.
    pub fn new(tracks_dir: impl Into<PathBuf>) -> Self {
        let tracks_dir = tracks_dir.into();
        let catalog_file = tracks_dir.join(CATALOG_FILE_NAME);
        Self {
            tracks_dir,
            catalog_file,
        }
    }

    /// Store with a catalog outside the tracks directory.
    pub fn with_catalog(tracks_dir: impl Into<PathBuf>, catalog_file: impl Into<PathBuf>) -> Self {
        Self {
            tracks_dir: tracks_dir.into(),
            catalog_file: catalog_file.into(),
        }
    }

    pub fn tracks_dir(&self) -> &Path {
        &self.tracks_dir
    }

    async fn load_catalog(&self) -> Result<HashMap<String, CatalogEntry>> {
        let raw = tokio::fs::read(&self.catalog_file).await.map_err(|e| {
            Error::Catalog(format!(
                "Failed to read {}: {}",
                self.catalog_file.display(),
                e
            ))
        })?;

        serde_json::from_slice(&raw).map_err(|e| {
            Error::Catalog(format!(
                "Failed to parse {}: {}",
                self.catalog_file.display(),
                e
            ))
        })
    }

    /// All track names in the catalog, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.load_catalog().await?.into_keys().collect();
        names.sort();
        Ok(names)
    }

    /// Resolve a track name to its metadata.
    ///
    /// # Errors
    /// - `NotFound` if the name is not in the catalog
    /// - `Catalog` if the catalog cannot be read or the entry has zero length
    /// - `Storage` if the audio file cannot be stat'ed
    pub async fn lookup(&self, name: &str) -> Result<TrackMetadata> {
        let catalog = self.load_catalog().await?;
        let entry = catalog
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        if entry.length == 0 {
            return Err(Error::Catalog(format!("Track '{}' has zero length", name)));
        }

        let path = self.tracks_dir.join(format!("{}.{}", name, entry.format));
        let stat = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Error::storage(&path, e))?;

        let size = stat.len();
        let modified = stat.modified().ok().map(DateTime::<Utc>::from);

        debug!(
            "Resolved track '{}': {} bytes, {}s, {} B/s",
            name,
            size,
            entry.length,
            size / entry.length
        );

        Ok(TrackMetadata {
            name: name.to_string(),
            path,
            format: entry.format.clone(),
            size,
            duration_secs: entry.length,
            bytes_per_second: size / entry.length,
            modified,
        })
    }

    /// Read up to `len` bytes of the track starting at `offset`.
    ///
    /// Returns fewer bytes at end-of-file and an empty vector when `offset`
    /// is at or past the end. The file is opened and closed per call.
    pub async fn read_chunk(&self, track: &TrackMetadata, offset: u64, len: u64) -> Result<Vec<u8>> {
        if len == 0 || offset >= track.size {
            trace!("Empty chunk for '{}' at {}", track.name, offset);
            return Ok(Vec::new());
        }

        let mut file = File::open(&track.path)
            .await
            .map_err(|e| Error::storage(&track.path, e))?;

        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| Error::storage(&track.path, e))?;

        let mut buf = vec![0u8; len as usize];
        let mut filled = 0;
        // The file may have shrunk since it was stat'ed; stop at EOF.
        while filled < buf.len() {
            let n = file
                .read(&mut buf[filled..])
                .await
                .map_err(|e| Error::storage(&track.path, e))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);

        Ok(buf)
    }
}
