//! chunkplay-server configuration
//!
//! Values come from the command line, then the optional TOML file, then the
//! compiled defaults below.

use crate::error::{Error, Result};
use chunkplay_common::protocol::{DEFAULT_CHUNK_SECS, DEFAULT_PORT};
use serde::Deserialize;
use std::path::PathBuf;

/// Default directory holding `tracks.json` and the audio files
pub const DEFAULT_TRACKS_DIR: &str = "tracks";

/// Settings read from the TOML config file. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub tracks_dir: Option<PathBuf>,
    pub catalog_file: Option<PathBuf>,
    pub track: Option<String>,
    pub chunk_secs: Option<u64>,
    pub strict_status: Option<bool>,
}

/// Settings given on the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub tracks_dir: Option<PathBuf>,
    pub catalog_file: Option<PathBuf>,
    pub track: Option<String>,
    pub chunk_secs: Option<u64>,
    pub strict_status: Option<bool>,
}

/// Resolved server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub tracks_dir: PathBuf,
    /// Catalog location; `<tracks_dir>/tracks.json` when unset
    pub catalog_file: Option<PathBuf>,
    /// Track served on `/`; the first catalog entry when unset
    pub track: Option<String>,
    /// Duration of one chunk in seconds
    pub chunk_secs: u64,
    /// Map unknown tracks to 404 and bad ranges to 400 instead of 500
    pub strict_status: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            tracks_dir: PathBuf::from(DEFAULT_TRACKS_DIR),
            catalog_file: None,
            track: None,
            chunk_secs: DEFAULT_CHUNK_SECS,
            strict_status: false,
        }
    }
}

impl Config {
    /// Layer command-line overrides over file settings over defaults.
    pub fn resolve(cli: ConfigOverrides, file: FileConfig) -> Result<Self> {
        let defaults = Config::default();

        let config = Config {
            port: cli.port.or(file.port).unwrap_or(defaults.port),
            tracks_dir: cli
                .tracks_dir
                .or(file.tracks_dir)
                .unwrap_or(defaults.tracks_dir),
            catalog_file: cli.catalog_file.or(file.catalog_file),
            track: cli.track.or(file.track),
            chunk_secs: cli
                .chunk_secs
                .or(file.chunk_secs)
                .unwrap_or(defaults.chunk_secs),
            strict_status: cli
                .strict_status
                .or(file.strict_status)
                .unwrap_or(defaults.strict_status),
        };

        if config.chunk_secs == 0 {
            return Err(Error::Config("chunk_secs must be at least 1".to_string()));
        }

        Ok(config)
    }
}
