//! # chunkplay range server (chunkplay-server)
//!
//! Serves one audio track in fixed-duration chunks over HTTP byte-range requests.
//!
//! **Architecture:** JSON catalog + file stat (TrackStore) behind an axum router
//! (RangeServer). Every request opens, reads, and closes its own file handle.

pub mod api;
pub mod config;
pub mod error;
pub mod store;

pub use error::{Error, Result};
pub use store::{TrackMetadata, TrackStore};
