//! # chunkplay common library
//!
//! Shared code for the chunkplay server and client including:
//! - Wire protocol helpers (Range / Content-Range headers)
//! - Chunk sizing math
//! - Configuration file loading
//! - Tracing setup

pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;

pub use error::{Error, Result};
pub use protocol::{ContentRange, TrackRate};
