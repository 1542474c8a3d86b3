//! Track session: probe metadata and ranged chunk fetches
//!
//! One `ClientSession` per streamed track. It owns the offset bookkeeping
//! (`bytes_loaded`, `complete`); only the prefetcher mutates it.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use chunkplay_common::protocol::RangeRequest;
use chunkplay_common::ContentRange;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};
use tracing::{debug, info};
use uuid::Uuid;

/// Track-level metadata learned from the probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackInfo {
    /// Total encoded size of the track in bytes
    pub total_size: u64,
    /// Bytes in the first chunk
    pub chunk_len: u64,
}

/// Extract `TrackInfo` from probe response headers.
///
/// `Content-Length` carries the chunk size and the `Content-Range` denominator
/// carries the total size.
pub fn parse_probe_headers(headers: &HeaderMap) -> Result<TrackInfo> {
    let chunk_len = header_str(headers, CONTENT_LENGTH.as_str())?
        .trim()
        .parse::<u64>()
        .map_err(|e| Error::Protocol(format!("bad Content-Length: {}", e)))?;

    let range: ContentRange = header_str(headers, CONTENT_RANGE.as_str())?.parse()?;

    Ok(TrackInfo {
        total_size: range.total,
        chunk_len,
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str> {
    headers
        .get(name)
        .ok_or_else(|| Error::Protocol(format!("missing {} header", name)))?
        .to_str()
        .map_err(|e| Error::Protocol(format!("non-ascii {} header: {}", name, e)))
}

fn check_status(status: StatusCode) -> Result<()> {
    if status == StatusCode::PARTIAL_CONTENT || status == StatusCode::OK {
        Ok(())
    } else {
        Err(Error::Http(status))
    }
}

/// Issue the metadata probe (HEAD) against `url`.
pub async fn probe(client: &Client, url: &str) -> Result<TrackInfo> {
    let response = client.head(url).send().await?;
    check_status(response.status())?;
    parse_probe_headers(response.headers())
}

/// Build the HTTP client used for every request of a session.
pub fn build_http_client(config: &ClientConfig) -> Result<Client> {
    let mut builder = Client::builder();
    if let Some(timeout) = config.request_timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

/// One chunk as received from the server
#[derive(Debug, Clone)]
pub struct Chunk {
    pub range: ContentRange,
    pub bytes: Vec<u8>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Per-track client state
#[derive(Debug)]
pub struct ClientSession {
    id: Uuid,
    client: Client,
    url: String,
    info: TrackInfo,
    bytes_loaded: u64,
    complete: bool,
}

impl ClientSession {
    /// Probe `config.server_url` and open a session for the track.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let client = build_http_client(config)?;
        let info = probe(&client, &config.server_url).await?;
        Ok(Self::new(client, config.server_url.clone(), info))
    }

    /// Open a session from an already probed track.
    pub fn new(client: Client, url: impl Into<String>, info: TrackInfo) -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            client,
            url: url.into(),
            info,
            bytes_loaded: 0,
            complete: info.total_size == 0,
        };
        info!(
            "Session {} on {}: total {} bytes, chunk {} bytes",
            session.id, session.url, info.total_size, info.chunk_len
        );
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn info(&self) -> TrackInfo {
        self.info
    }

    /// Offset of the next chunk to request
    pub fn bytes_loaded(&self) -> u64 {
        self.bytes_loaded
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Fetch the chunk starting at `offset`.
    ///
    /// The response must be 206 (or 200), start exactly at `offset`, and carry
    /// as many body bytes as its Content-Range announces.
    pub async fn fetch_chunk(&self, offset: u64) -> Result<Chunk> {
        debug!("Session {} requesting {}", self.id, RangeRequest::open_ended(offset));

        let response = self
            .client
            .get(&self.url)
            .header(RANGE, RangeRequest::open_ended(offset))
            .send()
            .await?;
        check_status(response.status())?;

        let range: ContentRange = header_str(response.headers(), CONTENT_RANGE.as_str())?.parse()?;
        if range.start != offset {
            return Err(Error::Protocol(format!(
                "requested offset {} but server sent {}",
                offset, range
            )));
        }

        let bytes = response.bytes().await?.to_vec();
        if bytes.len() as u64 != range.len() {
            return Err(Error::Protocol(format!(
                "{} announced {} bytes but body has {}",
                range,
                range.len(),
                bytes.len()
            )));
        }

        Ok(Chunk { range, bytes })
    }

    /// Record `n` received bytes.
    ///
    /// An empty chunk or reaching the probed total marks the session complete.
    pub fn advance(&mut self, n: u64) {
        self.bytes_loaded += n;
        if n == 0 || self.bytes_loaded >= self.info.total_size {
            if !self.complete {
                info!(
                    "Session {} complete at {} of {} bytes",
                    self.id, self.bytes_loaded, self.info.total_size
                );
            }
            self.complete = true;
        }
    }
}
