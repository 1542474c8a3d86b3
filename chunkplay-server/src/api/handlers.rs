//! HTTP request handlers
//!
//! Implements the metadata probe (HEAD) and the chunked GET.
//! Every failure is logged here and answered with an empty body.

use super::AppContext;
use crate::error::Error;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    Json,
};
use chunkplay_common::protocol::RangeRequest;
use chunkplay_common::ContentRange;
use serde::Serialize;
use tracing::{debug, error, info};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    git_hash: String,
    build_timestamp: String,
    track: String,
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "chunkplay-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        track: ctx.track.to_string(),
    })
}

// ============================================================================
// Track Endpoints
// ============================================================================

/// HEAD / - Probe the configured track
pub async fn probe_default_track(State(ctx): State<AppContext>) -> Result<Response, StatusCode> {
    let name = ctx.track.clone();
    probe_track(&ctx, &name).await
}

/// HEAD /tracks/:name - Probe a catalog track by name
pub async fn probe_named_track(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
) -> Result<Response, StatusCode> {
    probe_track(&ctx, &name).await
}

/// GET / - One chunk of the configured track
pub async fn fetch_default_chunk(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    let name = ctx.track.clone();
    serve_chunk(&ctx, &name, &headers).await
}

/// GET /tracks/:name - One chunk of a catalog track by name
pub async fn fetch_named_chunk(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    serve_chunk(&ctx, &name, &headers).await
}

/// Headers only: the size of the first chunk and the size of the whole track.
///
/// `Content-Length` is the first chunk's length (clamped to the file), and the
/// Content-Range denominator is the total size.
async fn probe_track(ctx: &AppContext, name: &str) -> Result<Response, StatusCode> {
    let track = ctx
        .store
        .lookup(name)
        .await
        .map_err(|e| reject(ctx, "getting track info", e))?;

    let chunk_len = track.chunk_len_at(0, ctx.chunk_secs);
    let range = ContentRange::for_chunk(0, chunk_len, track.size);

    info!(
        "Probe '{}': chunk {} bytes, total {} bytes",
        track.name, chunk_len, track.size
    );

    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(header::CONTENT_TYPE, track.content_type())
        .header(header::CONTENT_LENGTH, chunk_len.to_string())
        .header(header::CONTENT_RANGE, range.to_string())
        .header(header::ACCEPT_RANGES, "bytes")
        .body(Body::empty())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// One fixed-duration chunk starting at the requested offset.
///
/// An offset at or past the end yields `206` with an empty body so the client
/// can detect end-of-track.
async fn serve_chunk(
    ctx: &AppContext,
    name: &str,
    headers: &HeaderMap,
) -> Result<Response, StatusCode> {
    let offset = requested_offset(headers).map_err(|e| reject(ctx, "reading range requested", e))?;

    let track = ctx
        .store
        .lookup(name)
        .await
        .map_err(|e| reject(ctx, "getting track info", e))?;

    let len = track.chunk_len_at(offset, ctx.chunk_secs);
    let bytes = ctx
        .store
        .read_chunk(&track, offset, len)
        .await
        .map_err(|e| reject(ctx, "reading chunk", e))?;

    let n = bytes.len() as u64;
    let range = ContentRange::for_chunk(offset, n, track.size);

    info!("Serving '{}' {}", track.name, range);

    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(header::CONTENT_TYPE, track.content_type())
        .header(header::CONTENT_LENGTH, n.to_string())
        .header(header::CONTENT_RANGE, range.to_string())
        .header(header::ACCEPT_RANGES, "bytes")
        .body(Body::from(bytes))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Start offset from the `Range` header; 0 when the header is absent.
fn requested_offset(headers: &HeaderMap) -> crate::Result<u64> {
    let Some(value) = headers.get(header::RANGE) else {
        return Ok(0);
    };

    let value = value
        .to_str()
        .map_err(|e| Error::InvalidRange(format!("non-ascii range header: {}", e)))?;
    debug!("Range {}", value);

    let range: RangeRequest = value.parse()?;
    if let Some(end) = range.end {
        debug!("Ignoring requested range end {}, serving one chunk", end);
    }

    Ok(range.start)
}

fn reject(ctx: &AppContext, context: &str, err: Error) -> StatusCode {
    error!("{}: {}", context, err);
    err.status_code(ctx.strict_status)
}
