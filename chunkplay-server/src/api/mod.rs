//! HTTP interface of the range server
//!
//! Routes:
//! - `HEAD /`, `GET /`: probe and chunk for the configured track
//! - `HEAD /tracks/:name`, `GET /tracks/:name`: same protocol for any catalog entry
//! - `GET /health`

pub mod handlers;
pub mod server;

use crate::store::TrackStore;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// State shared by every handler
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<TrackStore>,
    /// Track served on `/`
    pub track: Arc<str>,
    /// Duration of one chunk in seconds
    pub chunk_secs: u64,
    /// Map client errors to 4xx instead of 500
    pub strict_status: bool,
}

/// Build the router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route(
            "/",
            get(handlers::fetch_default_chunk).head(handlers::probe_default_track),
        )
        .route(
            "/tracks/:name",
            get(handlers::fetch_named_chunk).head(handlers::probe_named_track),
        )
        .route("/health", get(handlers::health))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
}
