//! End-to-end tests: client session, prefetcher and orchestration against a
//! real HTTP server on a loopback port.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};

use chunkplay_client::app;
use chunkplay_client::playback::PlaybackStats;
use chunkplay_client::prefetch::{PrefetchPolicy, Prefetcher};
use chunkplay_client::{ClientConfig, ClientSession, Error, ReadOutcome, StreamingBuffer};
use chunkplay_common::protocol::RangeRequest;
use chunkplay_server::api::{server, AppContext};
use chunkplay_server::TrackStore;

fn pattern(i: usize) -> u8 {
    (i % 251) as u8
}

fn track_bytes(size: usize) -> Vec<u8> {
    (0..size).map(pattern).collect()
}

fn write_fixture(dir: &Path, size: usize, length_secs: u64) {
    std::fs::write(dir.join("song.mp3"), track_bytes(size)).unwrap();
    std::fs::write(
        dir.join("tracks.json"),
        format!(r#"{{"song": {{"format": "mp3", "length": {}}}}}"#, length_secs),
    )
    .unwrap();
}

/// Range server on 127.0.0.1 serving one `song` track
struct TestServer {
    url: String,
    _dir: TempDir,
    _shutdown: oneshot::Sender<()>,
}

async fn start_server(size: usize, length_secs: u64, chunk_secs: u64) -> TestServer {
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path(), size, length_secs);

    let ctx = AppContext {
        store: Arc::new(TrackStore::new(dir.path())),
        track: Arc::from("song"),
        chunk_secs,
        strict_status: false,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(server::serve(listener, ctx, async {
        let _ = rx.await;
    }));

    TestServer {
        url: format!("http://{}/", addr),
        _dir: dir,
        _shutdown: tx,
    }
}

/// Hand-written server for misbehaviour the real one never shows
#[derive(Clone)]
struct Scripted {
    data: Arc<Vec<u8>>,
    chunk: usize,
    failures_left: Arc<AtomicUsize>,
    /// Every GET from this index on fails
    fail_from: usize,
    fail_status: StatusCode,
    gets: Arc<AtomicUsize>,
    skew_start: bool,
    /// Total reported by HEAD instead of the real length
    advertised_total: Option<u64>,
}

impl Scripted {
    fn new(size: usize, chunk: usize) -> Self {
        Self {
            data: Arc::new(track_bytes(size)),
            chunk,
            failures_left: Arc::new(AtomicUsize::new(0)),
            fail_from: usize::MAX,
            fail_status: StatusCode::SERVICE_UNAVAILABLE,
            gets: Arc::new(AtomicUsize::new(0)),
            skew_start: false,
            advertised_total: None,
        }
    }

    fn failing(self, failures: usize, status: StatusCode) -> Self {
        self.failures_left.store(failures, Ordering::SeqCst);
        Self {
            fail_status: status,
            ..self
        }
    }
}

async fn scripted_head(State(s): State<Scripted>) -> Response {
    let total = s.data.len();
    let len = s.chunk.min(total);
    let advertised = s.advertised_total.unwrap_or(total as u64);
    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(header::CONTENT_LENGTH, len.to_string())
        .header(header::CONTENT_RANGE, format!("bytes 0-{}/{}", len, advertised))
        .body(Body::empty())
        .unwrap()
}

async fn scripted_get(State(s): State<Scripted>, headers: HeaderMap) -> Response {
    let index = s.gets.fetch_add(1, Ordering::SeqCst);

    let failing = index >= s.fail_from
        || s
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
    if failing {
        return Response::builder()
            .status(s.fail_status)
            .body(Body::empty())
            .unwrap();
    }

    let total = s.data.len();
    let start = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<RangeRequest>().ok())
        .map(|r| r.start as usize)
        .unwrap_or(0)
        .min(total);
    let end = (start + s.chunk).min(total);
    let reported = if s.skew_start { start + 1 } else { start };

    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", reported, reported + (end - start), total),
        )
        .body(Body::from(s.data[start..end].to_vec()))
        .unwrap()
}

async fn start_scripted(script: Scripted) -> (String, oneshot::Sender<()>) {
    let router = Router::new()
        .route("/", get(scripted_get).head(scripted_head))
        .with_state(script);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });

    (format!("http://{}/", addr), tx)
}

fn config(url: &str) -> ClientConfig {
    ClientConfig {
        server_url: url.to_string(),
        interval: Duration::from_millis(20),
        max_retries: 0,
        retry_backoff: Duration::from_millis(10),
        request_timeout: Some(Duration::from_secs(5)),
    }
}

#[tokio::test]
async fn test_probe_reads_chunk_and_total() {
    let server = start_server(100_000, 15, 15).await;

    let session = ClientSession::connect(&config(&server.url)).await.unwrap();

    assert_eq!(session.info().total_size, 100_000);
    assert_eq!(session.info().chunk_len, 99_990);
    assert_eq!(session.bytes_loaded(), 0);
    assert!(!session.is_complete());
}

#[tokio::test]
async fn test_two_prefetch_cycles_concatenate() {
    // 10000 B/s, 3s chunks: 30000 bytes each
    let server = start_server(100_000, 10, 3).await;
    let cfg = config(&server.url);

    let session = ClientSession::connect(&cfg).await.unwrap();
    let (writer, mut reader) = StreamingBuffer::with_capacity(100_000).split();
    let mut prefetcher = Prefetcher::new(session, writer, PrefetchPolicy::from(&cfg));

    assert_eq!(prefetcher.fetch_next().await.unwrap(), 30_000);
    assert_eq!(prefetcher.fetch_next().await.unwrap(), 30_000);
    assert_eq!(prefetcher.session().bytes_loaded(), 60_000);

    let mut out = vec![0u8; 100_000];
    assert_eq!(reader.try_read(&mut out), ReadOutcome::Data(60_000));
    assert_eq!(&out[..60_000], &track_bytes(100_000)[..60_000]);
    assert_eq!(reader.try_read(&mut out), ReadOutcome::Pending);
}

#[tokio::test]
async fn test_offset_advances_by_received_bytes() {
    // Probe says 99990, the file has 10 more bytes after the first chunk
    let server = start_server(100_000, 15, 15).await;
    let cfg = config(&server.url);

    let session = ClientSession::connect(&cfg).await.unwrap();
    let (writer, _reader) = StreamingBuffer::with_capacity(100_000).split();
    let mut prefetcher = Prefetcher::new(session, writer, PrefetchPolicy::from(&cfg));

    assert_eq!(prefetcher.fetch_next().await.unwrap(), 99_990);
    assert_eq!(prefetcher.session().bytes_loaded(), 99_990);
    assert!(!prefetcher.session().is_complete());

    assert_eq!(prefetcher.fetch_next().await.unwrap(), 10);
    assert_eq!(prefetcher.session().bytes_loaded(), 100_000);
    assert!(prefetcher.session().is_complete());

    // Nothing left to request
    assert_eq!(prefetcher.fetch_next().await.unwrap(), 0);
    assert_eq!(prefetcher.session().bytes_loaded(), 100_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_prefetcher_stops_after_completion() {
    let server = start_server(100_000, 10, 3).await;
    let cfg = config(&server.url);

    let session = ClientSession::connect(&cfg).await.unwrap();
    let (writer, mut reader) = StreamingBuffer::with_capacity(100_000).split();
    let prefetcher = Prefetcher::new(session, writer, PrefetchPolicy::from(&cfg));

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = prefetcher.spawn(shutdown_rx);

    let consumer = tokio::task::spawn_blocking(move || {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    });

    let summary = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("prefetcher should end on its own")
        .unwrap()
        .unwrap();

    assert!(summary.complete);
    assert_eq!(summary.bytes_loaded, 100_000);
    // 30000 + 30000 + 30000 + 10000
    assert_eq!(summary.chunks, 4);
    assert_eq!(consumer.await.unwrap(), track_bytes(100_000));
}

#[tokio::test]
async fn test_prefetcher_honours_shutdown() {
    let server = start_server(100_000, 10, 1).await;
    let mut cfg = config(&server.url);
    cfg.interval = Duration::from_secs(3600);

    let session = ClientSession::connect(&cfg).await.unwrap();
    let (writer, _reader) = StreamingBuffer::with_capacity(100_000).split();
    let prefetcher = Prefetcher::new(session, writer, PrefetchPolicy::from(&cfg));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = prefetcher.spawn(shutdown_rx);
    shutdown_tx.send(true).unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(!summary.complete);
    assert_eq!(summary.chunks, 0);
}

#[tokio::test]
async fn test_transient_failures_retried() {
    let script = Scripted::new(50_000, 20_000).failing(2, StatusCode::SERVICE_UNAVAILABLE);
    let gets = Arc::clone(&script.gets);
    let (url, _shutdown) = start_scripted(script).await;

    let mut cfg = config(&url);
    cfg.max_retries = 2;

    let session = ClientSession::connect(&cfg).await.unwrap();
    let (writer, _reader) = StreamingBuffer::with_capacity(50_000).split();
    let mut prefetcher = Prefetcher::new(session, writer, PrefetchPolicy::from(&cfg));

    assert_eq!(prefetcher.fetch_next().await.unwrap(), 20_000);
    assert_eq!(gets.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_failure_is_fatal_without_retries() {
    let script = Scripted::new(50_000, 20_000).failing(1, StatusCode::SERVICE_UNAVAILABLE);
    let (url, _shutdown) = start_scripted(script).await;
    let cfg = config(&url);

    let session = ClientSession::connect(&cfg).await.unwrap();
    let (writer, _reader) = StreamingBuffer::with_capacity(50_000).split();
    let mut prefetcher = Prefetcher::new(session, writer, PrefetchPolicy::from(&cfg));

    let err = prefetcher.fetch_next().await.unwrap_err();
    assert!(matches!(err, Error::Http(reqwest::StatusCode::SERVICE_UNAVAILABLE)));
    assert_eq!(prefetcher.session().bytes_loaded(), 0);
}

#[tokio::test]
async fn test_client_errors_not_retried() {
    let script = Scripted::new(50_000, 20_000).failing(1, StatusCode::NOT_FOUND);
    let gets = Arc::clone(&script.gets);
    let (url, _shutdown) = start_scripted(script).await;

    let mut cfg = config(&url);
    cfg.max_retries = 3;

    let session = ClientSession::connect(&cfg).await.unwrap();
    let (writer, _reader) = StreamingBuffer::with_capacity(50_000).split();
    let mut prefetcher = Prefetcher::new(session, writer, PrefetchPolicy::from(&cfg));

    let err = prefetcher.fetch_next().await.unwrap_err();
    assert!(matches!(err, Error::Http(reqwest::StatusCode::NOT_FOUND)));
    assert_eq!(gets.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_misplaced_chunk_is_protocol_error() {
    let script = Scripted {
        skew_start: true,
        ..Scripted::new(50_000, 20_000)
    };
    let (url, _shutdown) = start_scripted(script).await;

    let session = ClientSession::connect(&config(&url)).await.unwrap();
    let err = session.fetch_chunk(0).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = ClientSession::connect(&config(&format!("http://{}/", addr)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Network(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_unknown_track_probe_fails() {
    let server = start_server(1_000, 1, 15).await;
    let url = format!("{}tracks/nope", server.url);

    let err = ClientSession::connect(&config(&url)).await.unwrap_err();
    assert!(matches!(err, Error::Http(reqwest::StatusCode::INTERNAL_SERVER_ERROR)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_streams_whole_track_to_playback() {
    let server = start_server(100_000, 10, 3).await;

    let summary = app::run_with(config(&server.url), |mut reader, _driver| {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        assert_eq!(bytes, track_bytes(100_000));
        Ok(PlaybackStats {
            blocks: 1,
            samples: bytes.len() as u64,
            cancelled: false,
        })
    })
    .await
    .unwrap();

    assert!(summary.prefetch.complete);
    assert_eq!(summary.prefetch.bytes_loaded, 100_000);
    assert_eq!(summary.playback.samples, 100_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_reports_prefetch_failure() {
    // First GET succeeds, every later one fails
    let script = Scripted {
        fail_from: 1,
        fail_status: StatusCode::INTERNAL_SERVER_ERROR,
        ..Scripted::new(50_000, 20_000)
    };
    let (url, _shutdown) = start_scripted(script).await;

    let result = app::run_with(config(&url), |mut reader, _driver| {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(PlaybackStats::default())
    })
    .await;

    assert!(matches!(
        result,
        Err(Error::Http(reqwest::StatusCode::INTERNAL_SERVER_ERROR))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_survives_absurd_advertised_size() {
    let script = Scripted {
        advertised_total: Some(1 << 60),
        fail_from: 0,
        fail_status: StatusCode::INTERNAL_SERVER_ERROR,
        ..Scripted::new(10, 10)
    };
    let (url, _shutdown) = start_scripted(script).await;

    let session = ClientSession::connect(&config(&url)).await.unwrap();
    assert_eq!(session.info().total_size, 1 << 60);

    let result = app::run_with(config(&url), |_reader, _driver| Ok(PlaybackStats::default())).await;

    assert!(matches!(
        result,
        Err(Error::Http(reqwest::StatusCode::INTERNAL_SERVER_ERROR))
    ));
}
