//! Stream relay
//!
//! Copies one byte window of a resolved object from the origin to the client.
//! Each client request gets its own [`StreamSession`], driven by a spawned
//! task that feeds a bounded channel behind the response body:
//!
//! ```text
//! Resolving -> RangeChecking -> Streaming -> {Complete, ClientDisconnected, Failed}
//!                                   |  ^
//!                                   |  | (at most once, on 410 Gone)
//!                                   v  |
//!                                invalidate + forced resolve
//! ```
//!
//! Response headers are produced from the cached `total_length` before the
//! origin is contacted, so a failure after that point can only abort the
//! connection. The body never carries more than the declared
//! `Content-Length`.

use crate::cache::ResolutionCache;
use crate::config::StreamerConfig;
use crate::error::{ResolveError, Result, StreamError};
use crate::metrics::RelayMetrics;
use crate::models::{ObjectKey, RangeRequest, ResolvedLocation};
use crate::range_parser::parse_range;
use crate::response_assembler::ResponseAssembler;
use bytes::Bytes;
use http::{Response, StatusCode};
use hyper::body::{Body, Frame, SizeHint};
use reqwest::Client;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Sending half of a [`RelayBody`]
pub type BodySender = mpsc::Sender<io::Result<Bytes>>;

/// Response body fed by a relay session through a bounded channel
///
/// An `Err` item aborts the client connection. Dropping the body (client
/// went away) closes the channel, which the session observes.
#[derive(Debug)]
pub struct RelayBody {
    rx: Option<mpsc::Receiver<io::Result<Bytes>>>,
}

impl RelayBody {
    /// Create a body and the sender that feeds it, buffering at most
    /// `buffer_chunks` chunks
    pub fn channel(buffer_chunks: usize) -> (BodySender, Self) {
        let (tx, rx) = mpsc::channel(buffer_chunks.max(1));
        (tx, RelayBody { rx: Some(rx) })
    }

    /// A body with no content (HEAD, 416, zero-length objects)
    pub fn empty() -> Self {
        RelayBody { rx: None }
    }
}

impl Body for RelayBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<std::result::Result<Frame<Bytes>, io::Error>>> {
        let this = self.get_mut();
        match this.rx.as_mut() {
            None => Poll::Ready(None),
            Some(rx) => rx
                .poll_recv(cx)
                .map(|item| item.map(|chunk| chunk.map(Frame::data))),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.rx.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        match self.rx {
            None => SizeHint::with_exact(0),
            Some(_) => SizeHint::default(),
        }
    }
}

/// What the client asked for
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub key: ObjectKey,
    /// Raw `Range` header, forwarded upstream unchanged
    pub range_header: Option<String>,
    /// Answer with headers only and never contact the origin
    pub head_only: bool,
}

/// How a streaming session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// Every declared byte was handed to the client
    Complete { bytes_sent: u64 },
    /// The client went away; the cache entry is left alone
    ClientDisconnected { bytes_sent: u64 },
    /// Terminal error after headers were sent
    Failed(StreamError),
}

/// Per-request state, owned by the session task
#[derive(Debug)]
pub struct StreamSession {
    key: ObjectKey,
    range: RangeRequest,
    range_header: Option<String>,
    location: ResolvedLocation,
    /// `Content-Length` promised to the client; fixed for every attempt
    body_length: u64,
    sink: BodySender,
    refreshed: bool,
    bytes_sent: u64,
}

/// Shapes origin chunks into the client's window
///
/// Drops the first `skip` bytes and never lets more than `remaining` bytes
/// through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChunkWindow {
    skip: u64,
    remaining: u64,
}

impl ChunkWindow {
    fn admit(&mut self, mut chunk: Bytes) -> Option<Bytes> {
        if self.skip > 0 {
            let dropped = self.skip.min(chunk.len() as u64);
            let _ = chunk.split_to(dropped as usize);
            self.skip -= dropped;
        }
        if chunk.len() as u64 > self.remaining {
            chunk.truncate(self.remaining as usize);
        }
        if chunk.is_empty() {
            return None;
        }
        self.remaining -= chunk.len() as u64;
        Some(chunk)
    }

    fn is_done(&self) -> bool {
        self.remaining == 0
    }
}

/// The range-aware relay with expiry-triggered refresh
#[derive(Clone)]
pub struct StreamRelay {
    cache: Arc<ResolutionCache>,
    client: Client,
    assembler: ResponseAssembler,
    metrics: Arc<RelayMetrics>,
    buffer_chunks: usize,
}

impl StreamRelay {
    /// Create a relay over `cache`
    ///
    /// The upstream client has connect and idle-read timeouts but no overall
    /// deadline.
    pub fn new(
        cache: Arc<ResolutionCache>,
        metrics: Arc<RelayMetrics>,
        config: &StreamerConfig,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.upstream_connect_timeout())
            .read_timeout(config.upstream_read_timeout())
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .build()
            .map_err(|e| {
                StreamError::ConfigError(format!("Failed to create upstream client: {}", e))
            })?;

        info!("Creating StreamRelay");
        info!("  Content-Type: {}", config.content_type);
        info!("  Buffer: {} chunks", config.relay_buffer_chunks);

        Ok(StreamRelay {
            cache,
            client,
            assembler: ResponseAssembler::new(&config.content_type)?,
            metrics,
            buffer_chunks: config.relay_buffer_chunks,
        })
    }

    /// Answer one stream request
    ///
    /// Errors returned here happen before any header is written. Once the
    /// response is returned, the body is driven by a background session.
    pub async fn serve(&self, request: StreamRequest) -> Result<Response<RelayBody>> {
        let StreamRequest {
            key,
            range_header,
            head_only,
        } = request;

        // Resolving
        let location = match self.cache.resolve(&key, false).await {
            Ok(location) => location,
            Err(e) => {
                self.metrics.record_rejected();
                error!("Failed to resolve key={}: {}", key, e);
                return Err(e);
            }
        };

        // RangeChecking
        let range = match parse_range(range_header.as_deref(), location.total_length) {
            Ok(range) => range,
            Err(StreamError::UnsatisfiableRange { total_length }) => {
                self.metrics.record_unsatisfiable();
                info!(
                    "Unsatisfiable range {:?} for key={} (total_length={})",
                    range_header, key, total_length
                );
                let (status, headers) = self.assembler.unsatisfiable(total_length)?;
                return Ok(build_response(status, headers, RelayBody::empty()));
            }
            Err(e) => {
                self.metrics.record_rejected();
                warn!("Rejecting range {:?} for key={}: {}", range_header, key, e);
                return Err(e);
            }
        };

        let (status, headers) = self
            .assembler
            .build_response_header(location.total_length, &range)?;
        self.metrics.record_request(range.is_partial());

        let body_length = range.body_length(location.total_length);
        if head_only || body_length == 0 {
            debug!(
                "Headers only for key={} (head={}, body_length={})",
                key, head_only, body_length
            );
            return Ok(build_response(status, headers, RelayBody::empty()));
        }

        // Streaming
        let (sink, body) = RelayBody::channel(self.buffer_chunks);
        let session = StreamSession {
            key,
            range,
            range_header,
            location,
            body_length,
            sink,
            refreshed: false,
            bytes_sent: 0,
        };

        let relay = self.clone();
        tokio::spawn(async move {
            relay.run_session(session).await;
        });

        Ok(build_response(status, headers, body))
    }

    /// Drive a session to its end, refreshing the direct URL at most once
    async fn run_session(&self, mut session: StreamSession) -> SessionOutcome {
        let outcome = loop {
            match self.stream_once(&mut session).await {
                Ok(outcome) => break outcome,
                Err(e) if e.is_link_expired() && !session.refreshed => {
                    session.refreshed = true;
                    self.metrics.record_link_refresh();
                    info!(
                        "Direct URL for key={} expired, refreshing (bytes_sent={})",
                        session.key, session.bytes_sent
                    );

                    self.cache.invalidate(&session.key);
                    match self.cache.resolve(&session.key, true).await {
                        Ok(location) => {
                            if location.total_length != session.location.total_length {
                                warn!(
                                    "key={} now reports total_length={} (was {}), keeping the declared {} bytes",
                                    session.key,
                                    location.total_length,
                                    session.location.total_length,
                                    session.body_length
                                );
                            }
                            session.location = location;
                        }
                        Err(e) => break SessionOutcome::Failed(e),
                    }
                }
                Err(e) if e.is_link_expired() => {
                    self.metrics.record_refresh_exhausted();
                    break SessionOutcome::Failed(StreamError::Resolution(
                        ResolveError::Upstream(format!(
                            "direct URL for {} expired again after refresh",
                            session.key
                        )),
                    ));
                }
                Err(e) => break SessionOutcome::Failed(e),
            }
        };

        match &outcome {
            SessionOutcome::Complete { bytes_sent } => {
                self.metrics.record_completed();
                info!("Stream complete: key={} ({} bytes)", session.key, bytes_sent);
            }
            SessionOutcome::ClientDisconnected { bytes_sent } => {
                self.metrics.record_client_disconnect();
                info!(
                    "Client disconnected: key={} after {} bytes",
                    session.key, bytes_sent
                );
            }
            SessionOutcome::Failed(e) => {
                self.metrics.record_failed();
                error!(
                    "Stream failed: key={} after {} bytes: {}",
                    session.key, session.bytes_sent, e
                );
                // Headers are already out; an error frame aborts the connection
                let _ = session.sink.send(Err(io::Error::other(e.to_string()))).await;
            }
        }

        outcome
    }

    /// One upstream fetch. `Err(LinkExpired)` asks the caller to refresh.
    async fn stream_once(&self, session: &mut StreamSession) -> Result<SessionOutcome> {
        let mut request = self.client.get(&session.location.direct_url);
        if let Some(range) = &session.range_header {
            debug!("Forwarding Range request: {}", range);
            request = request.header(http::header::RANGE, range.as_str());
        }

        let mut response = tokio::select! {
            _ = session.sink.closed() => {
                return Ok(SessionOutcome::ClientDisconnected { bytes_sent: session.bytes_sent });
            }
            result = request.send() => result.map_err(|e| {
                StreamError::UpstreamTransport(format!("upstream request failed: {}", e))
            })?,
        };

        let status = response.status();
        if status == StatusCode::GONE {
            return Err(StreamError::LinkExpired);
        }
        if !status.is_success() {
            return Err(StreamError::UpstreamTransport(format!(
                "upstream returned {}",
                status
            )));
        }

        // An origin ignoring Range answers 200 with the whole object
        let leading = if session.range.is_partial() && status != StatusCode::PARTIAL_CONTENT {
            warn!(
                "Origin ignored Range for key={}, skipping {} leading bytes",
                session.key,
                session.range.start()
            );
            session.range.start()
        } else {
            0
        };

        let mut window = ChunkWindow {
            skip: leading + session.bytes_sent,
            remaining: session.body_length.saturating_sub(session.bytes_sent),
        };

        while !window.is_done() {
            let chunk = tokio::select! {
                _ = session.sink.closed() => {
                    return Ok(SessionOutcome::ClientDisconnected { bytes_sent: session.bytes_sent });
                }
                chunk = response.chunk() => chunk.map_err(|e| {
                    StreamError::UpstreamTransport(format!("upstream read failed: {}", e))
                })?,
            };

            let Some(chunk) = chunk else {
                return Err(StreamError::UpstreamTransport(format!(
                    "upstream ended early, {} bytes missing",
                    window.remaining
                )));
            };

            let Some(chunk) = window.admit(chunk) else {
                continue;
            };

            let len = chunk.len() as u64;
            if session.sink.send(Ok(chunk)).await.is_err() {
                return Ok(SessionOutcome::ClientDisconnected {
                    bytes_sent: session.bytes_sent,
                });
            }
            session.bytes_sent += len;
            self.metrics.record_bytes_to_client(len);
        }

        Ok(SessionOutcome::Complete {
            bytes_sent: session.bytes_sent,
        })
    }
}

fn build_response(status: StatusCode, headers: http::HeaderMap, body: RelayBody) -> Response<RelayBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
