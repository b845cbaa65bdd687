//! HTTP server
//!
//! Routes requests to stream creation, the stream relay, cache purge, health
//! and metrics. One task per accepted connection; shutdown stops accepting,
//! lets in-flight connections drain for `drain_timeout`, then closes the
//! resolution cache.

use crate::auth::TokenAuth;
use crate::cache::ResolutionCache;
use crate::config::StreamerConfig;
use crate::error::{Result, StreamError};
use crate::health_check::{HealthCheckService, HealthStatus};
use crate::metrics::RelayMetrics;
use crate::metrics_endpoint::metrics_response;
use crate::models::{is_valid_http_url, ObjectKey};
use crate::purge_handler::PurgeHandler;
use crate::registry::StreamRegistry;
use crate::relay::{StreamRelay, StreamRequest};
use crate::request_analyzer::{create_stream_url, extract_range_header, query_url, route, Route};
use crate::resolver::Resolver;
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Body type of every response the server produces
pub type ServerBody = UnsyncBoxBody<Bytes, io::Error>;

/// Largest accepted `POST /api/stream` body
const MAX_CREATE_BODY_BYTES: usize = 64 * 1024;

/// Shared per-server state
struct AppState {
    config: StreamerConfig,
    resolver: Arc<dyn Resolver>,
    cache: Arc<ResolutionCache>,
    relay: StreamRelay,
    registry: StreamRegistry,
    purge: PurgeHandler,
    auth: Option<TokenAuth>,
    metrics: Arc<RelayMetrics>,
    health: HealthCheckService,
}

/// A bound, not yet running server
pub struct StreamServer {
    listener: TcpListener,
    state: Arc<AppState>,
}

impl StreamServer {
    /// Validate `config`, build the components and bind the listener
    pub async fn bind(config: StreamerConfig, resolver: Arc<dyn Resolver>) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(ResolutionCache::new(resolver.clone()));
        let metrics = Arc::new(RelayMetrics::new());
        let relay = StreamRelay::new(cache.clone(), metrics.clone(), &config)?;
        let registry = StreamRegistry::new(&config.public_base_url)?;
        let auth = config.active_auth().map(TokenAuth::new);

        let listener = TcpListener::bind(&config.listen_address).await.map_err(|e| {
            StreamError::ConfigError(format!(
                "Failed to bind {}: {}",
                config.listen_address, e
            ))
        })?;

        info!("Stream server bound to http://{}", listener.local_addr()?);
        info!("  POST /api/stream              - Create a relay link");
        info!("  GET  /stream/:key/:fileName   - Stream media");
        info!("  GET  /stream?url=...          - Stream media by indirect URL");
        info!("  PURGE /stream/:key | /*       - Invalidate resolutions");
        info!("  GET  /health                  - Health status");
        if config.metrics_endpoint {
            info!("  GET  /metrics                 - Prometheus metrics");
        }
        info!("  Auth: {}", if auth.is_some() { "enabled" } else { "disabled" });

        let state = AppState {
            purge: PurgeHandler::new(cache.clone()),
            config,
            resolver,
            cache,
            relay,
            registry,
            auth,
            metrics,
            health: HealthCheckService::new(),
        };

        Ok(StreamServer {
            listener,
            state: Arc::new(state),
        })
    }

    /// The address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn cache(&self) -> Arc<ResolutionCache> {
        self.state.cache.clone()
    }

    pub fn metrics(&self) -> Arc<RelayMetrics> {
        self.state.metrics.clone()
    }

    /// Serve until `shutdown` resolves, then drain and close
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let StreamServer { listener, state } = self;
        let (drain_tx, drain_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    debug!("Accepted connection from {}", peer);
                    connections.spawn(serve_connection(
                        TokioIo::new(stream),
                        state.clone(),
                        drain_rx.clone(),
                    ));
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(listener);
        state.health.set_status(HealthStatus::Draining).await;
        info!(
            "Shutting down, draining {} connections (timeout {:?})",
            connections.len(),
            state.config.drain_timeout()
        );
        let _ = drain_tx.send(true);

        let drained = tokio::time::timeout(state.config.drain_timeout(), async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                "Drain timeout elapsed, aborting {} connections",
                connections.len()
            );
            connections.abort_all();
            while connections.join_next().await.is_some() {}
        }

        state.cache.close();
        info!("Stream server stopped");
        Ok(())
    }
}

async fn serve_connection(
    io: TokioIo<tokio::net::TcpStream>,
    state: Arc<AppState>,
    mut drain: watch::Receiver<bool>,
) {
    let service = service_fn(move |req| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(handle_request(state, req).await) }
    });

    let conn = http1::Builder::new().serve_connection(io, service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(err) = result {
                debug!("Connection ended with error: {:?}", err);
            }
        }
        _ = drain.changed() => {
            conn.as_mut().graceful_shutdown();
            if let Err(err) = conn.await {
                debug!("Connection ended with error while draining: {:?}", err);
            }
        }
    }
}

async fn handle_request(state: Arc<AppState>, req: Request<Incoming>) -> Response<ServerBody> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    info!("Processing request: {} {}", method, path);

    let result = match route(&method, &path) {
        Route::CreateStream => create_stream(&state, req).await,
        Route::StreamByName { key, file_name } => {
            stream_by_name(&state, req, &key, &file_name).await
        }
        Route::StreamByUrl => stream_by_url(&state, req).await,
        Route::Purge => purge(&state, &req),
        Route::Health => state
            .health
            .response()
            .await
            .map(|response| response.map(full_body))
            .map_err(|e| StreamError::InternalError(e.to_string())),
        Route::Metrics if state.config.metrics_endpoint => metrics_response(
            &state.metrics.get_stats(),
            &state.cache.stats(),
        )
        .map(|response| response.map(full_body))
        .map_err(|e| StreamError::InternalError(e.to_string())),
        Route::Metrics | Route::NotFound => Ok(json_response(
            StatusCode::NOT_FOUND,
            &json!({ "err": "Not Found" }),
        )),
        Route::MethodNotAllowed => Ok(json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            &json!({ "err": "Method Not Allowed" }),
        )),
    };

    result.unwrap_or_else(|e| error_response(&method, &path, &e))
}

/// `POST /api/stream`: validate, describe, register, hand out the link
async fn create_stream(state: &AppState, req: Request<Incoming>) -> Result<Response<ServerBody>> {
    if let Some(auth) = &state.auth {
        auth.check(req.headers())?;
    }

    let (parts, body) = req.into_parts();
    let body = Limited::new(body, MAX_CREATE_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| StreamError::InvalidIndirectUrl(format!("unreadable request body: {}", e)))?
        .to_bytes();

    let indirect_url = create_stream_url(&parts.headers, parts.uri.query(), &body)
        .ok_or_else(|| StreamError::InvalidIndirectUrl("missing url parameter".to_string()))?;
    let key = validated_key(&indirect_url)?;

    let info = state.resolver.describe(&key).await?;
    let file_name = info.file_name(&indirect_url);
    let link = state.registry.register(&key, &file_name, &indirect_url)?;

    info!("Created stream link for key={}: {}", key, link);
    Ok(json_response(StatusCode::OK, &json!({ "url": link })))
}

/// `GET|HEAD /stream/:key/:fileName`
async fn stream_by_name(
    state: &AppState,
    req: Request<Incoming>,
    key: &str,
    file_name: &str,
) -> Result<Response<ServerBody>> {
    let indirect_url = state.registry.lookup(key, file_name)?;
    let key = ObjectKey::from_indirect_url(&indirect_url)?;
    relay(state, req, key).await
}

/// `GET|HEAD /stream?url=...`: relay without registration
async fn stream_by_url(state: &AppState, req: Request<Incoming>) -> Result<Response<ServerBody>> {
    let indirect_url = query_url(req.uri().query())
        .ok_or_else(|| StreamError::InvalidIndirectUrl("missing url parameter".to_string()))?;
    let key = validated_key(&indirect_url)?;
    relay(state, req, key).await
}

async fn relay(
    state: &AppState,
    req: Request<Incoming>,
    key: ObjectKey,
) -> Result<Response<ServerBody>> {
    let request = StreamRequest {
        key,
        range_header: extract_range_header(req.headers()),
        head_only: req.method() == Method::HEAD,
    };
    let response = state.relay.serve(request).await?;
    Ok(response.map(|body| body.boxed_unsync()))
}

fn purge(state: &AppState, req: &Request<Incoming>) -> Result<Response<ServerBody>> {
    if let Some(auth) = &state.auth {
        auth.check(req.headers())?;
    }
    let response = state.purge.handle_purge(req)?;
    Ok(response.map(full_body))
}

fn validated_key(indirect_url: &str) -> Result<ObjectKey> {
    if !is_valid_http_url(indirect_url) {
        return Err(StreamError::InvalidIndirectUrl(indirect_url.to_string()));
    }
    ObjectKey::from_indirect_url(indirect_url)
}

fn full_body(body: Full<Bytes>) -> ServerBody {
    body.map_err(|never| match never {}).boxed_unsync()
}

fn json_response(status: StatusCode, value: &serde_json::Value) -> Response<ServerBody> {
    let mut response = Response::new(full_body(Full::new(Bytes::from(value.to_string()))));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}

fn error_response(method: &Method, path: &str, err: &StreamError) -> Response<ServerBody> {
    let status =
        StatusCode::from_u16(err.to_http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if err.is_client_error() {
        warn!("{} {} -> {}: {}", method, path, status, err);
    } else {
        error!("{} {} -> {}: {}", method, path, status, err);
    }
    json_response(status, &json!({ "err": err.to_string() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_error_response_shape() {
        let response = error_response(
            &Method::GET,
            "/stream",
            &StreamError::InvalidIndirectUrl("nope".to_string()),
        );
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["err"], "URL is not valid: nope");
    }

    #[test]
    fn test_validated_key() {
        assert_eq!(
            validated_key("https://www.icloud.com/iclouddrive/0abc#Clip")
                .unwrap()
                .as_str(),
            "0abc"
        );
        assert!(matches!(
            validated_key("ftp://host/abc"),
            Err(StreamError::InvalidIndirectUrl(_))
        ));
        assert!(matches!(
            validated_key("https://host/"),
            Err(StreamError::InvalidIndirectUrl(_))
        ));
    }
}
