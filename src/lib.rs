//! Cloud Streamer
//!
//! A range-aware HTTP relay that lets a client play a large remote media
//! object, addressed only by a short-lived signed download URL, as if it were
//! a locally served, seekable file.
//!
//! # Overview
//!
//! An indirect share URL is turned into an [`ObjectKey`]. The key is resolved
//! into a direct origin URL and total size through a [`Resolver`], and the
//! result is memoized in a [`ResolutionCache`]. Each client request is then
//! answered by the [`StreamRelay`], which parses the `Range` header against
//! the cached size, writes `200`/`206`/`416` headers and copies the matching
//! byte window from the origin.
//!
//! Direct URLs expire. When the origin answers `410 Gone`, the relay
//! invalidates the cache entry, forces one re-resolution and resumes the same
//! byte window. A second expiry within one request fails the session.
//!
//! # Architecture
//!
//! - [`StreamServer`]: hyper HTTP/1.1 server, routing and graceful shutdown
//! - [`StreamRelay`]: per-request streaming sessions with single refresh
//! - [`ResolutionCache`]: process-lifetime key to location map
//! - [`CloudKitResolver`]: resolution through the CloudKit lookup service
//! - [`parse_range`]: single-range `Range` header parsing
//! - [`StreamRegistry`]: relay links handed out by `POST /api/stream`
//! - [`RelayMetrics`]: counters exposed at `/metrics`
//!
//! # Configuration
//!
//! ```yaml
//! listen_address: "0.0.0.0:3000"
//! public_base_url: "http://127.0.0.1:3000"
//! content_type: "video/mp4"
//! relay_buffer_chunks: 16
//! auth:
//!   enabled: true
//!   token: "change-me"
//! ```
//!
//! See [`StreamerConfig`] for every option.
//!
//! # Example
//!
//! ```rust,no_run
//! use cloud_streamer::{CloudKitResolver, StreamServer, StreamerConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> cloud_streamer::Result<()> {
//! let config = StreamerConfig::default();
//! let resolver = Arc::new(CloudKitResolver::from_config(&config)?);
//! let server = StreamServer::bind(config, resolver).await?;
//! server
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! # }
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod health_check;
pub mod metrics;
pub mod metrics_endpoint;
pub mod models;
pub mod purge_handler;
pub mod range_parser;
pub mod registry;
pub mod relay;
pub mod request_analyzer;
pub mod resolver;
pub mod response_assembler;
pub mod server;

// Re-export commonly used types
pub use cache::{CacheStats, ResolutionCache};
pub use config::{AuthConfig, StreamerConfig};
pub use error::{ResolveError, Result, StreamError};
pub use metrics::{MetricsSnapshot, RelayMetrics};
pub use models::{ByteRange, ObjectKey, RangeRequest, ResolvedLocation};
pub use range_parser::parse_range;
pub use registry::StreamRegistry;
pub use relay::{RelayBody, SessionOutcome, StreamRelay, StreamRequest};
pub use resolver::{CloudKitResolver, ObjectInfo, Resolution, Resolver};
pub use response_assembler::ResponseAssembler;
pub use server::StreamServer;
