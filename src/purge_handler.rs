//! HTTP PURGE method handler for resolution cache invalidation
//!
//! Supported PURGE methods:
//! - PURGE /stream/:key - Drop the cached resolution for one object
//! - PURGE /* - Drop every cached resolution (with X-Purge-All header)

use crate::cache::ResolutionCache;
use crate::error::{Result, StreamError};
use crate::models::ObjectKey;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// PURGE request handler
pub struct PurgeHandler {
    cache: Arc<ResolutionCache>,
}

/// PURGE response body
#[derive(Debug, Serialize, Deserialize)]
pub struct PurgeResponse {
    pub success: bool,
    pub purged_count: usize,
    pub key: Option<String>,
    pub message: String,
}

impl PurgeHandler {
    pub fn new(cache: Arc<ResolutionCache>) -> Self {
        Self { cache }
    }

    /// Handle HTTP PURGE request
    ///
    /// Authentication is checked by the caller.
    pub fn handle_purge<B>(&self, req: &Request<B>) -> Result<Response<Full<Bytes>>> {
        let path = req.uri().path();

        let purge_all = req
            .headers()
            .get("x-purge-all")
            .and_then(|h| h.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if path == "/*" {
            if !purge_all {
                return self.error_response(
                    StatusCode::BAD_REQUEST,
                    "PURGE /* requires X-Purge-All: true",
                );
            }

            info!("Purging all resolution cache entries");
            let count = self.cache.clear();
            info!("Purged all {} cache entries", count);
            return self.json_response(
                StatusCode::OK,
                &PurgeResponse {
                    success: true,
                    purged_count: count,
                    key: None,
                    message: format!("Successfully purged all {} cache entries", count),
                },
            );
        }

        let key = match path
            .strip_prefix("/stream/")
            .and_then(|rest| rest.split('/').next())
            .map(ObjectKey::new)
        {
            Some(Ok(key)) => key,
            _ => {
                warn!("Rejected PURGE for path {}", path);
                return self.error_response(StatusCode::BAD_REQUEST, "Missing object key");
            }
        };

        info!("Purging cache for key={}", key);
        let removed = self.cache.invalidate(&key);
        let message = if removed {
            format!("Successfully purged cache entry for {}", key)
        } else {
            format!("No cache entry found for {}", key)
        };

        self.json_response(
            StatusCode::OK,
            &PurgeResponse {
                success: true,
                purged_count: usize::from(removed),
                key: Some(key.to_string()),
                message,
            },
        )
    }

    /// Build JSON response
    fn json_response(
        &self,
        status: StatusCode,
        body: &PurgeResponse,
    ) -> Result<Response<Full<Bytes>>> {
        let json = serde_json::to_string(body).map_err(|e| {
            StreamError::InternalError(format!("Failed to serialize response: {}", e))
        })?;

        Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .header("cache-control", "no-cache, no-store, must-revalidate")
            .body(Full::new(Bytes::from(json)))
            .map_err(|e| StreamError::InternalError(format!("Failed to build response: {}", e)))
    }

    fn error_response(&self, status: StatusCode, message: &str) -> Result<Response<Full<Bytes>>> {
        let response = PurgeResponse {
            success: false,
            purged_count: 0,
            key: None,
            message: message.to_string(),
        };

        self.json_response(status, &response)
    }
}
