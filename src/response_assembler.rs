//! Response header construction for relayed media

use crate::error::{Result, StreamError};
use crate::models::RangeRequest;
use http::{HeaderMap, HeaderValue, StatusCode};
use tracing::debug;

/// Builds client-facing status lines and headers from the cached total length
///
/// The origin's own headers are never forwarded; everything the client sees
/// is derived from `total_length` and the parsed range.
#[derive(Debug, Clone)]
pub struct ResponseAssembler {
    content_type: HeaderValue,
}

impl ResponseAssembler {
    /// Create a new ResponseAssembler
    ///
    /// # Arguments
    /// * `content_type` - Value sent as `Content-Type` on every media response
    pub fn new(content_type: &str) -> Result<Self> {
        let content_type = HeaderValue::from_str(content_type).map_err(|e| {
            StreamError::ConfigError(format!("Invalid content type '{}': {}", content_type, e))
        })?;
        Ok(ResponseAssembler { content_type })
    }

    /// Build response headers for the client
    ///
    /// # Arguments
    /// * `total_length` - Size of the whole object
    /// * `range` - The parsed client range
    ///
    /// # Returns
    /// A tuple of (StatusCode, HeaderMap): 200 for a full request, 206 with
    /// `Content-Range` for a partial one
    pub fn build_response_header(
        &self,
        total_length: u64,
        range: &RangeRequest,
    ) -> Result<(StatusCode, HeaderMap)> {
        let mut headers = HeaderMap::new();

        let status = match range {
            RangeRequest::Full => StatusCode::OK,
            RangeRequest::Partial(window) => {
                if window.end >= total_length {
                    return Err(StreamError::UnsatisfiableRange { total_length });
                }
                headers.insert(
                    "content-range",
                    header_value(&window.content_range(total_length))?,
                );
                StatusCode::PARTIAL_CONTENT
            }
        };

        headers.insert(
            "content-length",
            header_value(&range.body_length(total_length).to_string())?,
        );
        headers.insert("content-type", self.content_type.clone());
        headers.insert("accept-ranges", HeaderValue::from_static("bytes"));

        debug!(
            "Built response headers: status={}, content_length={:?}",
            status,
            headers.get("content-length").and_then(|v| v.to_str().ok())
        );

        Ok((status, headers))
    }

    /// Headers for a 416 answer: `Content-Range: bytes */total`, empty body
    pub fn unsatisfiable(&self, total_length: u64) -> Result<(StatusCode, HeaderMap)> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-range",
            header_value(&format!("bytes */{}", total_length))?,
        );
        headers.insert("content-length", HeaderValue::from_static("0"));
        headers.insert("accept-ranges", HeaderValue::from_static("bytes"));
        Ok((StatusCode::RANGE_NOT_SATISFIABLE, headers))
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| StreamError::InternalError(format!("Invalid header value: {}", e)))
}
