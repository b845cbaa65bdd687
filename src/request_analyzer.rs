//! Request analysis: routing and parameter extraction

use http::{HeaderMap, Method};
use serde::Deserialize;
use tracing::debug;

/// Where a request should go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `POST /api/stream`
    CreateStream,
    /// `GET|HEAD /stream/:key/:fileName` (also under `/api/stream`)
    StreamByName { key: String, file_name: String },
    /// `GET|HEAD /stream?url=...`
    StreamByUrl,
    /// `PURGE /stream/:key` or `PURGE /*`
    Purge,
    /// `GET /health`
    Health,
    /// `GET /metrics`
    Metrics,
    NotFound,
    MethodNotAllowed,
}

/// The PURGE method
pub fn purge_method() -> Method {
    // "PURGE" is a valid token, so this never falls back
    Method::from_bytes(b"PURGE").unwrap_or(Method::DELETE)
}

/// Determine the route for a request
///
/// # Arguments
/// * `method` - HTTP method of the request
/// * `path` - Request path without the query string
pub fn route(method: &Method, path: &str) -> Route {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let is_read = *method == Method::GET || *method == Method::HEAD;

    let route = match segments.as_slice() {
        ["api", "stream"] => {
            if *method == Method::POST {
                Route::CreateStream
            } else {
                Route::MethodNotAllowed
            }
        }
        ["stream", key, file_name] | ["api", "stream", key, file_name]
            if !key.is_empty() && !file_name.is_empty() =>
        {
            if is_read {
                Route::StreamByName {
                    key: key.to_string(),
                    file_name: file_name.to_string(),
                }
            } else if *method == purge_method() {
                Route::Purge
            } else {
                Route::MethodNotAllowed
            }
        }
        ["stream", key] if !key.is_empty() && *method == purge_method() => Route::Purge,
        ["stream"] => {
            if is_read {
                Route::StreamByUrl
            } else {
                Route::MethodNotAllowed
            }
        }
        ["*"] if *method == purge_method() => Route::Purge,
        ["health"] => read_only(method, Route::Health),
        ["metrics"] => read_only(method, Route::Metrics),
        _ => Route::NotFound,
    };

    debug!("Routed {} {} -> {:?}", method, path, route);
    route
}

fn read_only(method: &Method, route: Route) -> Route {
    if *method == Method::GET {
        route
    } else {
        Route::MethodNotAllowed
    }
}

/// Extract the client's Range header if present
pub fn extract_range_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(http::header::RANGE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Value of the `url` parameter in a query string
pub fn query_url(query: Option<&str>) -> Option<String> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == "url")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Deserialize)]
struct CreateStreamBody {
    url: Option<String>,
}

/// Indirect URL supplied to `POST /api/stream`
///
/// Looks at a JSON body, then a form body, then the query string.
pub fn create_stream_url(
    headers: &HeaderMap,
    query: Option<&str>,
    body: &[u8],
) -> Option<String> {
    let content_type = headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let from_body = if content_type.starts_with("application/json") {
        serde_json::from_slice::<CreateStreamBody>(body)
            .ok()
            .and_then(|parsed| parsed.url)
    } else if !body.is_empty() {
        url::form_urlencoded::parse(body)
            .find(|(name, _)| name == "url")
            .map(|(_, value)| value.into_owned())
    } else {
        None
    };

    from_body
        .filter(|value| !value.trim().is_empty())
        .or_else(|| query_url(query))
}
