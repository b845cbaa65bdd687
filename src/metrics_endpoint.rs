//! Prometheus text rendering of relay and cache metrics
//!
//! Served at `GET /metrics` by the [`server`](crate::server) when enabled.

use crate::cache::CacheStats;
use crate::metrics::MetricsSnapshot;
use bytes::Bytes;
use http::{Response, StatusCode};
use http_body_util::Full;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Build the `/metrics` response
pub fn metrics_response(
    snapshot: &MetricsSnapshot,
    cache: &CacheStats,
) -> Result<Response<Full<Bytes>>, http::Error> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", PROMETHEUS_CONTENT_TYPE)
        .body(Full::new(Bytes::from(format_prometheus_metrics(snapshot, cache))))
}

/// Format metrics in Prometheus exposition format
pub fn format_prometheus_metrics(snapshot: &MetricsSnapshot, cache: &CacheStats) -> String {
    let mut output = String::new();

    let counters: [(&str, &str, u64); 15] = [
        ("requests_total", "Stream requests received", snapshot.total_requests),
        ("full_requests_total", "Requests for the whole object", snapshot.full_requests),
        ("partial_requests_total", "Requests with a byte range", snapshot.partial_requests),
        (
            "unsatisfiable_requests_total",
            "Requests answered with 416",
            snapshot.unsatisfiable_requests,
        ),
        (
            "rejected_requests_total",
            "Requests rejected before streaming",
            snapshot.rejected_requests,
        ),
        ("link_refreshes_total", "Expired direct URLs refreshed", snapshot.link_refreshes),
        (
            "refreshes_exhausted_total",
            "Sessions failed by a second expiry",
            snapshot.refreshes_exhausted,
        ),
        ("completed_sessions_total", "Sessions streamed to the end", snapshot.completed_sessions),
        ("client_disconnects_total", "Sessions ended by the client", snapshot.client_disconnects),
        ("failed_sessions_total", "Sessions aborted by an error", snapshot.failed_sessions),
        ("bytes_to_client_total", "Body bytes sent to clients", snapshot.bytes_to_client),
        ("cache_hits_total", "Resolution cache hits", cache.hits),
        ("cache_misses_total", "Resolution cache misses", cache.misses),
        ("resolutions_total", "Calls made to the resolution service", cache.resolutions),
        ("resolution_failures_total", "Failed resolution calls", cache.failures),
    ];

    for (name, help, value) in counters {
        push_metric(&mut output, name, help, "counter", value);
    }

    push_metric(
        &mut output,
        "cache_entries",
        "Resolved locations currently cached",
        "gauge",
        cache.entries as u64,
    );

    output
}

fn push_metric(output: &mut String, name: &str, help: &str, kind: &str, value: u64) {
    output.push_str(&format!("# HELP cloud_streamer_{} {}\n", name, help));
    output.push_str(&format!("# TYPE cloud_streamer_{} {}\n", name, kind));
    output.push_str(&format!("cloud_streamer_{} {}\n\n", name, value));
}
