//! Health check endpoint
//!
//! `GET /health` reports `healthy` while the server accepts work and
//! `draining` (503) once shutdown has begun.

use bytes::Bytes;
use http::{Response, StatusCode};
use http_body_util::Full;
use tokio::sync::RwLock;

/// Health status of the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Serving requests
    Healthy,
    /// Shutdown started, in-flight sessions are finishing
    Draining,
}

impl HealthStatus {
    /// Convert health status to HTTP status code
    pub fn to_status_code(&self) -> StatusCode {
        match self {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Draining => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Draining => "draining",
        }
    }
}

/// Health check service
#[derive(Debug)]
pub struct HealthCheckService {
    status: RwLock<HealthStatus>,
}

impl HealthCheckService {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(HealthStatus::Healthy),
        }
    }

    /// Get the current health status
    pub async fn status(&self) -> HealthStatus {
        *self.status.read().await
    }

    /// Set the health status
    pub async fn set_status(&self, status: HealthStatus) {
        *self.status.write().await = status;
    }

    /// Build the `/health` response
    pub async fn response(&self) -> Result<Response<Full<Bytes>>, http::Error> {
        let status = self.status().await;
        Response::builder()
            .status(status.to_status_code())
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(format!(
                r#"{{"status":"{}"}}"#,
                status.as_str()
            ))))
    }
}

impl Default for HealthCheckService {
    fn default() -> Self {
        Self::new()
    }
}
