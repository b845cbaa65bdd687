//! Resolution of object keys into direct, origin-fetchable URLs
//!
//! [`Resolver`] is the narrow contract the relay depends on. The lookup
//! service's payload layout stays private to each implementation.

use crate::config::StreamerConfig;
use crate::error::{ResolveError, Result, StreamError};
use crate::models::{fallback_file_name, friendly_file_name, ObjectKey};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A direct URL and the total object size, as reported by the lookup service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub direct_url: String,
    pub total_length: u64,
}

/// Human readable metadata used when handing out relay links
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectInfo {
    pub title: Option<String>,
    pub extension: Option<String>,
}

impl ObjectInfo {
    /// File name for the relay link, falling back to the indirect URL's fragment
    pub fn file_name(&self, indirect_url: &str) -> String {
        match &self.title {
            Some(title) if !title.trim().is_empty() => {
                friendly_file_name(title, self.extension.as_deref().unwrap_or("mp4"))
            }
            _ => fallback_file_name(indirect_url),
        }
    }
}

/// Turns an [`ObjectKey`] into something the origin will serve
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve the key into a direct URL plus total length
    async fn resolve(&self, key: &ObjectKey) -> std::result::Result<Resolution, ResolveError>;

    /// Fetch display metadata for the key (stream creation only)
    async fn describe(&self, key: &ObjectKey) -> std::result::Result<ObjectInfo, ResolveError>;
}

/// Resolver backed by the CloudKit public `records/resolve` endpoint
pub struct CloudKitResolver {
    client: Client,
    endpoint: String,
}

impl CloudKitResolver {
    /// Create a resolver for `endpoint` with the given request timeout
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                StreamError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(CloudKitResolver {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Create a resolver from the service configuration
    pub fn from_config(config: &StreamerConfig) -> Result<Self> {
        Self::new(config.lookup_endpoint.clone(), config.resolve_timeout())
    }

    /// Send one lookup request and return the first record
    async fn lookup(&self, key: &ObjectKey) -> std::result::Result<LookupRecord, ResolveError> {
        debug!("Looking up key={} at {}", key, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "shortGUIDs": [{ "value": key.as_str() }] }))
            .send()
            .await
            .map_err(|e| {
                warn!("Lookup request failed for key={}: {}", key, e);
                ResolveError::Upstream(format!("lookup request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Lookup service returned status={} for key={}", status, key);
            return Err(ResolveError::Upstream(format!(
                "lookup service returned {}",
                status
            )));
        }

        let payload: LookupResponse = response
            .json()
            .await
            .map_err(|e| ResolveError::Malformed(format!("invalid lookup payload: {}", e)))?;

        let record = payload
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ResolveError::Malformed("lookup returned no results".to_string()))?;

        if let Some(code) = record.server_error_code.as_deref() {
            let reason = record.reason.as_deref().unwrap_or("no reason given");
            warn!(
                "Lookup service rejected key={}: {} ({})",
                key, code, reason
            );
            return Err(if code.contains("NOT_FOUND") {
                ResolveError::NotFound(format!("{}: {}", key, code))
            } else {
                ResolveError::Upstream(format!("{}: {}", code, reason))
            });
        }

        Ok(record)
    }
}

#[async_trait]
impl Resolver for CloudKitResolver {
    async fn resolve(&self, key: &ObjectKey) -> std::result::Result<Resolution, ResolveError> {
        let record = self.lookup(key).await?;
        let fields = record
            .root_record
            .map(|root| root.fields)
            .ok_or_else(|| ResolveError::Malformed("rootRecord missing".to_string()))?;

        let direct_url = fields
            .file_content
            .map(|field| field.value.download_url)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ResolveError::Malformed("fileContent.downloadURL missing".to_string()))?;

        let total_length = fields
            .size
            .as_ref()
            .and_then(|field| parse_size(&field.value))
            .ok_or_else(|| ResolveError::Malformed("size missing or not a number".to_string()))?;

        info!("Resolved key={} (total_length={})", key, total_length);
        Ok(Resolution {
            direct_url,
            total_length,
        })
    }

    async fn describe(&self, key: &ObjectKey) -> std::result::Result<ObjectInfo, ResolveError> {
        let record = self.lookup(key).await?;

        let title = record
            .share
            .and_then(|share| share.fields.title)
            .map(|field| field.value);
        let extension = record
            .root_record
            .and_then(|root| root.fields.extension)
            .map(|field| field.value);

        debug!(
            "Described key={}: title={:?}, extension={:?}",
            key, title, extension
        );
        Ok(ObjectInfo { title, extension })
    }
}

/// Sizes arrive either as JSON numbers or as numeric strings
fn parse_size(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    results: Vec<LookupRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupRecord {
    server_error_code: Option<String>,
    reason: Option<String>,
    root_record: Option<RootRecord>,
    share: Option<ShareRecord>,
}

#[derive(Debug, Deserialize)]
struct RootRecord {
    #[serde(default)]
    fields: RootFields,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RootFields {
    file_content: Option<Field<FileContent>>,
    size: Option<Field<serde_json::Value>>,
    extension: Option<Field<String>>,
}

#[derive(Debug, Deserialize)]
struct ShareRecord {
    #[serde(default)]
    fields: ShareFields,
}

#[derive(Debug, Default, Deserialize)]
struct ShareFields {
    #[serde(rename = "cloudkit.title")]
    title: Option<Field<String>>,
}

#[derive(Debug, Deserialize)]
struct Field<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct FileContent {
    #[serde(rename = "downloadURL")]
    download_url: String,
}
